// SPDX-License-Identifier: AGPL-3.0-only

//! Mining policy — intensity decisions from power and thermal inputs.
//!
//! The controller combines a fresh `PowerSnapshot` with the thermal
//! picture and produces an `Intensity` plus a (big, little) core
//! activation. The decision table is fixed by the protocol:
//!
//! ```text
//! not charging                    → DISABLED
//! battery < 80                    → DISABLED
//! temp > 45                       → LIGHT      (thermal throttle)
//! battery > 95 and temp < 40      → FULL
//! battery ≥ 85                    → MEDIUM
//! otherwise                       → LIGHT
//! ```
//!
//! A manual override can force mining permission either way; the
//! controller reasserts the derived permission on the next evaluation.

use log::info;
use socprobe::HardwareProbe;

/// Mining workload level. Ordered: `Disabled < Light < Medium < Full`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Intensity {
    /// No mining.
    Disabled,
    /// Conservative: 2 big + 2 little cores.
    Light,
    /// Balanced: 4 big + 4 little cores.
    Medium,
    /// Everything: 8 big + 8 little cores.
    Full,
}

impl Intensity {
    /// (big, little) core activation for this level.
    #[must_use]
    pub const fn core_allocation(self) -> (usize, usize) {
        match self {
            Self::Disabled => (0, 0),
            Self::Light => (2, 2),
            Self::Medium => (4, 4),
            Self::Full => (8, 8),
        }
    }

    /// Stable integer mapping for the wire / FFI surface.
    #[must_use]
    pub const fn as_wire(self) -> i32 {
        match self {
            Self::Disabled => 0,
            Self::Light => 1,
            Self::Medium => 2,
            Self::Full => 3,
        }
    }

    /// Parse the wire integer; `None` for unknown values.
    #[must_use]
    pub const fn from_wire(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Disabled),
            1 => Some(Self::Light),
            2 => Some(Self::Medium),
            3 => Some(Self::Full),
            _ => None,
        }
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Light => "light",
            Self::Medium => "medium",
            Self::Full => "full",
        }
    }
}

/// Immutable power state snapshot, constructed fresh per evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerSnapshot {
    /// Battery level, 0..=100.
    pub battery_pct: u8,
    /// On external power.
    pub charging: bool,
    /// Device temperature in Celsius.
    pub temp_c: f32,
}

impl PowerSnapshot {
    /// Snapshot the probe's current battery and thermal readings.
    #[must_use]
    pub fn from_probe(probe: &HardwareProbe) -> Self {
        Self {
            battery_pct: probe.read_battery_pct(),
            charging: probe.read_charging_status(),
            temp_c: probe.read_battery_temp_c().max(probe.read_soc_temp_c()),
        }
    }
}

/// Policy state machine over battery, charging, and thermal inputs.
#[derive(Debug, Default)]
pub struct PolicyController {
    can_mine: bool,
}

impl PolicyController {
    /// Fresh controller; mining is denied until the first evaluation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-derive mining permission and intensity from live inputs.
    ///
    /// Called on every policy tick; this is also where any manual
    /// override is superseded by the derived permission.
    pub fn evaluate(&mut self, snap: &PowerSnapshot) -> Intensity {
        let was_allowed = self.can_mine;
        self.can_mine = derive_permission(snap);
        if self.can_mine != was_allowed {
            info!(
                "mining permission changed: {} -> {} (battery={}%, charging={}, temp={:.1}C)",
                label(was_allowed),
                label(self.can_mine),
                snap.battery_pct,
                snap.charging,
                snap.temp_c
            );
        }
        self.decide(snap)
    }

    /// The decision table, gated on the current mining permission.
    #[must_use]
    pub fn decide(&self, snap: &PowerSnapshot) -> Intensity {
        if !self.can_mine || !snap.charging || snap.battery_pct < 80 {
            return Intensity::Disabled;
        }
        if snap.temp_c > 45.0 {
            return Intensity::Light;
        }
        if snap.battery_pct > 95 && snap.temp_c < 40.0 {
            return Intensity::Full;
        }
        if snap.battery_pct >= 85 {
            return Intensity::Medium;
        }
        Intensity::Light
    }

    /// Whether mining may start right now.
    #[must_use]
    pub const fn can_start_mining(&self) -> bool {
        self.can_mine
    }

    /// Whether an active mining session must stop.
    #[must_use]
    pub fn should_stop_mining(&self, snap: &PowerSnapshot) -> bool {
        !self.can_mine || snap.battery_pct < 20 || snap.temp_c > 50.0
    }

    /// Manual override. Forces the permission until the next
    /// `evaluate`, which reasserts the derived value.
    pub fn set_mining_allowed(&mut self, allowed: bool) {
        self.can_mine = allowed;
        info!("mining permission manually set to {}", label(allowed));
    }
}

/// canMine ⟺ charging ∧ battery ≥ 80 ∧ temp < 50.
fn derive_permission(snap: &PowerSnapshot) -> bool {
    snap.charging && snap.battery_pct >= 80 && snap.temp_c < 50.0
}

const fn label(allowed: bool) -> &'static str {
    if allowed {
        "allowed"
    } else {
        "denied"
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    fn snap(battery_pct: u8, charging: bool, temp_c: f32) -> PowerSnapshot {
        PowerSnapshot {
            battery_pct,
            charging,
            temp_c,
        }
    }

    fn evaluated(battery_pct: u8, charging: bool, temp_c: f32) -> Intensity {
        let mut pc = PolicyController::new();
        pc.evaluate(&snap(battery_pct, charging, temp_c))
    }

    #[test]
    fn not_charging_disables() {
        assert_eq!(evaluated(100, false, 30.0), Intensity::Disabled);
    }

    #[test]
    fn low_battery_disables() {
        assert_eq!(evaluated(79, true, 30.0), Intensity::Disabled);
    }

    #[test]
    fn hot_device_throttles_to_light() {
        assert_eq!(evaluated(100, true, 46.0), Intensity::Light);
    }

    #[test]
    fn optimal_conditions_give_full() {
        assert_eq!(evaluated(96, true, 39.0), Intensity::Full);
    }

    #[test]
    fn full_needs_both_battery_and_cool() {
        // battery > 95 but temp ≥ 40 drops to medium
        assert_eq!(evaluated(96, true, 41.0), Intensity::Medium);
    }

    #[test]
    fn good_battery_gives_medium() {
        assert_eq!(evaluated(85, true, 42.0), Intensity::Medium);
        assert_eq!(evaluated(90, true, 44.0), Intensity::Medium);
    }

    #[test]
    fn adequate_battery_gives_light() {
        assert_eq!(evaluated(80, true, 30.0), Intensity::Light);
        assert_eq!(evaluated(84, true, 30.0), Intensity::Light);
    }

    #[test]
    fn too_hot_to_mine_at_all() {
        // temp ≥ 50 denies permission entirely
        assert_eq!(evaluated(100, true, 51.0), Intensity::Disabled);
    }

    #[test]
    fn can_start_reflects_permission() {
        let mut pc = PolicyController::new();
        assert!(!pc.can_start_mining());
        pc.evaluate(&snap(90, true, 35.0));
        assert!(pc.can_start_mining());
        pc.evaluate(&snap(90, false, 35.0));
        assert!(!pc.can_start_mining());
    }

    #[test]
    fn should_stop_on_battery_drain() {
        let mut pc = PolicyController::new();
        pc.set_mining_allowed(true);
        assert!(pc.should_stop_mining(&snap(19, true, 35.0)));
        assert!(pc.should_stop_mining(&snap(90, true, 50.5)));
        assert!(!pc.should_stop_mining(&snap(90, true, 35.0)));
    }

    #[test]
    fn manual_override_forces_then_reasserts() {
        let mut pc = PolicyController::new();
        pc.set_mining_allowed(true);
        assert!(pc.can_start_mining());
        // Next tick re-derives: battery too low, permission drops.
        pc.evaluate(&snap(50, false, 35.0));
        assert!(!pc.can_start_mining());
    }

    #[test]
    fn override_deny_blocks_decision() {
        let mut pc = PolicyController::new();
        pc.evaluate(&snap(100, true, 30.0));
        pc.set_mining_allowed(false);
        assert_eq!(pc.decide(&snap(100, true, 30.0)), Intensity::Disabled);
    }

    #[test]
    fn intensity_core_allocation() {
        assert_eq!(Intensity::Disabled.core_allocation(), (0, 0));
        assert_eq!(Intensity::Light.core_allocation(), (2, 2));
        assert_eq!(Intensity::Medium.core_allocation(), (4, 4));
        assert_eq!(Intensity::Full.core_allocation(), (8, 8));
    }

    #[test]
    fn intensity_wire_round_trip() {
        for i in [
            Intensity::Disabled,
            Intensity::Light,
            Intensity::Medium,
            Intensity::Full,
        ] {
            assert_eq!(Intensity::from_wire(i.as_wire()), Some(i));
        }
        assert_eq!(Intensity::from_wire(4), None);
        assert_eq!(Intensity::from_wire(-1), None);
    }

    #[test]
    fn intensity_ordering() {
        assert!(Intensity::Disabled < Intensity::Light);
        assert!(Intensity::Light < Intensity::Medium);
        assert!(Intensity::Medium < Intensity::Full);
    }
}
