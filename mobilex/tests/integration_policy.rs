// SPDX-License-Identifier: AGPL-3.0-only

//! End-to-end policy scenarios: the decision grid, core activation,
//! and start/stop gating as the host would exercise them.

use mobilex::policy::{Intensity, PolicyController, PowerSnapshot};

fn snap(battery_pct: u8, charging: bool, temp_c: f32) -> PowerSnapshot {
    PowerSnapshot {
        battery_pct,
        charging,
        temp_c,
    }
}

#[test]
fn scenario_full_battery_cool_device() {
    // battery=100, charging, temp=30 → FULL, activation (8,8), can start
    let mut pc = PolicyController::new();
    let s = snap(100, true, 30.0);
    assert_eq!(pc.evaluate(&s), Intensity::Full);
    assert_eq!(Intensity::Full.core_allocation(), (8, 8));
    assert!(pc.can_start_mining());
}

#[test]
fn scenario_good_battery_warm_device() {
    // battery=85, charging, temp=42 → MEDIUM
    let mut pc = PolicyController::new();
    assert_eq!(pc.evaluate(&snap(85, true, 42.0)), Intensity::Medium);
}

#[test]
fn scenario_hot_device_throttles() {
    // battery=90, charging, temp=46 → LIGHT
    let mut pc = PolicyController::new();
    assert_eq!(pc.evaluate(&snap(90, true, 46.0)), Intensity::Light);
}

#[test]
fn scenario_discharging_device_stops() {
    // battery=50, not charging, temp=35 → DISABLED, shouldStop
    let mut pc = PolicyController::new();
    assert_eq!(pc.evaluate(&snap(50, false, 35.0)), Intensity::Disabled);
    assert!(pc.should_stop_mining(&snap(50, false, 35.0)));
}

#[test]
fn decision_grid_matches_table() {
    let mut pc = PolicyController::new();
    let cases: &[(u8, bool, f32, Intensity)] = &[
        // not charging → disabled regardless of everything else
        (100, false, 20.0, Intensity::Disabled),
        (80, false, 44.0, Intensity::Disabled),
        // battery below 80 → disabled
        (0, true, 30.0, Intensity::Disabled),
        (79, true, 30.0, Intensity::Disabled),
        // thermal throttle band
        (100, true, 45.5, Intensity::Light),
        (85, true, 49.0, Intensity::Light),
        // optimal: >95 and <40
        (96, true, 39.9, Intensity::Full),
        (100, true, 35.0, Intensity::Full),
        // good: ≥85
        (96, true, 40.0, Intensity::Medium),
        (85, true, 30.0, Intensity::Medium),
        (95, true, 44.0, Intensity::Medium),
        // conservative default
        (80, true, 30.0, Intensity::Light),
        (84, true, 44.9, Intensity::Light),
    ];
    for (battery, charging, temp, expected) in cases {
        let got = pc.evaluate(&snap(*battery, *charging, *temp));
        assert_eq!(
            got, *expected,
            "battery={battery} charging={charging} temp={temp}"
        );
    }
}

#[test]
fn permission_invariants() {
    let mut pc = PolicyController::new();

    // canMine ⟺ charging ∧ battery ≥ 80 ∧ temp < 50
    pc.evaluate(&snap(80, true, 49.9));
    assert!(pc.can_start_mining());
    pc.evaluate(&snap(80, true, 50.0));
    assert!(!pc.can_start_mining());
    pc.evaluate(&snap(79, true, 30.0));
    assert!(!pc.can_start_mining());
    pc.evaluate(&snap(100, false, 30.0));
    assert!(!pc.can_start_mining());

    // shouldStop ⟺ ¬canMine ∨ battery < 20 ∨ temp > 50
    pc.evaluate(&snap(90, true, 35.0));
    assert!(!pc.should_stop_mining(&snap(90, true, 35.0)));
    assert!(pc.should_stop_mining(&snap(19, true, 35.0)));
    assert!(pc.should_stop_mining(&snap(90, true, 50.1)));
}

#[test]
fn wire_mapping_is_stable() {
    assert_eq!(Intensity::Disabled.as_wire(), 0);
    assert_eq!(Intensity::Light.as_wire(), 1);
    assert_eq!(Intensity::Medium.as_wire(), 2);
    assert_eq!(Intensity::Full.as_wire(), 3);
}
