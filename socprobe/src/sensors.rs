// SPDX-License-Identifier: AGPL-3.0-only

//! Battery and thermal sensor reads via sysfs.
//!
//! Every reader tries a documented primary path first and falls back
//! through an ordered list. If every source fails, a documented safe
//! default is returned (battery 85 %, not charging, 35 °C). Readouts
//! are sanity-clamped: battery into [0, 100], temperatures into
//! [10, 100] °C.
//!
//! Thermal zone unit detection follows the Android convention: paths
//! containing "battery" report tenths of a degree, thermal zones report
//! milli-degrees.

use log::debug;
use std::fs;

/// Battery level fallback chain, percent as text integer.
const BATTERY_PATHS: &[&str] = &[
    "/sys/class/power_supply/battery/capacity",
    "/sys/class/power_supply/BAT0/capacity",
    "/sys/class/power_supply/BAT1/capacity",
    "/proc/sys/kernel/battery_capacity",
];

/// Charging status string, expected "Charging" or "Full".
const CHARGING_STATUS_PATH: &str = "/sys/class/power_supply/battery/status";

/// Online flags for external power sources, value 1 when present.
const ONLINE_PATHS: &[&str] = &[
    "/sys/class/power_supply/ac/online",
    "/sys/class/power_supply/usb/online",
    "/sys/class/power_supply/wireless/online",
];

/// Battery temperature in tenths of a degree Celsius.
const BATTERY_TEMP_PATH: &str = "/sys/class/power_supply/battery/temp";

/// Thermal zones in milli-degrees, plus the battery zone in deci-degrees.
const THERMAL_ZONE_PATHS: &[&str] = &[
    "/sys/class/thermal/thermal_zone0/temp",
    "/sys/class/thermal/thermal_zone1/temp",
    "/sys/class/thermal/thermal_zone2/temp",
    "/sys/class/thermal/thermal_zone3/temp",
    "/sys/devices/virtual/thermal/thermal_zone0/temp",
    "/sys/devices/virtual/thermal/thermal_zone1/temp",
    "/sys/class/power_supply/battery/temp",
];

/// Safe defaults when no source is readable.
pub const FALLBACK_BATTERY_PCT: u8 = 85;
/// Assume discharging when the charging state cannot be read.
pub const FALLBACK_CHARGING: bool = false;
/// Assumed ambient-load temperature when no thermal zone is readable.
pub const FALLBACK_TEMP_C: f32 = 35.0;

/// Capability seam for raw sensor reads.
///
/// The production implementation reads sysfs text files. Tests and
/// platform variants substitute deterministic sources.
pub trait SensorSource: Send + Sync {
    /// Read a text integer from `path`, `None` when unavailable.
    fn read_int(&self, path: &str) -> Option<i64>;
    /// Read a trimmed text token from `path`, `None` when unavailable.
    fn read_str(&self, path: &str) -> Option<String>;
}

/// Production source: Linux/Android sysfs and procfs text files.
#[derive(Debug, Default, Clone, Copy)]
pub struct SysfsSource;

impl SensorSource for SysfsSource {
    fn read_int(&self, path: &str) -> Option<i64> {
        let content = fs::read_to_string(path).ok()?;
        content.split_whitespace().next()?.parse().ok()
    }

    fn read_str(&self, path: &str) -> Option<String> {
        let content = fs::read_to_string(path).ok()?;
        content.split_whitespace().next().map(str::to_owned)
    }
}

/// Stateless reader over a `SensorSource`.
///
/// Construct once and share; every method takes a fresh snapshot.
pub struct HardwareProbe {
    source: Box<dyn SensorSource>,
}

impl Default for HardwareProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareProbe {
    /// Probe backed by sysfs.
    #[must_use]
    pub fn new() -> Self {
        Self {
            source: Box::new(SysfsSource),
        }
    }

    /// Probe backed by a substitute source (platform variants, tests).
    #[must_use]
    pub fn with_source(source: Box<dyn SensorSource>) -> Self {
        Self { source }
    }

    /// Battery level in percent, clamped to [0, 100].
    ///
    /// Falls back to 85 % when no battery interface is readable.
    #[must_use]
    pub fn read_battery_pct(&self) -> u8 {
        for path in BATTERY_PATHS {
            if let Some(level) = self.source.read_int(path) {
                return level.clamp(0, 100) as u8;
            }
        }
        debug!("battery level unavailable, assuming {FALLBACK_BATTERY_PCT}%");
        FALLBACK_BATTERY_PCT
    }

    /// Whether the device is on external power.
    ///
    /// "Charging" and "Full" both count as charging; any online power
    /// source (AC, USB, wireless) counts as well.
    #[must_use]
    pub fn read_charging_status(&self) -> bool {
        if let Some(status) = self.source.read_str(CHARGING_STATUS_PATH) {
            return status == "Charging" || status == "Full";
        }
        for path in ONLINE_PATHS {
            if self.source.read_int(path) == Some(1) {
                return true;
            }
        }
        debug!("charging state unavailable, assuming not charging");
        FALLBACK_CHARGING
    }

    /// Battery temperature in Celsius (sysfs reports deci-degrees).
    #[must_use]
    pub fn read_battery_temp_c(&self) -> f32 {
        if let Some(deci) = self.source.read_int(BATTERY_TEMP_PATH) {
            return clamp_temp(deci as f32 / 10.0);
        }
        debug!("battery temperature unavailable, assuming {FALLBACK_TEMP_C}\u{b0}C");
        FALLBACK_TEMP_C
    }

    /// SoC temperature in Celsius: maximum across readable thermal zones.
    ///
    /// The maximum is the conservative choice for throttling decisions.
    #[must_use]
    pub fn read_soc_temp_c(&self) -> f32 {
        self.read_zones()
            .into_iter()
            .map(|(_, t)| t)
            .fold(None::<f32>, |acc, t| Some(acc.map_or(t, |a| a.max(t))))
            .unwrap_or_else(|| {
                debug!("no thermal zone readable, assuming {FALLBACK_TEMP_C}\u{b0}C");
                FALLBACK_TEMP_C
            })
    }

    /// All readable thermal zones as `(path, celsius)` pairs.
    ///
    /// Readings outside the [10, 100] °C sanity range are clamped.
    #[must_use]
    pub fn read_zones(&self) -> Vec<(&'static str, f32)> {
        let mut zones = Vec::new();
        for path in THERMAL_ZONE_PATHS {
            if let Some(raw) = self.source.read_int(path) {
                zones.push((*path, clamp_temp(convert_zone_reading(path, raw))));
            }
        }
        zones
    }

    /// Number of readable thermal zones (logged once by the monitor).
    #[must_use]
    pub fn zone_count(&self) -> usize {
        self.read_zones().len()
    }
}

/// Convert a raw zone reading to Celsius based on the path's unit.
fn convert_zone_reading(path: &str, raw: i64) -> f32 {
    if path.contains("battery") {
        raw as f32 / 10.0
    } else {
        raw as f32 / 1000.0
    }
}

/// Sanity-clamp a temperature into the [10, 100] °C window.
fn clamp_temp(t: f32) -> f32 {
    t.clamp(10.0, 100.0)
}
