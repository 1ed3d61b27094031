// SPDX-License-Identifier: AGPL-3.0-only

//! Engine configuration.
//!
//! The defaults are the protocol constants: light-mode RandomX with
//! the full 256 MiB cache, an NPU substep every 150 hashes, 5 %
//! thermal-proof tolerance against an assumed 2 GHz base clock.

use crate::randomx::LIGHT_CACHE_BYTES;
use std::time::Duration;

/// Configuration for a mining session.
#[derive(Debug, Clone)]
#[must_use]
pub struct MinerConfig {
    /// RandomX light-mode cache size in bytes.
    pub randomx_cache_bytes: usize,
    /// Whether the periodic NPU substep runs at all.
    pub npu_enabled: bool,
    /// Run the NPU substep every N hashes.
    pub npu_interval: u64,
    /// Thermal proof tolerance in percent.
    pub thermal_tolerance_pct: f64,
    /// Assumed base CPU frequency in MHz for cycle accounting.
    pub base_frequency_mhz: u64,
    /// Monitor threshold: NORMAL → THROTTLE.
    pub throttle_temp_c: f32,
    /// Monitor threshold: THROTTLE → CRITICAL.
    pub max_temp_c: f32,
    /// Control loop: reduce intensity above this temperature.
    pub thermal_throttle_start_c: f32,
    /// Control loop: stop mining above this temperature.
    pub thermal_throttle_stop_c: f32,
    /// Control loop: increase intensity below this temperature.
    pub optimal_temp_c: f32,
    /// Use the NEON preprocessing stage when the CPU supports it.
    pub use_neon: bool,
    /// Thermal monitor poll cadence.
    pub poll_interval: Duration,
    /// Z-score threshold for the thermal cheat detector.
    pub cheat_z_threshold: f64,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            randomx_cache_bytes: LIGHT_CACHE_BYTES,
            npu_enabled: true,
            npu_interval: 150,
            thermal_tolerance_pct: 5.0,
            base_frequency_mhz: 2000,
            throttle_temp_c: 40.0,
            max_temp_c: 45.0,
            thermal_throttle_start_c: 45.0,
            thermal_throttle_stop_c: 48.0,
            optimal_temp_c: 40.0,
            use_neon: true,
            poll_interval: Duration::from_secs(1),
            cheat_z_threshold: 2.0,
        }
    }
}

impl MinerConfig {
    /// Preset for tests: tiny cache so the Argon2 fill is fast.
    #[cfg(test)]
    pub(crate) fn test_mode() -> Self {
        Self {
            randomx_cache_bytes: 64 * 1024,
            ..Self::default()
        }
    }
}
