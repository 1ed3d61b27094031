// SPDX-License-Identifier: AGPL-3.0-only

//! C ABI surface for the host application layer.
//!
//! The host (Android Kotlin / iOS Swift) drives the engine through an
//! opaque handle. `mobilex_create` returns null on init failure; every
//! other entry point accepts a null handle and answers with a zero or
//! false sentinel. No panic unwinds across this boundary.

use crate::config::MinerConfig;
use crate::miner::MobileXMiner;
use crate::policy::Intensity;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Opaque engine handle for foreign callers.
pub struct MobileXHandle {
    miner: MobileXMiner,
}

/// Create an engine with the default configuration.
///
/// Returns null when initialization fails (cache build). The handle
/// must be released with `mobilex_destroy`.
#[no_mangle]
pub extern "C" fn mobilex_create() -> *mut MobileXHandle {
    let built = catch_unwind(|| MobileXMiner::new(MinerConfig::default()));
    match built {
        Ok(Ok(miner)) => Box::into_raw(Box::new(MobileXHandle { miner })),
        _ => std::ptr::null_mut(),
    }
}

/// Destroy a handle created by `mobilex_create`. Null is a no-op.
///
/// # Safety
///
/// `handle` must be null or a pointer previously returned by
/// `mobilex_create` that has not been destroyed yet.
#[no_mangle]
pub unsafe extern "C" fn mobilex_destroy(handle: *mut MobileXHandle) {
    if handle.is_null() {
        return;
    }
    drop(Box::from_raw(handle));
}

/// Start mining at the wire intensity (0..=3). False on a null
/// handle, unknown intensity, or an already-running session.
///
/// # Safety
///
/// `handle` must be null or a live pointer from `mobilex_create`.
#[no_mangle]
pub unsafe extern "C" fn mobilex_start_mining(handle: *mut MobileXHandle, intensity: i32) -> bool {
    let Some(engine) = handle.as_mut() else {
        return false;
    };
    let Some(intensity) = Intensity::from_wire(intensity) else {
        return false;
    };
    catch_unwind(AssertUnwindSafe(|| engine.miner.start_mining(intensity))).unwrap_or(false)
}

/// Stop mining. False on a null handle.
///
/// # Safety
///
/// `handle` must be null or a live pointer from `mobilex_create`.
#[no_mangle]
pub unsafe extern "C" fn mobilex_stop_mining(handle: *mut MobileXHandle) -> bool {
    let Some(engine) = handle.as_mut() else {
        return false;
    };
    engine.miner.stop_mining();
    true
}

/// Total hash rate; 0.0 on a null handle or before mining starts.
///
/// # Safety
///
/// `handle` must be null or a live pointer from `mobilex_create`.
#[no_mangle]
pub unsafe extern "C" fn mobilex_get_hash_rate(handle: *const MobileXHandle) -> f64 {
    handle.as_ref().map_or(0.0, |e| e.miner.hash_rate())
}

/// Measured RandomX share of the hash rate.
///
/// # Safety
///
/// `handle` must be null or a live pointer from `mobilex_create`.
#[no_mangle]
pub unsafe extern "C" fn mobilex_get_randomx_hash_rate(handle: *const MobileXHandle) -> f64 {
    handle.as_ref().map_or(0.0, |e| e.miner.randomx_hash_rate())
}

/// Measured mobile-stage share of the hash rate.
///
/// # Safety
///
/// `handle` must be null or a live pointer from `mobilex_create`.
#[no_mangle]
pub unsafe extern "C" fn mobilex_get_mobilex_hash_rate(handle: *const MobileXHandle) -> f64 {
    handle.as_ref().map_or(0.0, |e| e.miner.mobilex_hash_rate())
}

/// Current device temperature in Celsius; 0.0 on a null handle.
///
/// # Safety
///
/// `handle` must be null or a live pointer from `mobilex_create`.
#[no_mangle]
pub unsafe extern "C" fn mobilex_get_current_temp_c(handle: *const MobileXHandle) -> f32 {
    handle.as_ref().map_or(0.0, |e| e.miner.current_temp_c())
}

/// NPU utilization percentage; 0.0 on a null handle.
///
/// # Safety
///
/// `handle` must be null or a live pointer from `mobilex_create`.
#[no_mangle]
pub unsafe extern "C" fn mobilex_get_npu_utilization_pct(handle: *const MobileXHandle) -> f32 {
    handle.as_ref().map_or(0.0, |e| e.miner.npu_utilization_pct())
}

/// Whether a mining session is active; false on a null handle.
///
/// # Safety
///
/// `handle` must be null or a live pointer from `mobilex_create`.
#[no_mangle]
pub unsafe extern "C" fn mobilex_is_mining(handle: *const MobileXHandle) -> bool {
    handle.as_ref().is_some_and(|e| e.miner.is_mining())
}

/// Generate a thermal proof over `header_ptr[..header_len]`.
/// Returns 0 on a null handle or null header.
///
/// # Safety
///
/// `handle` must be null or a live pointer from `mobilex_create`;
/// `header_ptr` must be null or valid for `header_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn mobilex_generate_thermal_proof(
    handle: *const MobileXHandle,
    header_ptr: *const u8,
    header_len: usize,
) -> u64 {
    let Some(engine) = handle.as_ref() else {
        return 0;
    };
    if header_ptr.is_null() {
        return 0;
    }
    let header = std::slice::from_raw_parts(header_ptr, header_len);
    catch_unwind(AssertUnwindSafe(|| {
        engine.miner.generate_thermal_proof(header)
    }))
    .unwrap_or(0)
}

/// Enable or disable the periodic NPU substep. False on null.
///
/// # Safety
///
/// `handle` must be null or a live pointer from `mobilex_create`.
#[no_mangle]
pub unsafe extern "C" fn mobilex_configure_npu(handle: *const MobileXHandle, enabled: bool) -> bool {
    let Some(engine) = handle.as_ref() else {
        return false;
    };
    engine.miner.set_npu_enabled(enabled);
    true
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn null_handle_sentinels() {
        unsafe {
            let null: *mut MobileXHandle = std::ptr::null_mut();
            assert!(!mobilex_start_mining(null, 1));
            assert!(!mobilex_stop_mining(null));
            assert!(mobilex_get_hash_rate(null).abs() < f64::EPSILON);
            assert!(mobilex_get_randomx_hash_rate(null).abs() < f64::EPSILON);
            assert!(mobilex_get_mobilex_hash_rate(null).abs() < f64::EPSILON);
            assert!(mobilex_get_current_temp_c(null).abs() < f32::EPSILON);
            assert!(mobilex_get_npu_utilization_pct(null).abs() < f32::EPSILON);
            assert!(!mobilex_is_mining(null));
            assert_eq!(mobilex_generate_thermal_proof(null, std::ptr::null(), 0), 0);
            assert!(!mobilex_configure_npu(null, true));
            mobilex_destroy(null); // no-op, must not crash
        }
    }

    #[test]
    fn unknown_wire_intensity_has_no_mapping() {
        // Building the default 256 MiB cache is too heavy for a unit
        // test, so the start gate is exercised through the mapping it
        // uses rather than through a live handle.
        assert!(Intensity::from_wire(7).is_none());
        assert!(Intensity::from_wire(-2).is_none());
    }
}
