// SPDX-License-Identifier: AGPL-3.0-only

//! Cycle counting as a capability.
//!
//! The real source reads `PMCCNTR_EL0` when the `pmu` feature is
//! enabled and the kernel grants EL0 access; otherwise it scales the
//! monotonic clock by an assumed base frequency (2 GHz by default).
//! Downstream proof validation is tolerance-based either way.
//!
//! Tests substitute a scripted source so cycle deltas (and therefore
//! encoded proofs) are deterministic.

use std::time::Instant;

/// Capability: cycles and nanoseconds from one coherent source.
pub trait TimeSource: Send + Sync {
    /// Current cycle count.
    fn cycles(&self) -> u64;
    /// Current monotonic nanoseconds.
    fn nanos(&self) -> u64;
}

/// Production source: monotonic clock, cycles scaled by the assumed
/// frequency — or the raw PMU counter when compiled in and usable.
pub struct MonotonicTimeSource {
    epoch: Instant,
    assumed_mhz: u64,
}

impl MonotonicTimeSource {
    /// Source assuming `assumed_mhz` for the clock-to-cycles scaling.
    #[must_use]
    pub fn new(assumed_mhz: u64) -> Self {
        Self {
            epoch: Instant::now(),
            assumed_mhz,
        }
    }
}

impl TimeSource for MonotonicTimeSource {
    fn cycles(&self) -> u64 {
        #[cfg(all(feature = "pmu", target_arch = "aarch64"))]
        {
            read_pmccntr()
        }
        #[cfg(not(all(feature = "pmu", target_arch = "aarch64")))]
        {
            // ns × MHz / 1000 = cycles at the assumed frequency.
            self.nanos() * self.assumed_mhz / 1000
        }
    }

    fn nanos(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}

/// Read the ARM cycle counter. Traps unless the kernel enabled EL0
/// access (echo 1 > /proc/sys/kernel/perf_user_access or equivalent).
#[cfg(all(feature = "pmu", target_arch = "aarch64"))]
fn read_pmccntr() -> u64 {
    let value: u64;
    unsafe {
        core::arch::asm!("mrs {}, pmccntr_el0", out(reg) value, options(nomem, nostack));
    }
    value
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Scripted source: each read advances by a fixed step, so any
    /// delta measured across a workload is exactly `step × reads`.
    pub struct ScriptedTimeSource {
        cycle_step: u64,
        nano_step: u64,
        reads: AtomicU64,
    }

    impl ScriptedTimeSource {
        pub const fn new(cycle_step: u64, nano_step: u64) -> Self {
            Self {
                cycle_step,
                nano_step,
                reads: AtomicU64::new(0),
            }
        }
    }

    impl TimeSource for ScriptedTimeSource {
        fn cycles(&self) -> u64 {
            (self.reads.fetch_add(1, Ordering::Relaxed) + 1) * self.cycle_step
        }

        fn nanos(&self) -> u64 {
            (self.reads.load(Ordering::Relaxed) + 1) * self.nano_step
        }
    }

    #[test]
    fn monotonic_cycles_advance() {
        let src = MonotonicTimeSource::new(2000);
        let a = src.cycles();
        std::thread::sleep(std::time::Duration::from_millis(1));
        let b = src.cycles();
        assert!(b > a);
    }

    #[test]
    fn assumed_frequency_scales_nanos() {
        let src = MonotonicTimeSource::new(2000);
        let nanos = src.nanos();
        let cycles = src.cycles();
        // 2 GHz ⇒ roughly two cycles per nanosecond.
        assert!(cycles >= nanos, "cycles {cycles} vs nanos {nanos}");
    }

    #[test]
    fn scripted_source_is_deterministic() {
        let a = ScriptedTimeSource::new(1000, 500);
        let b = ScriptedTimeSource::new(1000, 500);
        assert_eq!(a.cycles(), b.cycles());
        assert_eq!(a.cycles(), b.cycles());
    }
}
