// SPDX-License-Identifier: AGPL-3.0-only

//! Heterogeneous core scheduling — bind work to big/LITTLE subsets.
//!
//! Affinity is a best-effort capability. On hosts that prohibit
//! `sched_setaffinity` (or lack it entirely), the work still runs on
//! the current thread and the caller learns via the returned flag that
//! binding failed. A failed bind never corrupts the activation mask.

use log::debug;
use socprobe::CoreTopology;
use std::sync::{Mutex, PoisonError};

/// Work placement across detected big and little cores.
pub struct HeterogeneousScheduler {
    topology: CoreTopology,
    active: Mutex<Vec<bool>>,
}

impl HeterogeneousScheduler {
    /// Scheduler over a detected topology; all cores start inactive.
    #[must_use]
    pub fn new(topology: CoreTopology) -> Self {
        let active = Mutex::new(vec![false; topology.total]);
        Self { topology, active }
    }

    /// Scheduler over the running system's topology.
    #[must_use]
    pub fn detect() -> Self {
        Self::new(CoreTopology::detect())
    }

    /// The topology this scheduler was built over.
    #[must_use]
    pub const fn topology(&self) -> &CoreTopology {
        &self.topology
    }

    /// Record the desired activation: the first `big_count` big cores
    /// and first `little_count` little cores, clamped to the topology.
    pub fn configure(&self, big_count: usize, little_count: usize) {
        let mut active = self.lock_active();
        active.fill(false);
        for &id in self.topology.big_ids.iter().take(big_count) {
            active[id] = true;
        }
        for &id in self.topology.little_ids.iter().take(little_count) {
            active[id] = true;
        }
    }

    /// Run `work` with affinity bound to the big-core subset.
    ///
    /// Returns `(result, bound)`; `bound` is false when the affinity
    /// syscall failed or no big cores exist. The previous affinity is
    /// restored on return.
    pub fn run_on_big<R>(&self, work: impl FnOnce() -> R) -> (R, bool) {
        self.run_bound(&self.topology.big_ids, work)
    }

    /// Run `work` with affinity bound to the little-core subset.
    pub fn run_on_little<R>(&self, work: impl FnOnce() -> R) -> (R, bool) {
        self.run_bound(&self.topology.little_ids, work)
    }

    fn run_bound<R>(&self, ids: &[usize], work: impl FnOnce() -> R) -> (R, bool) {
        if ids.is_empty() {
            return (work(), false);
        }
        match affinity::bind(ids) {
            Some(previous) => {
                let result = work();
                affinity::restore(&previous);
                (result, true)
            }
            None => {
                debug!("affinity bind to {ids:?} denied, running unbound");
                (work(), false)
            }
        }
    }

    /// Deactivate the highest-index active core, keeping at least one.
    pub fn reduce_intensity(&self) {
        let mut active = self.lock_active();
        if active.iter().filter(|&&a| a).count() <= 1 {
            return;
        }
        if let Some(slot) = active.iter_mut().rev().find(|a| **a) {
            *slot = false;
        }
    }

    /// Activate the lowest-index inactive core, if any remain.
    pub fn increase_intensity(&self) {
        let mut active = self.lock_active();
        if let Some(slot) = active.iter_mut().find(|a| !**a) {
            *slot = true;
        }
    }

    /// Bitmap with bit `i` set iff core `i` is active (`i < 32`).
    #[must_use]
    pub fn active_core_bitmap(&self) -> u32 {
        let active = self.lock_active();
        let mut state = 0u32;
        for (i, &on) in active.iter().take(32).enumerate() {
            if on {
                state |= 1 << i;
            }
        }
        state
    }

    /// Number of active cores.
    #[must_use]
    pub fn active_cores(&self) -> usize {
        self.lock_active().iter().filter(|&&a| a).count()
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Vec<bool>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
mod affinity {
    use std::mem;

    pub struct PreviousMask(libc::cpu_set_t);

    /// Bind the current thread to `ids`, returning the previous mask.
    pub fn bind(ids: &[usize]) -> Option<PreviousMask> {
        unsafe {
            let mut previous: libc::cpu_set_t = mem::zeroed();
            if libc::sched_getaffinity(0, mem::size_of::<libc::cpu_set_t>(), &mut previous) != 0 {
                return None;
            }
            let mut wanted: libc::cpu_set_t = mem::zeroed();
            libc::CPU_ZERO(&mut wanted);
            for &id in ids {
                if id < libc::CPU_SETSIZE as usize {
                    libc::CPU_SET(id, &mut wanted);
                }
            }
            if libc::sched_setaffinity(0, mem::size_of::<libc::cpu_set_t>(), &wanted) != 0 {
                return None;
            }
            Some(PreviousMask(previous))
        }
    }

    pub fn restore(previous: &PreviousMask) {
        unsafe {
            // Restoration failure leaves the thread on the bound subset,
            // which is still a valid placement.
            let _ = libc::sched_setaffinity(0, mem::size_of::<libc::cpu_set_t>(), &previous.0);
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
mod affinity {
    pub struct PreviousMask;

    pub fn bind(_ids: &[usize]) -> Option<PreviousMask> {
        None
    }

    pub fn restore(_previous: &PreviousMask) {}
}
