// SPDX-License-Identifier: AGPL-3.0-only

//! The MobileX hash pipeline.
//!
//! Per input header:
//!
//! 1. NEON vector preprocessing (when the CPU has it)
//! 2. RandomX-light inner hash against the shared cache
//! 3. Mobile mixing + SHA-256 finalization
//! 4. Every N-th hash: the NPU convolution substep, whose output
//!    skips the hash counter forward and so reschedules itself
//! 5. Counter increment
//!
//! The hasher is single-threaded by construction — one per mining
//! worker, each deterministic given its initial counter. Stage wall
//! time is accumulated so the engine can report a measured
//! RandomX/mobile split instead of a guess.

/// ARM vector fold and the mobile mixing transform.
pub mod vector;

pub use vector::{mobile_mix, vector_hash, vector_hash_scalar, CORE_STATE_SEED};

use crate::npu::NpuEngine;
use crate::randomx::{RandomxCache, RandomxVm};
use sha2::{Digest, Sha256};
use socprobe::ArmFeatures;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Bytes in the derived NPU state buffer.
const NPU_STATE_BYTES: usize = 2048;

/// Modulus applied to the NPU output when deriving the counter skip.
const NPU_SKIP_MODULUS: u32 = 1000;

/// Wall time spent in each pipeline stage, nanoseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageNanos {
    /// RandomX inner hash.
    pub inner: u64,
    /// Preprocessing, mixing, and NPU substeps.
    pub mobile: u64,
}

/// Single-thread MobileX hasher.
pub struct MobileXHasher {
    vm: RandomxVm,
    npu: Arc<NpuEngine>,
    npu_enabled: Arc<AtomicBool>,
    npu_interval: u64,
    use_neon: bool,
    counter: u64,
    stages: StageNanos,
}

impl MobileXHasher {
    /// Hasher over a shared cache and NPU engine.
    ///
    /// `use_neon` is the configuration wish; it only takes effect when
    /// the CPU actually reports NEON.
    #[must_use]
    pub fn new(
        cache: Arc<RandomxCache>,
        npu: Arc<NpuEngine>,
        npu_enabled: Arc<AtomicBool>,
        npu_interval: u64,
        features: &ArmFeatures,
        use_neon: bool,
        initial_counter: u64,
    ) -> Self {
        Self {
            vm: RandomxVm::new(cache),
            npu,
            npu_enabled,
            npu_interval: npu_interval.max(1),
            use_neon: use_neon && features.has_neon,
            counter: initial_counter,
            stages: StageNanos::default(),
        }
    }

    /// Compute the 32-byte MobileX digest of `header`.
    ///
    /// Total function: every input yields exactly 32 bytes.
    pub fn compute(&mut self, header: &[u8]) -> [u8; 32] {
        let mobile_start = Instant::now();
        let preprocessed: Vec<u8> = if self.use_neon {
            vector_hash(header).to_vec()
        } else {
            header.to_vec()
        };
        let mut mobile_nanos = mobile_start.elapsed().as_nanos() as u64;

        let inner_start = Instant::now();
        let inner = self.vm.hash(&preprocessed);
        self.stages.inner += inner_start.elapsed().as_nanos() as u64;

        let mix_start = Instant::now();
        let digest = mobile_mix(&inner);

        if self.npu_enabled.load(Ordering::Relaxed) && self.counter % self.npu_interval == 0 {
            self.run_npu_step();
        }
        mobile_nanos += mix_start.elapsed().as_nanos() as u64;
        self.stages.mobile += mobile_nanos;

        self.counter += 1;
        digest
    }

    /// Hash counter, including NPU-induced skips.
    #[must_use]
    pub const fn counter(&self) -> u64 {
        self.counter
    }

    /// Accumulated per-stage wall time.
    #[must_use]
    pub const fn stage_nanos(&self) -> StageNanos {
        self.stages
    }

    /// Whether an NPU substep would fire at the current counter.
    #[must_use]
    pub fn npu_step_due(&self) -> bool {
        self.npu_enabled.load(Ordering::Relaxed) && self.counter % self.npu_interval == 0
    }

    /// The convolution substep: derive a state from the counter, run
    /// it through the NPU, and fold the result back as a counter skip.
    fn run_npu_step(&mut self) {
        let state = derived_state(self.counter);
        let output = self.npu.process_state(&state);
        if output.len() >= 4 {
            let skip = u32::from_le_bytes(output[..4].try_into().unwrap_or([0u8; 4]));
            self.counter += u64::from(skip % NPU_SKIP_MODULUS);
        }
    }
}

/// Deterministic 2048-byte NPU state for a hash counter: 8 bytes of
/// little-endian counter, then SHA-256 of those bytes repeated.
#[must_use]
pub fn derived_state(counter: u64) -> [u8; NPU_STATE_BYTES] {
    let mut state = [0u8; NPU_STATE_BYTES];
    state[..8].copy_from_slice(&counter.to_le_bytes());
    let fill: [u8; 32] = Sha256::digest(&state[..8]).into();
    for (offset, byte) in state.iter_mut().enumerate().skip(8) {
        *byte = fill[(offset - 8) % 32];
    }
    state
}
