// SPDX-License-Identifier: AGPL-3.0-only

//! Cycle-counted thermal proofs.
//!
//! A proof attests that the miner ran a reference workload at a
//! bounded clock speed: the generator times a half-speed SHA-256
//! chain, derives an effective frequency, and packs the measurement
//! into a single u64 carried in the block header's trailing bytes.
//!
//! Validation regenerates the proof over the header (proof slot
//! stripped) and accepts within a percentage tolerance. A proof never
//! fails "hard" — an out-of-tolerance value is a flagging condition
//! surfaced to higher layers, alongside the statistical cheat
//! detector over the proof history.

use crate::thermal::pmu::{MonotonicTimeSource, TimeSource};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Bounded proof history length, FIFO eviction.
pub const HISTORY_CAP: usize = 1000;

/// Minimum history before the cheat detector reports anything.
pub const CHEAT_WINDOW_MIN: usize = 10;

/// Bytes of header used as the verification workload.
const WORKLOAD_BYTES: usize = 32;

/// SHA-256 chain length in the half-speed workload.
const WORKLOAD_ROUNDS: usize = 100;

/// Artificial delay simulating a 50 % clock before the chain runs.
const HALF_SPEED_DELAY: Duration = Duration::from_micros(100);

/// A single thermal compliance measurement.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ThermalProof {
    /// Cycles consumed by the verification workload.
    pub cycle_count: u64,
    /// Thermal-compliant cycle budget for the same workload.
    pub expected_cycles: u64,
    /// Effective frequency in integer MHz (truncated).
    pub frequency_mhz: u64,
    /// SoC temperature at generation time, Celsius.
    pub temp_c: f32,
    /// Proof generation time, Unix milliseconds.
    pub timestamp_ms: i64,
    /// SHA-256 of the work being attested.
    pub work_hash: [u8; 32],
}

/// Aggregate statistics over the proof history.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ThermalStatistics {
    /// Mean temperature across proofs.
    pub avg_temp_c: f32,
    /// Minimum temperature seen.
    pub min_temp_c: f32,
    /// Maximum temperature seen.
    pub max_temp_c: f32,
    /// Population standard deviation of temperature.
    pub stddev_temp_c: f32,
    /// Mean effective frequency in MHz.
    pub avg_frequency_mhz: f64,
    /// Number of proofs aggregated.
    pub samples: usize,
}

/// Thermal proof generator and validator.
pub struct ThermalVerifier {
    time: Box<dyn TimeSource>,
    base_frequency_mhz: u64,
    tolerance_pct: f64,
    current_temp_c: Mutex<f32>,
    history: Mutex<VecDeque<ThermalProof>>,
}

impl ThermalVerifier {
    /// Verifier with the production time source.
    #[must_use]
    pub fn new(base_frequency_mhz: u64, tolerance_pct: f64) -> Self {
        Self::with_time_source(
            Box::new(MonotonicTimeSource::new(base_frequency_mhz)),
            base_frequency_mhz,
            tolerance_pct,
        )
    }

    /// Verifier over an explicit time source (capability seam).
    #[must_use]
    pub fn with_time_source(
        time: Box<dyn TimeSource>,
        base_frequency_mhz: u64,
        tolerance_pct: f64,
    ) -> Self {
        Self {
            time,
            base_frequency_mhz,
            tolerance_pct,
            current_temp_c: Mutex::new(40.0),
            history: Mutex::new(VecDeque::with_capacity(HISTORY_CAP)),
        }
    }

    /// Assumed base frequency in MHz.
    #[must_use]
    pub const fn base_frequency_mhz(&self) -> u64 {
        self.base_frequency_mhz
    }

    /// Record the latest temperature reading.
    pub fn update_temperature(&self, temp_c: f32) {
        *self
            .current_temp_c
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = temp_c;
    }

    /// Temperature the next proof will carry.
    #[must_use]
    pub fn current_temperature(&self) -> f32 {
        *self
            .current_temp_c
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Generate a proof for `header_bytes`, record it in the history,
    /// and return the encoded u64.
    pub fn generate(&self, header_bytes: &[u8]) -> u64 {
        let workload = &header_bytes[..header_bytes.len().min(WORKLOAD_BYTES)];

        let start_cycles = self.time.cycles();
        let start_nanos = self.time.nanos();

        run_half_speed_chain(workload);

        let cycle_delta = self.time.cycles().saturating_sub(start_cycles);
        let elapsed_nanos = self.time.nanos().saturating_sub(start_nanos).max(1);

        // Integer-MHz truncation is part of the proof format.
        let elapsed_secs = elapsed_nanos as f64 / 1e9;
        let frequency_mhz = (cycle_delta as f64 / elapsed_secs / 1e6) as u64;

        let temp_c = self.current_temperature();
        let proof = ThermalProof {
            cycle_count: cycle_delta,
            expected_cycles: expected_cycles(workload.len(), temp_c),
            frequency_mhz,
            temp_c,
            timestamp_ms: unix_millis(),
            work_hash: Sha256::digest(header_bytes).into(),
        };

        self.push_history(proof);
        encode_proof(&proof)
    }

    /// Validate `proof` against a sealed header: strip the trailing
    /// 8-byte proof slot, regenerate, accept within ±tolerance %.
    #[must_use]
    pub fn validate(&self, proof: u64, sealed_header: &[u8]) -> bool {
        let stripped = &sealed_header[..sealed_header.len().saturating_sub(8)];
        let expected = self.generate(stripped);

        let range = (expected as f64 * self.tolerance_pct / 100.0) as u64;
        let min = expected.saturating_sub(range);
        let max = expected.saturating_add(range);
        proof >= min && proof <= max
    }

    /// Append the proof slot: header ∥ proof as little-endian u64.
    #[must_use]
    pub fn seal(&self, header_bytes: &[u8]) -> Vec<u8> {
        let proof = self.generate(header_bytes);
        let mut sealed = header_bytes.to_vec();
        sealed.extend_from_slice(&proof.to_le_bytes());
        sealed
    }

    /// Proof frequency sanity: within base ± tolerance %.
    #[must_use]
    pub fn frequency_in_bounds(&self, proof: &ThermalProof) -> bool {
        let range = self.base_frequency_mhz as f64 * self.tolerance_pct / 100.0;
        let delta = proof.frequency_mhz.abs_diff(self.base_frequency_mhz) as f64;
        delta <= range
    }

    /// Snapshot of the proof history, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<ThermalProof> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }

    /// Aggregate statistics over the proof history.
    #[must_use]
    pub fn statistics(&self) -> ThermalStatistics {
        let history = self.history();
        if history.is_empty() {
            return ThermalStatistics::default();
        }

        let count = history.len() as f32;
        let mut min_temp = f32::MAX;
        let mut max_temp = f32::MIN;
        let mut temp_sum = 0.0f32;
        let mut freq_sum = 0.0f64;
        for proof in &history {
            temp_sum += proof.temp_c;
            freq_sum += proof.frequency_mhz as f64;
            min_temp = min_temp.min(proof.temp_c);
            max_temp = max_temp.max(proof.temp_c);
        }
        let avg_temp = temp_sum / count;

        let variance = history
            .iter()
            .map(|p| {
                let d = p.temp_c - avg_temp;
                d * d
            })
            .sum::<f32>()
            / count;

        ThermalStatistics {
            avg_temp_c: avg_temp,
            min_temp_c: min_temp,
            max_temp_c: max_temp,
            stddev_temp_c: variance.sqrt(),
            avg_frequency_mhz: freq_sum / f64::from(count),
            samples: history.len(),
        }
    }

    /// Indices of history entries whose temperature z-score exceeds
    /// `threshold`. Flags only; rejection is a higher-layer decision.
    #[must_use]
    pub fn detect_cheating(&self, threshold: f64) -> Vec<usize> {
        detect_outliers(&self.history(), threshold)
    }

    fn push_history(&self, proof: ThermalProof) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        if history.len() == HISTORY_CAP {
            history.pop_front();
        }
        history.push_back(proof);
    }
}

/// Statistical outlier scan over a proof window.
///
/// Fewer than 10 samples yields an empty report: not enough data to
/// call anything an outlier.
#[must_use]
pub fn detect_outliers(proofs: &[ThermalProof], threshold: f64) -> Vec<usize> {
    if proofs.len() < CHEAT_WINDOW_MIN {
        return Vec::new();
    }

    let count = proofs.len() as f64;
    let mean = proofs.iter().map(|p| f64::from(p.temp_c)).sum::<f64>() / count;
    let variance = proofs
        .iter()
        .map(|p| {
            let d = f64::from(p.temp_c) - mean;
            d * d
        })
        .sum::<f64>()
        / count;
    let std_dev = variance.sqrt();
    if std_dev == 0.0 {
        return Vec::new();
    }

    proofs
        .iter()
        .enumerate()
        .filter(|(_, p)| (f64::from(p.temp_c) - mean).abs() / std_dev > threshold)
        .map(|(i, _)| i)
        .collect()
}

/// Thermal-compliant cycle budget for a workload.
///
/// Hot silicon is expected to be slower, cold silicon faster:
/// multiplier 1 + (t − 45)·0.02 above 45 °C, 1 − (35 − t)·0.01 below
/// 35 °C, 1 otherwise.
#[must_use]
pub fn expected_cycles(workload_len: usize, temp_c: f32) -> u64 {
    let base = workload_len as u64 * 100;
    let t = f64::from(temp_c);
    let multiplier = if t > 45.0 {
        1.0 + (t - 45.0) * 0.02
    } else if t < 35.0 {
        1.0 - (35.0 - t) * 0.01
    } else {
        1.0
    };
    (base as f64 * multiplier) as u64
}

/// The half-speed verification workload: one hash of the input, the
/// simulated-clock delay, then a 100-round SHA-256 chain.
fn run_half_speed_chain(workload: &[u8]) {
    let mut hash: [u8; 32] = Sha256::digest(workload).into();
    std::thread::sleep(HALF_SPEED_DELAY);
    for _ in 0..WORKLOAD_ROUNDS {
        hash = Sha256::digest(hash).into();
    }
    // The chain result is timing ballast; the proof packs the cycle
    // measurements, not the digest.
    std::hint::black_box(hash);
}

/// Pack a proof into its wire u64: SHA-256 over the four little-endian
/// measurement words, first 8 bytes as little-endian.
#[must_use]
pub fn encode_proof(proof: &ThermalProof) -> u64 {
    let mut packed = [0u8; 32];
    packed[0..8].copy_from_slice(&proof.cycle_count.to_le_bytes());
    packed[8..16].copy_from_slice(&proof.expected_cycles.to_le_bytes());
    packed[16..24].copy_from_slice(&proof.frequency_mhz.to_le_bytes());
    packed[24..32].copy_from_slice(&((proof.temp_c * 100.0) as u64).to_le_bytes());

    let digest = Sha256::digest(packed);
    u64::from_le_bytes(digest[..8].try_into().unwrap_or([0u8; 8]))
}

fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}
