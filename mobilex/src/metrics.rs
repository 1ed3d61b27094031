// SPDX-License-Identifier: AGPL-3.0-only

//! Mining metrics collection.
//!
//! Snapshots are cheap value objects recorded into a bounded ring;
//! error counts are tallied by label so the host can surface "NPU
//! fell back 3 times" without parsing logs.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

/// Retained metrics snapshots.
const SNAPSHOT_CAP: usize = 100;

/// One metrics snapshot, serializable for host-side reporting.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MiningMetrics {
    /// Total hash rate, hashes per second.
    pub hash_rate: f64,
    /// Hashes completed since mining started.
    pub hashes_completed: u64,
    /// Device temperature, Celsius.
    pub temperature_c: f32,
    /// Estimated power draw, watts.
    pub power_watts: f64,
    /// NPU utilization, 0–100.
    pub npu_utilization_pct: f32,
    /// Seconds since mining started.
    pub uptime_secs: f64,
}

/// Bounded metrics ring plus labeled error tallies.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    snapshots: Mutex<VecDeque<MiningMetrics>>,
    errors: Mutex<HashMap<String, u64>>,
}

impl MetricsCollector {
    /// Empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a snapshot, evicting the oldest at capacity.
    pub fn record(&self, metrics: MiningMetrics) {
        let mut snapshots = self
            .snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if snapshots.len() == SNAPSHOT_CAP {
            snapshots.pop_front();
        }
        snapshots.push_back(metrics);
    }

    /// Most recent snapshot, if any.
    #[must_use]
    pub fn latest(&self) -> Option<MiningMetrics> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .back()
            .copied()
    }

    /// All retained snapshots, oldest first.
    #[must_use]
    pub fn snapshots(&self) -> Vec<MiningMetrics> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }

    /// Tally an error under `label`.
    pub fn record_error(&self, label: &str) {
        let mut errors = self.errors.lock().unwrap_or_else(PoisonError::into_inner);
        *errors.entry(label.to_string()).or_insert(0) += 1;
    }

    /// Count of errors tallied under `label`.
    #[must_use]
    pub fn error_count(&self, label: &str) -> u64 {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(label)
            .copied()
            .unwrap_or(0)
    }
}
