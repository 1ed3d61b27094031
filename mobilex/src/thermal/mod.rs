// SPDX-License-Identifier: AGPL-3.0-only

//! Thermal subsystem — monitoring, proofs, cheat detection.
//!
//! - **`monitor`** — background temperature polling and the
//!   NORMAL / THROTTLE / CRITICAL state machine
//! - **`pmu`** — cycle-counter capability (PMCCNTR_EL0 or wall clock)
//! - **`proof`** — cycle-counted thermal proofs and the statistical
//!   cheat detector

/// Background polling and thermal state classification.
pub mod monitor;
/// Cycle counter capability.
pub mod pmu;
/// Thermal proof generation, validation, statistics.
pub mod proof;

pub use monitor::{ThermalMonitor, ThermalState};
pub use pmu::{MonotonicTimeSource, TimeSource};
pub use proof::{detect_outliers, ThermalProof, ThermalStatistics, ThermalVerifier};
