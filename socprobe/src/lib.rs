// SPDX-License-Identifier: AGPL-3.0-only

// Library code must propagate or absorb errors, not panic:
#![deny(clippy::expect_used, clippy::unwrap_used)]
#![warn(missing_docs)]

//! SoC hardware probing for mobile mining.
//!
//! Pure observation, no state machines. Everything here is read from
//! Linux/Android sysfs and procfs, with documented fallback chains and
//! safe defaults when no source is readable. A failed read is not an
//! error — it is a "source unavailable" condition logged at DEBUG.
//!
//! # Architecture
//!
//! - **`sensors`** — battery level, charging status, battery/SoC
//!   temperature via the `SensorSource` capability
//! - **`topology`** — CPU core count and big/LITTLE discovery
//! - **`features`** — ARM64 feature bits and cache geometry
//!
//! The `SensorSource` seam exists so platform variants and tests can
//! substitute deterministic sources for the sysfs reads.

/// ARM64 feature bits and cache geometry.
pub mod features;
/// Battery, charging, and thermal sysfs readers.
pub mod sensors;
/// CPU topology detection (big/LITTLE).
pub mod topology;

pub use features::ArmFeatures;
pub use sensors::{HardwareProbe, SensorSource, SysfsSource};
pub use topology::CoreTopology;
