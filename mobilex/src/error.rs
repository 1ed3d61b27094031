// SPDX-License-Identifier: AGPL-3.0-only

//! Typed errors for the MobileX engine.
//!
//! Only `InitFailed` travels up the call chain; every other failure
//! mode is absorbed where it happens (sensor fallbacks, NPU fallback
//! latching, affinity best-effort) per the engine's degradation policy.

use std::fmt;

/// Errors surfaced by the MobileX engine.
#[derive(Debug)]
pub enum MobileXError {
    /// One-time startup failure (cache build, feature probe). An
    /// unavailable NPU is NOT this — it degrades to the CPU fallback.
    InitFailed(String),

    /// A platform NPU inference failed. Latched by the engine, which
    /// switches to the CPU fallback for the rest of the session.
    NpuExecFailed(String),

    /// A tensor did not match the shape the model was compiled for.
    ShapeMismatch {
        /// Element count the operation expects.
        expected: usize,
        /// Element count the caller supplied.
        got: usize,
    },
}

impl fmt::Display for MobileXError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitFailed(msg) => write!(f, "engine initialization failed: {msg}"),
            Self::NpuExecFailed(msg) => write!(f, "NPU execution failed: {msg}"),
            Self::ShapeMismatch { expected, got } => {
                write!(f, "tensor shape mismatch: expected {expected} elements, got {got}")
            }
        }
    }
}

impl std::error::Error for MobileXError {}
