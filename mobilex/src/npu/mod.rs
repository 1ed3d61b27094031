// SPDX-License-Identifier: AGPL-3.0-only

//! NPU abstraction — one fixed convolution, two backends.
//!
//! The engine executes a single protocol-fixed depthwise-separable
//! 3×3 convolution on a `[1, 32, 32, 3]` tensor, preferring platform
//! NPU hardware and falling back to the always-available CPU
//! reference implementation. Any platform inference failure latches
//! the fallback for the rest of the session.
//!
//! Platform backends are not required to be reentrant, so the engine
//! serializes access; the CPU path is reentrant but shares the same
//! serialized entry for uniform metrics accounting.

/// CPU reference convolution (always available).
pub mod cpu;
/// Platform backend over the host's neural provider contract.
pub mod platform;

pub use cpu::CpuConvBackend;
pub use platform::{ConvModelSpec, NeuralProvider, PlatformBackend};

use crate::error::MobileXError;
use log::warn;
use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

/// Fixed input shape: batch, height, width, channels.
pub const INPUT_SHAPE: [usize; 4] = [1, 32, 32, 3];
/// Fixed output shape: single channel.
pub const OUTPUT_SHAPE: [usize; 4] = [1, 32, 32, 1];
/// Bytes consumed from a VM state when building the input tensor.
pub const STATE_WINDOW_BYTES: usize = 32 * 32 * 3;
/// Bytes produced when converting an output tensor back to state.
pub const STATE_BYTES: usize = 2048;

/// Value object: flattened f32 data plus its shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: Vec<f32>,
    shape: Vec<usize>,
}

impl Tensor {
    /// Tensor from data and shape; the element count must match.
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Result<Self, MobileXError> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(MobileXError::ShapeMismatch {
                expected,
                got: data.len(),
            });
        }
        Ok(Self { data, shape })
    }

    /// Zero-filled tensor of the given shape.
    #[must_use]
    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            data: vec![0.0; shape.iter().product()],
            shape: shape.to_vec(),
        }
    }

    /// Flattened element view.
    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutable flattened element view.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Shape dimensions.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Total element count.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.data.len()
    }
}

/// Per-op performance metrics, incrementally averaged.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct NpuMetrics {
    /// Backend utilization estimate, 0–100.
    pub utilization_pct: f32,
    /// Estimated power draw in watts.
    pub power_watts: f32,
    /// Operations executed so far.
    pub total_ops: u64,
    /// Incrementally averaged per-op latency in milliseconds.
    pub avg_latency_ms: f64,
}

impl NpuMetrics {
    fn record(&mut self, latency_ms: f64, utilization_pct: f32, power_watts: f32) {
        self.total_ops += 1;
        let n = self.total_ops as f64;
        self.avg_latency_ms = (self.avg_latency_ms * (n - 1.0) + latency_ms) / n;
        self.utilization_pct = utilization_pct;
        self.power_watts = power_watts;
    }
}

struct EngineInner {
    platform: Option<PlatformBackend>,
    cpu: CpuConvBackend,
    using_fallback: bool,
    metrics: NpuMetrics,
}

/// Neural-op dispatcher: platform backend with CPU fallback.
pub struct NpuEngine {
    inner: Mutex<EngineInner>,
}

impl Default for NpuEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl NpuEngine {
    /// Engine with only the CPU reference backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(EngineInner {
                platform: None,
                cpu: CpuConvBackend::new(),
                using_fallback: true,
                metrics: NpuMetrics::default(),
            }),
        }
    }

    /// Engine over a host-registered neural provider.
    ///
    /// Compilation happens once, here. A provider that fails to compile
    /// is not an init failure — the engine degrades to the CPU backend.
    #[must_use]
    pub fn with_provider(provider: Box<dyn NeuralProvider>) -> Self {
        let engine = Self::new();
        engine.install_provider(provider);
        engine
    }

    /// Install (or replace) the platform provider at runtime.
    pub fn install_provider(&self, provider: Box<dyn NeuralProvider>) {
        let mut inner = self.lock();
        match PlatformBackend::compile(provider) {
            Ok(backend) => {
                inner.platform = Some(backend);
                inner.using_fallback = false;
            }
            Err(e) => {
                warn!("platform NPU unavailable, staying on CPU fallback: {e}");
                inner.platform = None;
                inner.using_fallback = true;
            }
        }
    }

    /// Execute the fixed convolution. Always returns a valid
    /// `[1, 32, 32, 1]` tensor for a well-shaped input.
    pub fn execute(&self, input: &Tensor) -> Result<Tensor, MobileXError> {
        let expected: usize = INPUT_SHAPE.iter().product();
        if input.element_count() != expected {
            return Err(MobileXError::ShapeMismatch {
                expected,
                got: input.element_count(),
            });
        }

        let mut inner = self.lock();
        let start = Instant::now();

        let output = if inner.using_fallback {
            inner.cpu.infer(input)
        } else {
            match inner.platform.as_mut().map(|p| p.infer(input)) {
                Some(Ok(out)) => out,
                Some(Err(e)) => {
                    // Latched: the platform backend is out for the session.
                    warn!("platform NPU inference failed, latching CPU fallback: {e}");
                    inner.using_fallback = true;
                    inner.cpu.infer(input)
                }
                None => inner.cpu.infer(input),
            }
        };

        let latency_ms = start.elapsed().as_secs_f64() * 1e3;
        let (util, watts) = if inner.using_fallback {
            (cpu::CPU_UTILIZATION_PCT, cpu::CPU_POWER_WATTS)
        } else {
            let util = (inner.metrics.utilization_pct + 1.0).min(100.0);
            (util, platform::PLATFORM_POWER_WATTS)
        };
        inner.metrics.record(latency_ms, util, watts);

        Ok(output)
    }

    /// Run the neural step over an arbitrary VM state.
    ///
    /// The first 3072 bytes map to `[1, 32, 32, 3]` as `x / 255`;
    /// the output maps back to 2048 bytes as `clamp(y · 255, 0, 255)`.
    #[must_use]
    pub fn process_state(&self, vm_state: &[u8]) -> Vec<u8> {
        let input = state_to_tensor(vm_state);
        // Shape is correct by construction; on the impossible error
        // path the state passes through unchanged.
        match self.execute(&input) {
            Ok(output) => tensor_to_state(&output),
            Err(_) => vm_state.iter().copied().take(STATE_BYTES).collect(),
        }
    }

    /// Human-readable name of the active backend.
    #[must_use]
    pub fn platform_name(&self) -> String {
        let inner = self.lock();
        if inner.using_fallback {
            inner.cpu.name().to_string()
        } else {
            inner
                .platform
                .as_ref()
                .map_or_else(|| inner.cpu.name().to_string(), |p| p.name().to_string())
        }
    }

    /// Whether the CPU fallback is (or has been latched) active.
    #[must_use]
    pub fn using_fallback(&self) -> bool {
        self.lock().using_fallback
    }

    /// Current metrics snapshot.
    #[must_use]
    pub fn metrics(&self) -> NpuMetrics {
        self.lock().metrics
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EngineInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// First 3072 state bytes → `[1, 32, 32, 3]`, `x / 255`.
#[must_use]
pub fn state_to_tensor(state: &[u8]) -> Tensor {
    let mut tensor = Tensor::zeros(&INPUT_SHAPE);
    for (value, byte) in tensor.data_mut().iter_mut().zip(state.iter().take(STATE_WINDOW_BYTES)) {
        *value = f32::from(*byte) / 255.0;
    }
    tensor
}

/// Output tensor → 2048 state bytes, `clamp(y · 255, 0, 255)`.
#[must_use]
pub fn tensor_to_state(tensor: &Tensor) -> Vec<u8> {
    let mut state = vec![0u8; STATE_BYTES];
    for (byte, value) in state.iter_mut().zip(tensor.data()) {
        *byte = (value * 255.0).clamp(0.0, 255.0) as u8;
    }
    state
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn tensor_shape_validation() {
        assert!(Tensor::new(vec![0.0; 12], vec![2, 2, 3]).is_ok());
        let err = Tensor::new(vec![0.0; 11], vec![2, 2, 3]);
        assert!(matches!(
            err,
            Err(MobileXError::ShapeMismatch {
                expected: 12,
                got: 11
            })
        ));
    }

    #[test]
    fn cpu_only_engine_reports_fallback() {
        let engine = NpuEngine::new();
        assert!(engine.using_fallback());
        assert_eq!(engine.platform_name(), "cpu-reference");
    }

    #[test]
    fn execute_rejects_wrong_shape() {
        let engine = NpuEngine::new();
        let bad = Tensor::zeros(&[1, 16, 16, 3]);
        assert!(engine.execute(&bad).is_err());
    }

    #[test]
    fn execute_returns_output_shape() {
        let engine = NpuEngine::new();
        let out = engine
            .execute(&Tensor::zeros(&INPUT_SHAPE))
            .expect("execute");
        assert_eq!(out.shape(), &OUTPUT_SHAPE[..]);
        assert_eq!(out.element_count(), 1024);
    }

    #[test]
    fn metrics_count_ops_and_average_latency() {
        let engine = NpuEngine::new();
        let input = Tensor::zeros(&INPUT_SHAPE);
        for _ in 0..3 {
            engine.execute(&input).expect("execute");
        }
        let m = engine.metrics();
        assert_eq!(m.total_ops, 3);
        assert!(m.avg_latency_ms >= 0.0);
        assert!((m.utilization_pct - cpu::CPU_UTILIZATION_PCT).abs() < f32::EPSILON);
    }

    #[test]
    fn state_round_trips_within_one_count() {
        let state: Vec<u8> = (0..STATE_BYTES).map(|i| (i % 256) as u8).collect();
        let tensor = state_to_tensor(&state);
        let back = tensor_to_state(&tensor);
        for (i, (a, b)) in state.iter().zip(back.iter()).take(1024).enumerate() {
            assert!(
                (i32::from(*a) - i32::from(*b)).abs() <= 1,
                "byte {i}: {a} vs {b}"
            );
        }
    }

    #[test]
    fn state_to_tensor_zero_pads_short_state() {
        let tensor = state_to_tensor(&[255u8; 16]);
        assert!((tensor.data()[15] - 1.0).abs() < 1e-6);
        assert!(tensor.data()[16].abs() < f32::EPSILON);
    }

    #[test]
    fn tensor_to_state_clamps() {
        let mut t = Tensor::zeros(&OUTPUT_SHAPE);
        t.data_mut()[0] = 2.0;
        t.data_mut()[1] = -1.0;
        let state = tensor_to_state(&t);
        assert_eq!(state[0], 255);
        assert_eq!(state[1], 0);
    }

    #[test]
    fn process_state_output_is_2048_bytes() {
        let engine = NpuEngine::new();
        let out = engine.process_state(&[0x5Au8; STATE_BYTES]);
        assert_eq!(out.len(), STATE_BYTES);
    }

    #[test]
    fn serialize_metrics_report() {
        let engine = NpuEngine::new();
        engine
            .execute(&Tensor::zeros(&INPUT_SHAPE))
            .expect("execute");
        let json = serde_json::to_string(&engine.metrics()).expect("serialize");
        assert!(json.contains("total_ops"));
    }
}
