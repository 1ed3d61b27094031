// SPDX-License-Identifier: AGPL-3.0-only

//! Platform NPU backend over the host's neural provider contract.
//!
//! The host (NNAPI on Android, Core ML on iOS) is an external
//! collaborator exposing exactly one capability: compile a small
//! convolution model, then run inference against it. No platform type
//! leaks past this module; the hasher only ever sees tensors.

use super::Tensor;
use crate::error::MobileXError;

/// Estimated platform NPU power draw, watts.
pub const PLATFORM_POWER_WATTS: f32 = 2.0;

/// The single model the protocol defines: 3×3×3 kernel with the
/// center weight 1.0 and zero bias, compiled for a fast single answer.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvModelSpec {
    /// Expected input shape.
    pub input_shape: [usize; 4],
    /// Expected output shape.
    pub output_shape: [usize; 4],
    /// Flattened 3×3×3 kernel weights.
    pub weights: [f32; 27],
    /// Single output bias.
    pub bias: f32,
    /// Pin the platform's "fast single answer" compilation preference.
    pub prefer_fast_single_answer: bool,
}

impl ConvModelSpec {
    /// The protocol-fixed convolution model.
    #[must_use]
    pub fn protocol() -> Self {
        let mut weights = [0.0f32; 27];
        weights[13] = 1.0; // center of the 3×3×3 kernel
        Self {
            input_shape: super::INPUT_SHAPE,
            output_shape: super::OUTPUT_SHAPE,
            weights,
            bias: 0.0,
            prefer_fast_single_answer: true,
        }
    }
}

/// Host-registered neural provider: the platform's native-neural API
/// reduced to a compile-and-infer contract.
pub trait NeuralProvider: Send {
    /// Compile `model` once; called a single time at engine init.
    fn compile(&mut self, model: &ConvModelSpec) -> Result<(), MobileXError>;

    /// Run inference against the compiled model.
    fn infer(&mut self, input: &Tensor) -> Result<Tensor, MobileXError>;

    /// Human-readable platform identifier, e.g. "android-nnapi".
    fn platform_name(&self) -> &str;
}

/// Platform backend: a provider that compiled the protocol model.
pub struct PlatformBackend {
    provider: Box<dyn NeuralProvider>,
}

impl PlatformBackend {
    /// Compile the protocol model on `provider`. Failure here means
    /// the platform has no usable NPU; the engine degrades to CPU.
    pub fn compile(mut provider: Box<dyn NeuralProvider>) -> Result<Self, MobileXError> {
        provider.compile(&ConvModelSpec::protocol())?;
        Ok(Self { provider })
    }

    /// Run one inference.
    pub fn infer(&mut self, input: &Tensor) -> Result<Tensor, MobileXError> {
        self.provider.infer(input)
    }

    /// The provider's platform identifier.
    #[must_use]
    pub fn name(&self) -> &str {
        self.provider.platform_name()
    }
}
