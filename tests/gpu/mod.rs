// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! GPU-specific test module for tilekit.
//!
//! Tests here exercise the `CubeCL` combine kernel. They are skipped when:
//!
//! 1. The `cuda` feature is not enabled
//! 2. No CUDA-capable GPU is available
//!
//! ## Running GPU Tests
//!
//! ```bash
//! cargo test --features cuda --test integration
//! ```

pub mod combine;

/// Check if a CUDA GPU is available for testing.
///
/// Creates a device and runs a small reduction to confirm it works.
#[cfg(feature = "cuda")]
pub fn is_gpu_available() -> bool {
    use candle_core::Device;

    match Device::new_cuda(0) {
        Ok(device) => match candle_core::Tensor::ones((2, 2), candle_core::DType::F32, &device)
            .and_then(|t| t.sum_all())
        {
            Ok(_) => {
                tracing::info!("GPU detected and functional: {:?}", device);
                true
            }
            Err(e) => {
                tracing::warn!("GPU detected but tensor operations failed: {}", e);
                false
            }
        },
        Err(e) => {
            tracing::warn!("No CUDA GPU available: {}", e);
            false
        }
    }
}

/// Fallback when the CUDA feature is not enabled.
#[cfg(not(feature = "cuda"))]
pub fn is_gpu_available() -> bool {
    false
}

/// Skip a test if GPU is not available with informative message.
///
/// This macro works with `Result<(), _>` return types by returning `Ok(())`.
#[macro_export]
macro_rules! require_gpu {
    () => {
        if !crate::gpu::is_gpu_available() {
            eprintln!("SKIP: Test requires CUDA GPU - use 'cargo test --features cuda'");
            return Ok(());
        }
    };
}
