// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Candle ↔ `CubeCL` tensor conversion utilities.
//!
//! ## Key Functions
//!
//! - [`candle_to_cubecl_handle`] - Convert a CUDA Candle tensor to `f32` buffer bytes
//! - [`cubecl_to_candle_tensor`] - Convert `CubeCL` output bytes back to a Candle tensor
//! - [`has_cubecl_cuda_support`] - Check if the CUDA runtime is available
//!
//! Buffers are always `f32`; half-precision tensors are widened on the way in
//! and narrowed by the caller on the way out.

use crate::error::{Result, TilekitError};
use crate::kernels::element::NumericKind;
use candle_core::{DType, Device, Tensor};

/// Bytes per buffer element.
const F32_BYTES: usize = 4;

/// Check if `CubeCL` CUDA runtime support is available.
///
/// `true` only when the `cuda` feature is compiled in and a CUDA device is
/// visible at runtime.
///
/// # Example
///
/// ```rust
/// use tilekit::kernels::cubecl::has_cubecl_cuda_support;
///
/// if has_cubecl_cuda_support() {
///     println!("CubeCL CUDA acceleration available!");
/// } else {
///     println!("Falling back to the host kernel");
/// }
/// ```
#[must_use]
pub fn has_cubecl_cuda_support() -> bool {
    #[cfg(feature = "cuda")]
    {
        matches!(Device::cuda_if_available(0), Ok(Device::Cuda(_)))
    }

    #[cfg(not(feature = "cuda"))]
    {
        false
    }
}

/// Convert a CUDA Candle tensor to little-endian `f32` bytes.
///
/// Returns `(bytes, shape)`. `f16`, `bf16` and `f64` tensors are converted
/// to `f32` first.
///
/// # Errors
///
/// Returns error if the tensor is not on a CUDA device or is not a floating
/// point tensor.
pub fn candle_to_cubecl_handle(tensor: &Tensor) -> Result<(Vec<u8>, Vec<usize>)> {
    if !matches!(tensor.device(), Device::Cuda(_)) {
        return Err(TilekitError::DeviceNotAvailable(
            "candle_to_cubecl_handle requires CUDA tensor".to_string(),
        ));
    }
    NumericKind::from_dtype(tensor.dtype())?;

    let shape = tensor.dims().to_vec();
    // device-to-host copy
    let data: Vec<f32> = tensor.to_dtype(DType::F32)?.flatten_all()?.to_vec1()?;
    Ok((f32_to_bytes(&data), shape))
}

/// Convert `CubeCL` output bytes to an `f32` Candle tensor.
///
/// # Errors
///
/// Returns error if the device is not CUDA or the byte count does not match
/// `shape`.
pub fn cubecl_to_candle_tensor(bytes: &[u8], shape: &[usize], device: &Device) -> Result<Tensor> {
    if !matches!(device, Device::Cuda(_)) {
        return Err(TilekitError::DeviceNotAvailable(
            "cubecl_to_candle_tensor requires CUDA device".to_string(),
        ));
    }
    let data = bytes_to_f32(bytes, shape.iter().product())?;
    Ok(Tensor::from_vec(data, shape, device)?)
}

/// Encode `f32` values as little-endian bytes.
#[must_use]
pub fn f32_to_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode little-endian `f32` bytes, checking the element count.
///
/// # Errors
///
/// Returns [`TilekitError::ShapeMismatch`] if `bytes` does not hold exactly
/// `num_elements` values.
pub fn bytes_to_f32(bytes: &[u8], num_elements: usize) -> Result<Vec<f32>> {
    if bytes.len() != num_elements * F32_BYTES {
        return Err(TilekitError::ShapeMismatch {
            expected: vec![num_elements * F32_BYTES],
            actual: vec![bytes.len()],
        });
    }
    Ok(bytes
        .chunks_exact(F32_BYTES)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
