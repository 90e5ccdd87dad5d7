// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Candle reference for the split combine.
//!
//! Computes in `f64` with plain tensor ops; used to validate the block
//! kernel and the GPU path.

use candle_core::{DType, Tensor};

use crate::error::{Result, TilekitError};

/// Combine partial results along the split axis with candle ops.
///
/// The split axis is the second-to-last axis of `lse_acc` (and the same axis
/// of `o_acc`), so flat, batch and group layouts are all accepted.
///
/// Returns `(output, lse)` as `f64` tensors.
///
/// # Errors
///
/// Returns [`TilekitError::ShapeMismatch`] if `o_acc` is not `lse_acc`'s
/// shape plus a trailing head dimension.
pub fn combine_splits_reference(lse_acc: &Tensor, o_acc: &Tensor) -> Result<(Tensor, Tensor)> {
    let lse_dims = lse_acc.dims();
    let o_dims = o_acc.dims();
    if lse_dims.len() < 2 || o_dims.len() != lse_dims.len() + 1 || o_dims[..lse_dims.len()] != *lse_dims {
        return Err(TilekitError::ShapeMismatch {
            expected: lse_dims.to_vec(),
            actual: o_dims.to_vec(),
        });
    }
    let axis = lse_dims.len() - 2;

    let lse = lse_acc.to_dtype(DType::F64)?;
    let o = o_acc.to_dtype(DType::F64)?;

    // all -inf rows get a finite shift so exp() yields 0 instead of NaN
    let max = lse.max_keepdim(axis)?.maximum(f64::MIN)?;
    let exp = lse.broadcast_sub(&max)?.exp()?;
    let sum = exp.sum_keepdim(axis)?;
    let weights = exp.broadcast_div(&sum.maximum(f64::MIN_POSITIVE)?)?;

    let output = o
        .broadcast_mul(&weights.unsqueeze(lse_dims.len())?)?
        .sum(axis)?;
    let lse_logsum = sum.log()?.add(&max)?.squeeze(axis)?;
    Ok((output, lse_logsum))
}
