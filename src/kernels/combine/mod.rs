// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Split-KV attention combine.
//!
//! Split-KV attention computes each query row against several slices of the
//! key/value sequence independently. Every split produces an unnormalized
//! output `o_acc[split]` and the log-sum-exp of its scores `lse_acc[split]`.
//! This module merges them:
//!
//! ```text
//! lse    = log(sum_s exp(lse_acc[s]))
//! output = sum_s exp(lse_acc[s] - lse) * o_acc[s]
//! ```
//!
//! ## Module Structure
//!
//! - [`config`] - Tile sizes, lane layout, padding and postprocessing
//! - [`policy`] - Tile distributions derived from a configuration
//! - [`pipeline`] - The five-stage block pipeline
//! - [`launch`] - Shape validation, launch planning and the host kernel
//! - [`reference`] - Candle reference implementation
//!
//! ## Usage
//!
//! ```rust
//! use candle_core::{Device, Tensor};
//! use tilekit::kernels::combine::{combine_splits, CombineConfig};
//!
//! let device = Device::Cpu;
//! // [num_splits = 2, rows = 1] and [num_splits, rows, head_dim_v = 2]
//! let lse_acc = Tensor::new(&[[0.0f32], [0.0]], &device)?;
//! let o_acc = Tensor::new(&[[[1.0f32, 3.0]], [[3.0, 5.0]]], &device)?;
//!
//! let result = combine_splits(&lse_acc, &o_acc, &CombineConfig::default())?;
//! let out = result.output.to_vec2::<f32>()?;
//! assert!((out[0][0] - 2.0).abs() < 1e-5 && (out[0][1] - 4.0).abs() < 1e-5);
//! # Ok::<(), tilekit::TilekitError>(())
//! ```

pub mod config;
pub mod launch;
pub mod pipeline;
pub mod policy;
pub mod reference;

use candle_core::{Device, Tensor};
use tracing::debug;

pub use config::CombineConfig;
pub use launch::{combine_on_host, CombineMode, CombineOutput, CombineProblem, LaunchPlan};
pub use pipeline::{CombineBlock, CombinePipeline, LseSink};
pub use policy::CombinePolicy;
pub use reference::combine_splits_reference;

use crate::error::Result;
use crate::kernels::cubecl::has_cubecl_cuda_support;

/// Combine split-KV partial results.
///
/// Accepts flat `[num_splits, rows]` / `[num_splits, rows, head_dim_v]` or
/// batched `[batch, nhead, num_splits, seqlen_q]` /
/// `[batch, nhead, num_splits, seqlen_q, head_dim_v]` inputs. Runs on the GPU
/// when the `cuda` feature is enabled and a device is present, otherwise on
/// the emulated block kernel.
///
/// # Errors
///
/// Returns an error if shapes are inconsistent, the split count exceeds
/// `config.max_splits`, or the configuration is invalid.
pub fn combine_splits(lse_acc: &Tensor, o_acc: &Tensor, config: &CombineConfig) -> Result<CombineOutput> {
    let problem = CombineProblem::from_batch(lse_acc.dims(), o_acc.dims())?;
    problem.check(config)?;

    if !has_cubecl_cuda_support() || !matches!(o_acc.device(), Device::Cuda(_)) {
        debug!("CubeCL CUDA not available for these inputs, using host kernel");
        return combine_on_host(lse_acc, o_acc, &problem, config);
    }

    #[cfg(feature = "cuda")]
    {
        match crate::kernels::cubecl::combine_splits_cubecl(lse_acc, o_acc, &problem, config) {
            Ok(output) => return Ok(output),
            Err(e) => {
                tracing::warn!("CubeCL combine launch failed: {}, using host kernel", e);
            }
        }
    }

    combine_on_host(lse_acc, o_acc, &problem, config)
}

/// Combine packed variable-length partial results.
///
/// Inputs are `[nhead, num_splits, total_q]` / `[nhead, num_splits, total_q,
/// head_dim_v]`; sequence `b` occupies rows `seqstart_q[b]..seqstart_q[b + 1]`.
/// Blocks never straddle two sequences.
///
/// # Errors
///
/// Returns an error if shapes are inconsistent, `seqstart_q` is malformed,
/// or the configuration is invalid.
pub fn combine_splits_varlen(
    lse_acc: &Tensor,
    o_acc: &Tensor,
    seqstart_q: &[usize],
    config: &CombineConfig,
) -> Result<CombineOutput> {
    let problem = CombineProblem::from_group(lse_acc.dims(), o_acc.dims(), seqstart_q)?;
    combine_on_host(lse_acc, o_acc, &problem, config)
}
