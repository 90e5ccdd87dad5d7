// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! # tilekit
//!
//! Tiled block kernels for merging split-KV attention results, built on
//! [Candle](https://github.com/huggingface/candle).
//!
//! Split-KV (flash-decoding) attention evaluates a query row against several
//! slices of the key/value sequence in parallel. Each split returns a partial
//! output and the log-sum-exp of its scores; this crate merges them into the
//! final output and the merged log-sum-exp.
//!
//! - Tile substrate: lane-grid distributions, tensor views and windows,
//!   block-wide reductions, scratch memory
//! - Five-stage combine pipeline, run per block on a lock-step block emulator
//! - Batch and packed variable-length (group) launch modes
//! - `CubeCL` CUDA kernel behind the `cuda` feature
//! - Workspace estimation utilities
//!
//! ## Status
//!
//! The host kernel emulates one GPU block per tile and runs output slabs in
//! parallel with rayon. The `CubeCL` path covers batch mode on CUDA inputs.
//!
//! ## Quick Start
//!
//! ```rust
//! use candle_core::{Device, Tensor};
//! use tilekit::kernels::combine::{combine_splits, CombineConfig};
//!
//! let device = Device::Cpu;
//! // [batch, nhead, num_splits, seqlen_q] and [.., head_dim_v]
//! let lse_acc = Tensor::zeros((1, 2, 4, 3), candle_core::DType::F32, &device)?;
//! let o_acc = Tensor::ones((1, 2, 4, 3, 64), candle_core::DType::F32, &device)?;
//!
//! let result = combine_splits(&lse_acc, &o_acc, &CombineConfig::default())?;
//! assert_eq!(result.output.dims(), &[1, 2, 3, 64]);
//! # Ok::<(), tilekit::TilekitError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod kernels;
pub mod memory;

pub use error::{Result, TilekitError};
