// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Tiled block kernels.
//!
//! - [`tile`] - Lane distributions, windows, block emulation and reductions
//! - [`element`] - Numeric kinds and elementwise operators
//! - [`combine`] - Split-KV attention combine
//! - [`elementwise`] - Strided elementwise kernel with an output permutation
//! - [`cubecl`] - GPU path for the combine

pub mod combine;
pub mod cubecl;
pub mod element;
pub mod elementwise;
pub mod tile;

pub use combine::{combine_splits, combine_splits_varlen, CombineConfig, CombineOutput};
pub use element::{ElementOp, NumericKind};
pub use elementwise::elementwise_permute;
