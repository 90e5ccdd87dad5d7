// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! `CubeCL` GPU kernels for the split combine.
//!
//! ## Module Structure
//!
//! - [`interop`] - Candle ↔ `CubeCL` buffer conversion utilities
//! - [`kernel`] - Row-parallel split combine kernel and its launch wrapper
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tilekit::kernels::combine::{CombineConfig, CombineProblem};
//! use tilekit::kernels::cubecl::combine_splits_cubecl;
//!
//! let problem = CombineProblem::from_batch(lse_acc.dims(), o_acc.dims())?;
//! let result = combine_splits_cubecl(&lse_acc, &o_acc, &problem, &CombineConfig::default())?;
//! ```
//!
//! Callers normally go through
//! [`combine_splits`](crate::kernels::combine::combine_splits), which falls
//! back to the host kernel when this path is unavailable.

pub mod interop;
pub mod kernel;

pub use interop::{
    bytes_to_f32, candle_to_cubecl_handle, cubecl_to_candle_tensor, f32_to_bytes,
    has_cubecl_cuda_support,
};
#[cfg(feature = "cuda")]
pub use kernel::combine_splits_cubecl;
pub use kernel::{launch_dims, MAX_CUBE_DIM, SHARED_SPLITS};
