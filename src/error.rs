// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Error types for tilekit.

use thiserror::Error;

/// Result type alias for tilekit operations.
pub type Result<T> = std::result::Result<T, TilekitError>;

/// Errors that can occur in tilekit operations.
///
/// Numerical edge cases (rows where every split is `-inf`, padding rows and
/// columns) are not errors; they resolve to well-defined values inside the
/// kernels. These variants cover host-side problems only.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TilekitError {
    /// GPU kernel error.
    #[error("kernel error: {0}")]
    Kernel(String),

    /// Device not available.
    #[error("device not available: {0}")]
    DeviceNotAvailable(String),

    /// Shape mismatch.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Expected shape
        expected: Vec<usize>,
        /// Actual shape
        actual: Vec<usize>,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid tile distribution.
    #[error("invalid tile distribution: {0}")]
    InvalidDistribution(String),

    /// Data type not supported by a kernel.
    #[error("unsupported dtype: {0}")]
    UnsupportedDType(String),

    /// Candle error.
    #[error("candle error: {0}")]
    Candle(#[from] candle_core::Error),
}
