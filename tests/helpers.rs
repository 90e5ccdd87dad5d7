// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Test utilities and fixtures for split combine integration tests.
//!
//! Split results are generated deterministically from a hash of the seed and
//! element index, so failures reproduce without an RNG dependency.

use anyhow::Result;
use candle_core::{Device, Tensor};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Shape and value pattern of a split combine problem.
#[derive(Debug, Clone)]
pub struct SplitProblemConfig {
    /// Sequences.
    pub batch: usize,
    /// Heads.
    pub nhead: usize,
    /// Splits.
    pub num_splits: usize,
    /// Query rows per sequence.
    pub seqlen_q: usize,
    /// Value head dimension.
    pub head_dim_v: usize,
    /// Spread of the per-split LSE values.
    pub lse_spread: f32,
    /// Pattern of `-inf` splits.
    pub masking: SplitMasking,
    /// Seed for reproducible tests.
    pub seed: u64,
}

/// Which splits carry `lse = -inf` (no keys in range).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitMasking {
    /// Every split saw keys.
    None,
    /// The last split is empty for every row.
    LastSplitEmpty,
    /// Every split is empty for every third row.
    EveryThirdRowEmpty,
}

impl Default for SplitProblemConfig {
    fn default() -> Self {
        Self {
            batch: 2,
            nhead: 3,
            num_splits: 5,
            seqlen_q: 37,
            head_dim_v: 80,
            lse_spread: 4.0,
            masking: SplitMasking::None,
            seed: 42,
        }
    }
}

impl SplitProblemConfig {
    /// LSE shape `[batch, nhead, num_splits, seqlen_q]`.
    pub fn lse_shape(&self) -> Vec<usize> {
        vec![self.batch, self.nhead, self.num_splits, self.seqlen_q]
    }

    /// Partial output shape `[batch, nhead, num_splits, seqlen_q, head_dim_v]`.
    pub fn o_shape(&self) -> Vec<usize> {
        let mut shape = self.lse_shape();
        shape.push(self.head_dim_v);
        shape
    }
}

/// Test fixtures for split combine inputs.
pub struct TestFixtures;

impl TestFixtures {
    /// Generate `(lse_acc, o_acc)` for a configuration.
    pub fn split_inputs(config: &SplitProblemConfig) -> Result<(Tensor, Tensor)> {
        let device = Device::Cpu;
        let lse_shape = config.lse_shape();
        let lse_count: usize = lse_shape.iter().product();

        let mut lse = Self::uniform_values(lse_count, config.lse_spread, config.seed);
        for (i, v) in lse.iter_mut().enumerate() {
            let row = i % config.seqlen_q;
            let split = (i / config.seqlen_q) % config.num_splits;
            let empty = match config.masking {
                SplitMasking::None => false,
                SplitMasking::LastSplitEmpty => split + 1 == config.num_splits,
                SplitMasking::EveryThirdRowEmpty => row % 3 == 0,
            };
            if empty {
                *v = f32::NEG_INFINITY;
            }
        }

        let o = Self::uniform_values(lse_count * config.head_dim_v, 1.0, config.seed + 7);
        Ok((
            Tensor::from_vec(lse, lse_shape, &device)?,
            Tensor::from_vec(o, config.o_shape(), &device)?,
        ))
    }

    /// Packed group-mode inputs `[nhead, num_splits, total_q]` for the given
    /// sequence lengths, plus `seqstart_q`.
    pub fn group_inputs(
        nhead: usize,
        num_splits: usize,
        seqlens: &[usize],
        head_dim_v: usize,
        seed: u64,
    ) -> Result<(Tensor, Tensor, Vec<usize>)> {
        let device = Device::Cpu;
        let mut seqstart_q = vec![0];
        for len in seqlens {
            seqstart_q.push(seqstart_q[seqstart_q.len() - 1] + len);
        }
        let total_q = seqstart_q[seqlens.len()];
        let lse_count = nhead * num_splits * total_q;
        let lse = Self::uniform_values(lse_count, 3.0, seed);
        let o = Self::uniform_values(lse_count * head_dim_v, 1.0, seed + 1);
        Ok((
            Tensor::from_vec(lse, (nhead, num_splits, total_q), &device)?,
            Tensor::from_vec(o, (nhead, num_splits, total_q, head_dim_v), &device)?,
            seqstart_q,
        ))
    }

    /// Uniform values in `[-max, max]`.
    pub fn uniform_values(count: usize, max: f32, seed: u64) -> Vec<f32> {
        (0..count)
            .map(|i| {
                let mut hasher = DefaultHasher::new();
                (seed + i as u64).hash(&mut hasher);
                let normalized = (hasher.finish() as f64) / (u64::MAX as f64);
                ((normalized * 2.0 - 1.0) * f64::from(max)) as f32
            })
            .collect()
    }
}

/// Accuracy metrics for numerical validation.
#[derive(Debug, Clone)]
pub struct AccuracyMetrics {
    /// Mean Absolute Error.
    pub mae: f64,
    /// Maximum absolute error.
    pub max_error: f64,
    /// Elements where exactly one side is non-finite or the infinities differ.
    pub non_finite_mismatches: usize,
}

/// Utility functions for accuracy validation.
pub struct ValidationUtils;

impl ValidationUtils {
    /// Compare two tensors of equal shape in `f64`.
    ///
    /// Matching infinities count as exact; NaN never matches.
    pub fn compare(actual: &Tensor, expected: &Tensor) -> Result<AccuracyMetrics> {
        assert_eq!(actual.dims(), expected.dims(), "Tensor dimensions must match");
        let a = actual
            .to_dtype(candle_core::DType::F64)?
            .flatten_all()?
            .to_vec1::<f64>()?;
        let e = expected
            .to_dtype(candle_core::DType::F64)?
            .flatten_all()?
            .to_vec1::<f64>()?;

        let mut sum_abs_error = 0.0;
        let mut max_error: f64 = 0.0;
        let mut non_finite_mismatches = 0;
        for (x, y) in a.iter().zip(&e) {
            if x.is_finite() && y.is_finite() {
                let error = (x - y).abs();
                sum_abs_error += error;
                max_error = max_error.max(error);
            } else if x != y {
                non_finite_mismatches += 1;
            }
        }

        Ok(AccuracyMetrics {
            mae: sum_abs_error / a.len().max(1) as f64,
            max_error,
            non_finite_mismatches,
        })
    }

    /// Assert that `actual` agrees with `expected` within `tolerance`.
    pub fn assert_close(actual: &Tensor, expected: &Tensor, tolerance: f64) -> Result<()> {
        let metrics = Self::compare(actual, expected)?;
        assert_eq!(
            metrics.non_finite_mismatches, 0,
            "non-finite mismatch: {metrics:?}"
        );
        assert!(
            metrics.max_error <= tolerance,
            "max error {} exceeds {tolerance}: {metrics:?}",
            metrics.max_error
        );
        Ok(())
    }
}

/// Timing utilities for performance validation.
pub struct TimingUtils;

impl TimingUtils {
    /// Time a function execution and return (result, duration_ms).
    pub fn time_execution<F, R>(f: F) -> (R, f64)
    where
        F: FnOnce() -> R,
    {
        let start = std::time::Instant::now();
        let result = f();
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        (result, duration_ms)
    }
}
