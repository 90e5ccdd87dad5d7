// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Block-level tile reduction.
//!
//! Reduction runs in two phases, mirroring how a lane-group reduces on
//! hardware:
//!
//! 1. each lane folds the in-tile slots it owns along the axis, starting
//!    from the neutral element so padding slots never contribute;
//! 2. lanes sharing the kept coordinates exchange partials through an
//!    XOR butterfly until every one of them holds the full result.
//!
//! The butterfly only pairs lanes inside one lane-group.

use super::block::BlockContext;
use super::distributed::DistributedTile;
use crate::error::{Result, TilekitError};

/// Built-in reduction operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    /// Maximum, neutral `-inf`.
    Max,
    /// Minimum, neutral `+inf`.
    Min,
    /// Sum, neutral `0`.
    Sum,
}

impl ReduceOp {
    /// Neutral element.
    #[must_use]
    pub const fn identity(self) -> f32 {
        match self {
            Self::Max => f32::NEG_INFINITY,
            Self::Min => f32::INFINITY,
            Self::Sum => 0.0,
        }
    }

    /// Combine two values.
    #[must_use]
    pub fn combine(self, a: f32, b: f32) -> f32 {
        match self {
            Self::Max => a.max(b),
            Self::Min => a.min(b),
            Self::Sum => a + b,
        }
    }
}

/// Reduce `tile` along `axis` with a built-in operator.
///
/// # Errors
///
/// See [`block_reduce_with`].
pub fn block_reduce(
    ctx: &mut BlockContext,
    tile: &DistributedTile<f32>,
    axis: usize,
    op: ReduceOp,
) -> Result<DistributedTile<f32>> {
    block_reduce_with(ctx, tile, axis, op.identity(), |a, b| op.combine(a, b))
}

/// Reduce `tile` along `axis` with an associative, commutative `combine`.
///
/// # Errors
///
/// Returns [`TilekitError::InvalidDistribution`] if the tile is not laid out
/// for this block, `axis` is out of range, or the lanes spanning `axis`
/// cross a lane-group boundary.
pub fn block_reduce_with<T: Copy>(
    ctx: &mut BlockContext,
    tile: &DistributedTile<T>,
    axis: usize,
    identity: T,
    combine: impl Fn(T, T) -> T,
) -> Result<DistributedTile<T>> {
    let dist = tile.distribution();
    if dist.block_size() != ctx.block_size() {
        return Err(TilekitError::InvalidDistribution(format!(
            "tile laid out for {} lanes, block has {}",
            dist.block_size(),
            ctx.block_size()
        )));
    }
    let reduced = dist.reduced(axis)?;
    let lanes = dist.lanes_along(axis);
    let stride = dist.lane_stride_along(axis);
    if !ctx.within_lane_group(lanes * stride) {
        return Err(TilekitError::InvalidDistribution(format!(
            "reduction over {lanes} lanes at stride {stride} crosses a lane-group of {}",
            ctx.lane_group_size()
        )));
    }

    let kept = reduced.slots_per_lane();
    let mut partials = vec![identity; dist.block_size() * kept];
    for idx in dist.indices() {
        if dist.in_tile(idx) {
            let target = dist.project(idx, axis);
            let flat = target.lane() * kept + target.slot();
            partials[flat] = combine(partials[flat], tile.get(idx));
        }
    }

    let mut mask = 1;
    while mask < lanes {
        let previous = partials.clone();
        for lane in 0..dist.block_size() {
            let partner = lane ^ (mask * stride);
            for k in 0..kept {
                partials[lane * kept + k] =
                    combine(previous[lane * kept + k], previous[partner * kept + k]);
            }
        }
        mask <<= 1;
    }
    ctx.lane_group_sync();

    Ok(DistributedTile::from_parts(reduced, partials))
}
