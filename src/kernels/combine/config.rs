// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Configuration for the split-KV combine kernel.
//!
//! Tile sizes and lane layout are tuned per hardware family:
//! - wave64 (CDNA): 4 lane-groups of 64 lanes
//! - wave32 (RDNA, NVIDIA): 8 lane-groups of 32 lanes
//! - long context: up to 128 splits with a shorter row tile

use crate::error::{Result, TilekitError};
use crate::kernels::element::{ElementOp, NumericKind};
use crate::memory::ScratchLayout;

/// Largest supported split count.
pub const MAX_SPLITS_LIMIT: usize = 128;

/// Largest head dimension covered by the occupancy table.
pub const MAX_HEAD_DIM_V: usize = 256;

/// Largest block the kernel can be launched with.
pub const MAX_BLOCK_SIZE: usize = 1024;

/// Configuration for one combine launch.
///
/// # Example
///
/// ```rust
/// use tilekit::kernels::combine::CombineConfig;
/// use tilekit::kernels::element::NumericKind;
///
/// let config = CombineConfig::for_wave32()
///     .with_max_splits(32)
///     .with_out_kind(NumericKind::F16);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.block_size(), 256);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombineConfig {
    /// Query rows per block.
    pub m0: usize,

    /// Head-dim columns per block.
    pub n1: usize,

    /// Maximum number of splits a launch may combine.
    /// Must be a power of two no larger than [`MAX_SPLITS_LIMIT`].
    pub max_splits: usize,

    /// Lanes per lane-group (power of two).
    pub lane_group_size: usize,

    /// Lane-groups per block (power of two).
    pub num_lane_groups: usize,

    /// Allow sequence lengths that are not a multiple of `m0`.
    pub pad_seqlen_q: bool,

    /// Allow head dimensions that are not a multiple of `n1`.
    pub pad_head_dim_v: bool,

    /// Emit the merged LSE.
    pub store_lse: bool,

    /// Fixed blocks-per-CU, bypassing the occupancy table.
    pub blocks_per_cu: Option<usize>,

    /// Applied to the merged LSE before it is stored.
    pub lse_op: ElementOp,

    /// Applied to the combined output before it is stored.
    pub o_op: ElementOp,

    /// Output precision; `None` keeps the partial-output dtype.
    pub out_kind: Option<NumericKind>,
}

impl Default for CombineConfig {
    fn default() -> Self {
        Self {
            m0: 32,
            n1: 64,
            max_splits: 16,
            lane_group_size: 64,
            num_lane_groups: 4,
            pad_seqlen_q: true,
            pad_head_dim_v: true,
            store_lse: true,
            blocks_per_cu: None,
            lse_op: ElementOp::PassThrough,
            o_op: ElementOp::PassThrough,
            out_kind: None,
        }
    }
}

impl CombineConfig {
    /// Wave64 hardware: 4 lane-groups of 64 lanes.
    #[must_use]
    pub fn for_wave64() -> Self {
        Self::default()
    }

    /// Wave32 hardware: 8 lane-groups of 32 lanes.
    #[must_use]
    pub fn for_wave32() -> Self {
        Self {
            lane_group_size: 32,
            num_lane_groups: 8,
            ..Self::default()
        }
    }

    /// Many splits over long key/value sequences.
    #[must_use]
    pub fn for_long_context() -> Self {
        Self {
            m0: 16,
            max_splits: MAX_SPLITS_LIMIT,
            ..Self::default()
        }
    }

    /// Set the maximum split count.
    #[must_use]
    pub const fn with_max_splits(mut self, max_splits: usize) -> Self {
        self.max_splits = max_splits;
        self
    }

    /// Set the block tile (`m0` rows by `n1` columns).
    #[must_use]
    pub const fn with_tile(mut self, m0: usize, n1: usize) -> Self {
        self.m0 = m0;
        self.n1 = n1;
        self
    }

    /// Set the lane layout.
    #[must_use]
    pub const fn with_lane_groups(mut self, lane_group_size: usize, num_lane_groups: usize) -> Self {
        self.lane_group_size = lane_group_size;
        self.num_lane_groups = num_lane_groups;
        self
    }

    /// Set padding allowances.
    #[must_use]
    pub const fn with_padding(mut self, seqlen_q: bool, head_dim_v: bool) -> Self {
        self.pad_seqlen_q = seqlen_q;
        self.pad_head_dim_v = head_dim_v;
        self
    }

    /// Enable or disable the merged-LSE output.
    #[must_use]
    pub const fn with_store_lse(mut self, store_lse: bool) -> Self {
        self.store_lse = store_lse;
        self
    }

    /// Pin blocks-per-CU instead of using the occupancy table.
    #[must_use]
    pub const fn with_blocks_per_cu(mut self, blocks_per_cu: usize) -> Self {
        self.blocks_per_cu = Some(blocks_per_cu);
        self
    }

    /// Set the LSE postprocessing op.
    #[must_use]
    pub const fn with_lse_op(mut self, op: ElementOp) -> Self {
        self.lse_op = op;
        self
    }

    /// Set the output postprocessing op.
    #[must_use]
    pub const fn with_o_op(mut self, op: ElementOp) -> Self {
        self.o_op = op;
        self
    }

    /// Set the output precision.
    #[must_use]
    pub const fn with_out_kind(mut self, kind: NumericKind) -> Self {
        self.out_kind = Some(kind);
        self
    }

    /// Lanes per block.
    #[must_use]
    pub const fn block_size(&self) -> usize {
        self.lane_group_size * self.num_lane_groups
    }

    /// Scratch layout of one block.
    #[must_use]
    pub const fn scratch_layout(&self) -> ScratchLayout {
        ScratchLayout {
            max_splits: self.max_splits,
            m0: self.m0,
            n1: self.n1,
            num_lane_groups: self.num_lane_groups,
        }
    }

    /// Blocks resident per compute unit for a head dimension.
    ///
    /// Looked up by split-count bucket (`log2(max_splits) - 2`, clamped to
    /// the table) within one of three head-dim classes.
    ///
    /// # Errors
    ///
    /// Returns [`TilekitError::InvalidConfig`] when no override is set and
    /// `head_dim_v` exceeds [`MAX_HEAD_DIM_V`].
    pub fn resolve_blocks_per_cu(&self, head_dim_v: usize) -> Result<usize> {
        const SMALL: [usize; 6] = [3, 3, 3, 3, 3, 1];
        const MEDIUM: [usize; 6] = [3, 3, 3, 3, 2, 1];
        const LARGE: [usize; 6] = [2, 2, 2, 2, 2, 1];

        if let Some(fixed) = self.blocks_per_cu {
            return Ok(fixed);
        }
        let table = match head_dim_v {
            0..=32 => &SMALL,
            33..=128 => &MEDIUM,
            129..=MAX_HEAD_DIM_V => &LARGE,
            _ => {
                return Err(TilekitError::InvalidConfig(format!(
                    "head_dim_v {head_dim_v} exceeds {MAX_HEAD_DIM_V}; \
                     set blocks_per_cu explicitly"
                )))
            }
        };
        let log2 = self.max_splits.max(1).ilog2() as usize;
        Ok(table[log2.saturating_sub(2).min(table.len() - 1)])
    }

    /// Check the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TilekitError::InvalidConfig`] describing the first problem.
    pub fn validate(&self) -> Result<()> {
        if self.m0 == 0 || self.n1 == 0 {
            return Err(TilekitError::InvalidConfig(format!(
                "tile {}x{} has a zero dimension",
                self.m0, self.n1
            )));
        }
        if !self.max_splits.is_power_of_two() || self.max_splits > MAX_SPLITS_LIMIT {
            return Err(TilekitError::InvalidConfig(format!(
                "max_splits must be a power of two <= {MAX_SPLITS_LIMIT}, got {}",
                self.max_splits
            )));
        }
        if !self.lane_group_size.is_power_of_two() || !self.num_lane_groups.is_power_of_two() {
            return Err(TilekitError::InvalidConfig(format!(
                "lane layout {}x{} must use powers of two",
                self.num_lane_groups, self.lane_group_size
            )));
        }
        if self.block_size() > MAX_BLOCK_SIZE {
            return Err(TilekitError::InvalidConfig(format!(
                "block of {} lanes exceeds {MAX_BLOCK_SIZE}",
                self.block_size()
            )));
        }
        if self.blocks_per_cu == Some(0) {
            return Err(TilekitError::InvalidConfig(
                "blocks_per_cu override must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
