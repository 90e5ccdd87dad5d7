// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Tile distributions used by the combine pipeline.

use super::config::CombineConfig;
use crate::error::Result;
use crate::kernels::tile::TileDistribution;
use crate::memory::ScratchLayout;

/// Lane layouts for every tile the combine pipeline touches.
///
/// | tile            | lengths                  | layout                              |
/// |-----------------|--------------------------|-------------------------------------|
/// | LSE staging     | `[max_splits, m0]`       | spread over the block               |
/// | LSE registers   | `[m0, max_splits]`       | splits inside one lane-group        |
/// | merged LSE      | `[m0]`                   | LSE registers reduced over splits   |
/// | partial outputs | `[lane_groups, m0, n1]`  | lane-group `g` owns slice `g`       |
/// | output          | `[m0, n1]`               | spread over the block               |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinePolicy {
    /// Rows per block.
    pub m0: usize,
    /// Columns per block.
    pub n1: usize,
    /// Splits staged through scratch.
    pub max_splits: usize,
    /// Lane-groups per block.
    pub num_lane_groups: usize,
    /// Scratch layout.
    pub layout: ScratchLayout,
    /// LSE tile as loaded from bulk memory.
    pub lse_staging: TileDistribution,
    /// LSE tile as reduced in registers.
    pub lse_registers: TileDistribution,
    /// Merged LSE, one value per row.
    pub lse_merged: TileDistribution,
    /// Per-lane-group partial output accumulators.
    pub o_acc: TileDistribution,
    /// Combined output.
    pub output: TileDistribution,
}

impl CombinePolicy {
    /// Derive the layouts from a validated configuration.
    ///
    /// # Errors
    ///
    /// Propagates configuration and distribution errors.
    pub fn new(config: &CombineConfig) -> Result<Self> {
        config.validate()?;
        let block = config.block_size();
        let (m0, n1, max_splits) = (config.m0, config.n1, config.max_splits);

        let split_lanes = max_splits.min(config.lane_group_size);
        let lse_registers = TileDistribution::new(&[m0, max_splits], &[block / split_lanes, split_lanes])?;
        let lse_merged = lse_registers.reduced(1)?;

        let group_tile = TileDistribution::spread(&[m0, n1], config.lane_group_size)?;
        let o_acc = TileDistribution::new(
            &[config.num_lane_groups, m0, n1],
            &[config.num_lane_groups, group_tile.lanes_along(0), group_tile.lanes_along(1)],
        )?;

        Ok(Self {
            m0,
            n1,
            max_splits,
            num_lane_groups: config.num_lane_groups,
            layout: config.scratch_layout(),
            lse_staging: TileDistribution::spread(&[max_splits, m0], block)?,
            lse_registers,
            lse_merged,
            o_acc,
            output: TileDistribution::spread(&[m0, n1], block)?,
        })
    }
}
