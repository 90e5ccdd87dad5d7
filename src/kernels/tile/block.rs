// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Block execution context.
//!
//! The host emulates one block at a time in lock step: every per-lane sweep
//! over a [`DistributedTile`](super::DistributedTile) finishes before the next
//! statement runs, so a barrier is a bookkeeping event rather than a wait.
//! Barriers are only reachable through `&mut BlockContext`, which tile sweeps
//! never hold, so no lane can skip one.

use crate::error::{Result, TilekitError};

/// Synchronization counters for one block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockStats {
    /// Block-wide barriers issued.
    pub barriers: usize,
    /// Lane-group shuffle rounds (one per reduction).
    pub lane_group_syncs: usize,
}

/// Identity and synchronization state of an executing block.
#[derive(Debug, Clone)]
pub struct BlockContext {
    lane_group_size: usize,
    num_lane_groups: usize,
    stats: BlockStats,
}

impl BlockContext {
    /// Create a context for `num_lane_groups` groups of `lane_group_size` lanes.
    ///
    /// # Errors
    ///
    /// Returns [`TilekitError::InvalidConfig`] if either count is not a power
    /// of two.
    pub fn new(lane_group_size: usize, num_lane_groups: usize) -> Result<Self> {
        if !lane_group_size.is_power_of_two() || !num_lane_groups.is_power_of_two() {
            return Err(TilekitError::InvalidConfig(format!(
                "lane group size ({lane_group_size}) and lane group count ({num_lane_groups}) \
                 must be powers of two"
            )));
        }
        Ok(Self {
            lane_group_size,
            num_lane_groups,
            stats: BlockStats::default(),
        })
    }

    /// Lanes per lane-group.
    #[must_use]
    pub const fn lane_group_size(&self) -> usize {
        self.lane_group_size
    }

    /// Lane-groups per block.
    #[must_use]
    pub const fn num_lane_groups(&self) -> usize {
        self.num_lane_groups
    }

    /// Lanes per block.
    #[must_use]
    pub const fn block_size(&self) -> usize {
        self.lane_group_size * self.num_lane_groups
    }

    /// Lane-group a lane belongs to.
    #[must_use]
    pub const fn lane_group_of(&self, lane: usize) -> usize {
        lane / self.lane_group_size
    }

    /// Whether every lane reachable from `lane` by XOR with masks below
    /// `span` stays in `lane`'s group.
    #[must_use]
    pub const fn within_lane_group(&self, span: usize) -> bool {
        span <= self.lane_group_size
    }

    /// Block-wide barrier.
    pub fn barrier(&mut self) {
        self.stats.barriers += 1;
    }

    /// Lane-group synchronization point.
    pub fn lane_group_sync(&mut self) {
        self.stats.lane_group_syncs += 1;
    }

    /// Counters since creation or the last reset.
    #[must_use]
    pub const fn stats(&self) -> BlockStats {
        self.stats
    }

    /// Zero the counters.
    pub fn reset_stats(&mut self) {
        self.stats = BlockStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_geometry() {
        let ctx = BlockContext::new(64, 4).unwrap();
        assert_eq!(ctx.block_size(), 256);
        assert_eq!(ctx.lane_group_of(63), 0);
        assert_eq!(ctx.lane_group_of(64), 1);
        assert!(ctx.within_lane_group(64));
        assert!(!ctx.within_lane_group(128));
    }

    #[test]
    fn test_counters() {
        let mut ctx = BlockContext::new(32, 1).unwrap();
        ctx.barrier();
        ctx.barrier();
        ctx.lane_group_sync();
        assert_eq!(
            ctx.stats(),
            BlockStats {
                barriers: 2,
                lane_group_syncs: 1
            }
        );
        ctx.reset_stats();
        assert_eq!(ctx.stats(), BlockStats::default());
    }

    #[test]
    fn test_rejects_non_power_of_two() {
        assert!(BlockContext::new(48, 4).is_err());
        assert!(BlockContext::new(64, 3).is_err());
    }
}
