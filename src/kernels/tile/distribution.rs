// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Static partition of tile elements over the lanes of a block.
//!
//! A [`TileDistribution`] is a pure function from `(lane, slot)` to a
//! logical tile coordinate. Lanes form a row-major grid with a power-of-two
//! extent along each tile dimension, and each lane owns a contiguous block
//! of `per_lane` elements along every dimension:
//!
//! ```text
//! x_d = lane_coord_d * per_lane_d + slot_d
//! ```
//!
//! When `lanes_d * per_lane_d` exceeds the tile length, the trailing slots
//! are padding. Reducing a dimension keeps the lane grid intact; the lanes
//! that used to span the reduced dimension become replicas that own the same
//! kept coordinates.

use crate::error::{Result, TilekitError};

/// Maximum tile rank.
pub const MAX_RANK: usize = 4;

/// Logical tile coordinate. Entries at and beyond the tile rank are zero.
pub type Coord = [usize; MAX_RANK];

/// Opaque handle to one element of a distributed tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DistributedIndex {
    lane: usize,
    slot: usize,
}

impl DistributedIndex {
    /// Lane owning the element.
    #[must_use]
    pub const fn lane(self) -> usize {
        self.lane
    }

    /// Slot of the element inside its lane.
    #[must_use]
    pub const fn slot(self) -> usize {
        self.slot
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GridDim {
    lanes: usize,
    stride: usize,
    /// Tile dimension this grid axis spans, `None` for replica axes.
    tile_dim: Option<usize>,
}

/// Mapping of a tile's elements onto the lanes of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileDistribution {
    rank: usize,
    lengths: Coord,
    per_lane: Coord,
    grid: Vec<GridDim>,
    tile_grid: Coord,
    block_size: usize,
    slots_per_lane: usize,
}

impl TileDistribution {
    /// Build a distribution with an explicit lane count per dimension.
    ///
    /// # Errors
    ///
    /// Returns [`TilekitError::InvalidDistribution`] when the rank is outside
    /// `1..=MAX_RANK`, a length is zero, or a lane count is not a power of two.
    pub fn new(lengths: &[usize], lanes: &[usize]) -> Result<Self> {
        let rank = lengths.len();
        if rank == 0 || rank > MAX_RANK {
            return Err(TilekitError::InvalidDistribution(format!(
                "tile rank must be in 1..={MAX_RANK}, got {rank}"
            )));
        }
        if lanes.len() != rank {
            return Err(TilekitError::InvalidDistribution(format!(
                "expected {rank} lane counts, got {}",
                lanes.len()
            )));
        }
        if let Some(d) = lengths.iter().position(|&l| l == 0) {
            return Err(TilekitError::InvalidDistribution(format!(
                "tile length along dim {d} is zero"
            )));
        }
        if let Some(d) = lanes.iter().position(|l| !l.is_power_of_two()) {
            return Err(TilekitError::InvalidDistribution(format!(
                "lane count {} along dim {d} is not a power of two",
                lanes[d]
            )));
        }

        let mut grid = Vec::with_capacity(rank);
        let mut stride = 1;
        for d in (0..rank).rev() {
            grid.push(GridDim {
                lanes: lanes[d],
                stride,
                tile_dim: Some(d),
            });
            stride *= lanes[d];
        }
        grid.reverse();

        let mut len = [0; MAX_RANK];
        let mut per_lane = [0; MAX_RANK];
        let mut tile_grid = [0; MAX_RANK];
        for d in 0..rank {
            len[d] = lengths[d];
            per_lane[d] = lengths[d].div_ceil(lanes[d]);
            tile_grid[d] = d;
        }

        Ok(Self {
            rank,
            lengths: len,
            per_lane,
            grid,
            tile_grid,
            block_size: stride,
            slots_per_lane: per_lane[..rank].iter().product(),
        })
    }

    /// Spread `block_lanes` lanes over a tile, fastest-varying dimension first.
    ///
    /// Lanes left over once every dimension is covered land on dimension 0
    /// and own only padding.
    ///
    /// # Errors
    ///
    /// Returns [`TilekitError::InvalidDistribution`] if `block_lanes` is not a
    /// power of two or the lengths are invalid for [`TileDistribution::new`].
    pub fn spread(lengths: &[usize], block_lanes: usize) -> Result<Self> {
        if !block_lanes.is_power_of_two() {
            return Err(TilekitError::InvalidDistribution(format!(
                "block of {block_lanes} lanes is not a power of two"
            )));
        }
        let mut lanes = vec![1; lengths.len()];
        let mut remaining = block_lanes;
        for d in (0..lengths.len()).rev() {
            let take = lengths[d].max(1).next_power_of_two().min(remaining);
            lanes[d] = take;
            remaining /= take;
        }
        if let Some(first) = lanes.first_mut() {
            *first *= remaining;
        }
        Self::new(lengths, &lanes)
    }

    /// Distribution of the tile obtained by reducing `axis`.
    ///
    /// # Errors
    ///
    /// Returns [`TilekitError::InvalidDistribution`] if `axis` is out of range.
    pub fn reduced(&self, axis: usize) -> Result<Self> {
        if axis >= self.rank {
            return Err(TilekitError::InvalidDistribution(format!(
                "cannot reduce axis {axis} of a rank-{} tile",
                self.rank
            )));
        }
        let mut grid = self.grid.clone();
        for g in &mut grid {
            g.tile_dim = match g.tile_dim {
                Some(d) if d == axis => None,
                Some(d) if d > axis => Some(d - 1),
                other => other,
            };
        }

        let rank = self.rank - 1;
        let mut lengths = [0; MAX_RANK];
        let mut per_lane = [0; MAX_RANK];
        let mut tile_grid = [0; MAX_RANK];
        for (dst, src) in (0..self.rank).filter(|&d| d != axis).enumerate() {
            lengths[dst] = self.lengths[src];
            per_lane[dst] = self.per_lane[src];
            tile_grid[dst] = self.tile_grid[src];
        }

        Ok(Self {
            rank,
            lengths,
            per_lane,
            grid,
            tile_grid,
            block_size: self.block_size,
            slots_per_lane: per_lane[..rank].iter().product(),
        })
    }

    /// Tile rank. A fully reduced tile has rank 0 and one slot per lane.
    #[must_use]
    pub const fn rank(&self) -> usize {
        self.rank
    }

    /// Logical tile lengths.
    #[must_use]
    pub fn lengths(&self) -> &[usize] {
        &self.lengths[..self.rank]
    }

    /// Elements owned by each lane along each dimension.
    #[must_use]
    pub fn per_lane(&self) -> &[usize] {
        &self.per_lane[..self.rank]
    }

    /// Number of lanes the distribution is laid out for.
    #[must_use]
    pub const fn block_size(&self) -> usize {
        self.block_size
    }

    /// Slots owned by each lane, padding included.
    #[must_use]
    pub const fn slots_per_lane(&self) -> usize {
        self.slots_per_lane
    }

    /// Lanes spanning tile dimension `dim`.
    #[must_use]
    pub fn lanes_along(&self, dim: usize) -> usize {
        self.grid[self.tile_grid[dim]].lanes
    }

    /// Lane-id distance between neighbours along tile dimension `dim`.
    #[must_use]
    pub fn lane_stride_along(&self, dim: usize) -> usize {
        self.grid[self.tile_grid[dim]].stride
    }

    /// Number of lanes holding each kept coordinate.
    #[must_use]
    pub fn replicas(&self) -> usize {
        self.grid
            .iter()
            .filter(|g| g.tile_dim.is_none())
            .map(|g| g.lanes)
            .product()
    }

    /// Whether `lane` is the first replica of the coordinates it owns.
    #[must_use]
    pub fn is_primary(&self, lane: usize) -> bool {
        self.grid
            .iter()
            .filter(|g| g.tile_dim.is_none())
            .all(|g| (lane / g.stride) % g.lanes == 0)
    }

    /// Position of `lane` in the lane grid along tile dimension `dim`.
    #[must_use]
    pub fn lane_coord(&self, lane: usize, dim: usize) -> usize {
        let g = self.grid[self.tile_grid[dim]];
        (lane / g.stride) % g.lanes
    }

    /// Iterate all `(lane, slot)` pairs, lane-major.
    pub fn indices(&self) -> impl Iterator<Item = DistributedIndex> {
        let slots = self.slots_per_lane;
        (0..self.block_size * slots).map(move |i| DistributedIndex {
            lane: i / slots,
            slot: i % slots,
        })
    }

    /// Handle for `slot` of `lane`.
    #[must_use]
    pub fn index(&self, lane: usize, slot: usize) -> DistributedIndex {
        debug_assert!(lane < self.block_size && slot < self.slots_per_lane);
        DistributedIndex { lane, slot }
    }

    /// Flat storage position of an index.
    #[must_use]
    pub(crate) const fn flat(&self, idx: DistributedIndex) -> usize {
        idx.lane * self.slots_per_lane + idx.slot
    }

    /// Logical coordinate of an element.
    #[must_use]
    pub fn coords(&self, idx: DistributedIndex) -> Coord {
        let mut coords = [0; MAX_RANK];
        let mut slot = idx.slot;
        for d in (0..self.rank).rev() {
            let per = self.per_lane[d];
            coords[d] = self.lane_coord(idx.lane, d) * per + slot % per;
            slot /= per;
        }
        coords
    }

    /// Whether an element lies inside the logical lengths.
    #[must_use]
    pub fn in_tile(&self, idx: DistributedIndex) -> bool {
        let coords = self.coords(idx);
        (0..self.rank).all(|d| coords[d] < self.lengths[d])
    }

    /// Same-lane index of the element's kept coordinates in `self.reduced(axis)`.
    #[must_use]
    pub fn project(&self, idx: DistributedIndex, axis: usize) -> DistributedIndex {
        let mut slot = idx.slot;
        let mut parts = [0; MAX_RANK];
        for d in (0..self.rank).rev() {
            parts[d] = slot % self.per_lane[d];
            slot /= self.per_lane[d];
        }
        let mut projected = 0;
        for d in (0..self.rank).filter(|&d| d != axis) {
            projected = projected * self.per_lane[d] + parts[d];
        }
        DistributedIndex {
            lane: idx.lane,
            slot: projected,
        }
    }

    /// Primary owner of a logical coordinate, `None` outside the tile.
    #[must_use]
    pub fn locate(&self, coords: &[usize]) -> Option<DistributedIndex> {
        if coords.len() != self.rank || (0..self.rank).any(|d| coords[d] >= self.lengths[d]) {
            return None;
        }
        let mut lane = 0;
        let mut slot = 0;
        for d in 0..self.rank {
            let per = self.per_lane[d];
            lane += (coords[d] / per) * self.lane_stride_along(d);
            slot = slot * per + coords[d] % per;
        }
        Some(DistributedIndex { lane, slot })
    }
}
