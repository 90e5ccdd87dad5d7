// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Register tiles partitioned across lanes.

use super::distribution::{Coord, DistributedIndex, TileDistribution};

/// A tile whose elements live in per-lane registers.
///
/// Storage is lane-major: lane `l` owns the contiguous run
/// `l * slots_per_lane .. (l + 1) * slots_per_lane`. Padding slots exist in
/// storage but sit outside the logical lengths.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributedTile<T = f32> {
    dist: TileDistribution,
    data: Vec<T>,
}

impl<T: Copy> DistributedTile<T> {
    /// Create a tile with every element set to `init`.
    #[must_use]
    pub fn new(dist: TileDistribution, init: T) -> Self {
        let data = vec![init; dist.block_size() * dist.slots_per_lane()];
        Self { dist, data }
    }

    /// Create a tile from lane-major storage.
    pub(crate) fn from_parts(dist: TileDistribution, data: Vec<T>) -> Self {
        debug_assert_eq!(data.len(), dist.block_size() * dist.slots_per_lane());
        Self { dist, data }
    }

    /// Create a tile by evaluating `f` at every element's coordinate.
    #[must_use]
    pub fn from_fn(dist: TileDistribution, mut f: impl FnMut(&Coord) -> T) -> Self {
        let data = dist.indices().map(|idx| f(&dist.coords(idx))).collect();
        Self { dist, data }
    }

    /// The tile's distribution.
    #[must_use]
    pub const fn distribution(&self) -> &TileDistribution {
        &self.dist
    }

    /// Read one element.
    #[must_use]
    pub fn get(&self, idx: DistributedIndex) -> T {
        self.data[self.dist.flat(idx)]
    }

    /// Write one element.
    pub fn set(&mut self, idx: DistributedIndex, value: T) {
        let flat = self.dist.flat(idx);
        self.data[flat] = value;
    }

    /// Logical coordinate of an element.
    #[must_use]
    pub fn coords(&self, idx: DistributedIndex) -> Coord {
        self.dist.coords(idx)
    }

    /// Whether an element is inside the logical lengths.
    #[must_use]
    pub fn in_tile(&self, idx: DistributedIndex) -> bool {
        self.dist.in_tile(idx)
    }

    /// All element handles, lane-major.
    pub fn indices(&self) -> impl Iterator<Item = DistributedIndex> + '_ {
        self.dist.indices()
    }

    /// Value at a logical coordinate, read from its primary owner.
    #[must_use]
    pub fn value_at(&self, coords: &[usize]) -> Option<T> {
        self.dist.locate(coords).map(|idx| self.get(idx))
    }

    /// Elementwise transform into a new tile with the same distribution.
    #[must_use]
    pub fn map<U: Copy>(&self, f: impl FnMut(T) -> U) -> DistributedTile<U> {
        DistributedTile {
            dist: self.dist.clone(),
            data: self.data.iter().copied().map(f).collect(),
        }
    }

    /// Elementwise transform in place.
    pub fn map_in_place(&mut self, mut f: impl FnMut(T) -> T) {
        for v in &mut self.data {
            *v = f(*v);
        }
    }

    /// Elementwise transform in place with access to each coordinate.
    pub fn map_in_place_with_coords(&mut self, mut f: impl FnMut(&Coord, T) -> T) {
        let slots = self.dist.slots_per_lane();
        for (i, v) in self.data.iter_mut().enumerate() {
            let coords = self.dist.coords(self.dist.index(i / slots, i % slots));
            *v = f(&coords, *v);
        }
    }

    /// Combine two tiles of identical distribution elementwise.
    ///
    /// # Panics
    ///
    /// Debug builds assert that both tiles share the same distribution.
    #[must_use]
    pub fn zip_map<U: Copy, V: Copy>(
        &self,
        other: &DistributedTile<U>,
        mut f: impl FnMut(T, U) -> V,
    ) -> DistributedTile<V> {
        debug_assert_eq!(self.dist, other.dist);
        DistributedTile {
            dist: self.dist.clone(),
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(&a, &b)| f(a, b))
                .collect(),
        }
    }

    /// Combine each element with the same lane's value of its kept
    /// coordinates in a tile reduced along `axis`.
    #[must_use]
    pub fn zip_reduced<U: Copy, V: Copy>(
        &self,
        reduced: &DistributedTile<U>,
        axis: usize,
        mut f: impl FnMut(T, U) -> V,
    ) -> DistributedTile<V> {
        let data = self
            .dist
            .indices()
            .map(|idx| f(self.get(idx), reduced.get(self.dist.project(idx, axis))))
            .collect();
        DistributedTile {
            dist: self.dist.clone(),
            data,
        }
    }

    /// Lane-major storage.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }
}
