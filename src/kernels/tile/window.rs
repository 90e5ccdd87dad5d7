// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Addressing for bulk and scratch memory.
//!
//! A [`Descriptor`] maps a logical coordinate to a linear offset and rejects
//! coordinates outside its lengths. Views bind a descriptor to storage, and a
//! [`TileWindow`] moves a fixed-size tile across a view. Bounds handling is
//! what makes padding safe: loads outside the view read `0.0` and stores
//! outside the view are dropped.

use super::distributed::DistributedTile;
use super::distribution::{TileDistribution, MAX_RANK};
use crate::error::{Result, TilekitError};
use crate::kernels::element::Numeric;

/// Lengths, strides and base offset of a strided tensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    lengths: Vec<usize>,
    strides: Vec<usize>,
    offset: usize,
}

impl Descriptor {
    /// Build a descriptor from explicit strides.
    ///
    /// # Errors
    ///
    /// Returns [`TilekitError::ShapeMismatch`] if `strides` and `lengths`
    /// differ in rank.
    pub fn new(lengths: &[usize], strides: &[usize], offset: usize) -> Result<Self> {
        if lengths.len() != strides.len() {
            return Err(TilekitError::ShapeMismatch {
                expected: lengths.to_vec(),
                actual: strides.to_vec(),
            });
        }
        Ok(Self {
            lengths: lengths.to_vec(),
            strides: strides.to_vec(),
            offset,
        })
    }

    /// Row-major contiguous descriptor.
    #[must_use]
    pub fn packed(lengths: &[usize]) -> Self {
        let mut strides = vec![1; lengths.len()];
        for d in (0..lengths.len().saturating_sub(1)).rev() {
            strides[d] = strides[d + 1] * lengths[d + 1];
        }
        Self {
            lengths: lengths.to_vec(),
            strides,
            offset: 0,
        }
    }

    /// Same layout starting `offset` elements into the storage.
    #[must_use]
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Logical lengths.
    #[must_use]
    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    /// Element strides.
    #[must_use]
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Number of logical elements.
    #[must_use]
    pub fn num_elements(&self) -> usize {
        self.lengths.iter().product()
    }

    /// One past the largest offset the descriptor can produce.
    #[must_use]
    pub fn span(&self) -> usize {
        if self.lengths.contains(&0) {
            return self.offset;
        }
        self.offset
            + self
                .lengths
                .iter()
                .zip(&self.strides)
                .map(|(l, s)| (l - 1) * s)
                .sum::<usize>()
            + 1
    }

    /// Linear offset of `coords`, or `None` when any coordinate is out of bounds.
    #[must_use]
    pub fn offset_of(&self, coords: &[usize]) -> Option<usize> {
        if coords.len() != self.lengths.len() {
            return None;
        }
        let mut offset = self.offset;
        for ((&c, &l), &s) in coords.iter().zip(&self.lengths).zip(&self.strides) {
            if c >= l {
                return None;
            }
            offset += c * s;
        }
        Some(offset)
    }
}

/// Read access through a descriptor.
pub trait ReadView {
    /// The view's layout.
    fn descriptor(&self) -> &Descriptor;

    /// Read one element as `f32`; `0.0` outside the view.
    fn read(&self, coords: &[usize]) -> f32;
}

/// Write access through a descriptor.
pub trait WriteView: ReadView {
    /// Write one element; dropped outside the view.
    fn write(&mut self, coords: &[usize], value: f32);
}

/// Read-only view over a slice.
#[derive(Debug, Clone)]
pub struct TensorView<'a, T: Numeric = f32> {
    desc: Descriptor,
    data: &'a [T],
}

impl<'a, T: Numeric> TensorView<'a, T> {
    /// Bind a descriptor to storage.
    ///
    /// # Errors
    ///
    /// Returns [`TilekitError::ShapeMismatch`] if the descriptor reaches past
    /// the end of `data`.
    pub fn new(desc: Descriptor, data: &'a [T]) -> Result<Self> {
        check_span(&desc, data.len())?;
        Ok(Self { desc, data })
    }
}

impl<T: Numeric> ReadView for TensorView<'_, T> {
    fn descriptor(&self) -> &Descriptor {
        &self.desc
    }

    fn read(&self, coords: &[usize]) -> f32 {
        self.desc
            .offset_of(coords)
            .and_then(|o| self.data.get(o))
            .map_or(0.0, |v| v.to_f32())
    }
}

/// Mutable view over a slice.
#[derive(Debug)]
pub struct TensorViewMut<'a, T: Numeric = f32> {
    desc: Descriptor,
    data: &'a mut [T],
}

impl<'a, T: Numeric> TensorViewMut<'a, T> {
    /// Bind a descriptor to mutable storage.
    ///
    /// # Errors
    ///
    /// Returns [`TilekitError::ShapeMismatch`] if the descriptor reaches past
    /// the end of `data`.
    pub fn new(desc: Descriptor, data: &'a mut [T]) -> Result<Self> {
        check_span(&desc, data.len())?;
        Ok(Self { desc, data })
    }
}

impl<T: Numeric> ReadView for TensorViewMut<'_, T> {
    fn descriptor(&self) -> &Descriptor {
        &self.desc
    }

    fn read(&self, coords: &[usize]) -> f32 {
        self.desc
            .offset_of(coords)
            .and_then(|o| self.data.get(o))
            .map_or(0.0, |v| v.to_f32())
    }
}

impl<T: Numeric> WriteView for TensorViewMut<'_, T> {
    fn write(&mut self, coords: &[usize], value: f32) {
        if let Some(slot) = self.desc.offset_of(coords).and_then(|o| self.data.get_mut(o)) {
            *slot = T::from_f32(value);
        }
    }
}

fn check_span(desc: &Descriptor, len: usize) -> Result<()> {
    if desc.span() > len {
        return Err(TilekitError::ShapeMismatch {
            expected: vec![desc.span()],
            actual: vec![len],
        });
    }
    Ok(())
}

/// A tile-sized window positioned over a view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileWindow {
    origin: Vec<usize>,
    lengths: Vec<usize>,
}

impl TileWindow {
    /// Window of `lengths` with its first element at `origin`.
    ///
    /// # Panics
    ///
    /// Debug builds assert that `origin` and `lengths` share a rank.
    #[must_use]
    pub fn new(origin: &[usize], lengths: &[usize]) -> Self {
        debug_assert_eq!(origin.len(), lengths.len());
        Self {
            origin: origin.to_vec(),
            lengths: lengths.to_vec(),
        }
    }

    /// Current origin.
    #[must_use]
    pub fn origin(&self) -> &[usize] {
        &self.origin
    }

    /// Tile lengths.
    #[must_use]
    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    /// Advance the origin by `step`.
    pub fn move_by(&mut self, step: &[usize]) {
        for (o, s) in self.origin.iter_mut().zip(step) {
            *o += s;
        }
    }

    fn absolute(&self, tile_coords: &[usize], out: &mut [usize; MAX_RANK]) -> usize {
        let rank = self.origin.len();
        for d in 0..rank {
            out[d] = self.origin[d] + tile_coords[d];
        }
        rank
    }

    /// Load the window into a register tile.
    ///
    /// Padding slots and elements outside the view are `0.0`.
    #[must_use]
    pub fn load(&self, view: &impl ReadView, dist: &TileDistribution) -> DistributedTile<f32> {
        debug_assert_eq!(dist.lengths(), self.lengths.as_slice());
        let mut abs = [0; MAX_RANK];
        let data = dist
            .indices()
            .map(|idx| {
                if dist.in_tile(idx) {
                    let rank = self.absolute(&dist.coords(idx), &mut abs);
                    view.read(&abs[..rank])
                } else {
                    0.0
                }
            })
            .collect();
        DistributedTile::from_parts(dist.clone(), data)
    }

    /// Store a register tile through the window.
    ///
    /// Only primary replicas write; elements outside the view are dropped.
    pub fn store(&self, view: &mut impl WriteView, tile: &DistributedTile<f32>) {
        let dist = tile.distribution();
        debug_assert_eq!(dist.lengths(), self.lengths.as_slice());
        let mut abs = [0; MAX_RANK];
        for idx in dist.indices() {
            if dist.in_tile(idx) && dist.is_primary(idx.lane()) {
                let rank = self.absolute(&dist.coords(idx), &mut abs);
                view.write(&abs[..rank], tile.get(idx));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use half::f16;

    #[test]
    fn test_packed_offsets() {
        let desc = Descriptor::packed(&[2, 3, 4]);
        assert_eq!(desc.strides(), &[12, 4, 1]);
        assert_eq!(desc.offset_of(&[1, 2, 3]), Some(23));
        assert_eq!(desc.offset_of(&[2, 0, 0]), None);
        assert_eq!(desc.offset_of(&[0, 0]), None);
        assert_eq!(desc.span(), 24);
        assert_eq!(desc.with_offset(5).offset_of(&[0, 0, 1]), Some(6));
    }

    #[test]
    fn test_view_bounds() {
        let data = [1.0f32, 2.0, 3.0, 4.0];
        let view = TensorView::new(Descriptor::packed(&[2, 2]), &data).unwrap();
        assert_eq!(view.read(&[1, 0]), 3.0);
        assert_eq!(view.read(&[2, 0]), 0.0);
        assert!(TensorView::new(Descriptor::packed(&[3, 2]), &data).is_err());

        let mut out = [f16::ZERO; 2];
        let mut view = TensorViewMut::new(Descriptor::packed(&[2]), &mut out).unwrap();
        view.write(&[1], 1.5);
        view.write(&[2], 9.0);
        assert_eq!(out[1].to_f32(), 1.5);
    }

    #[test]
    fn test_window_load_pads_with_zero() {
        let data: Vec<f32> = (0..6).map(|v| v as f32).collect();
        let view = TensorView::new(Descriptor::packed(&[2, 3]), &data).unwrap();
        let dist = TileDistribution::spread(&[4, 4], 4).unwrap();
        let window = TileWindow::new(&[0, 1], &[4, 4]);
        let tile = window.load(&view, &dist);
        assert_eq!(tile.value_at(&[0, 0]), Some(1.0));
        assert_eq!(tile.value_at(&[1, 1]), Some(5.0));
        assert_eq!(tile.value_at(&[0, 2]), Some(0.0));
        assert_eq!(tile.value_at(&[3, 3]), Some(0.0));
    }

    #[test]
    fn test_window_store_drops_out_of_bounds() {
        let dist = TileDistribution::spread(&[2, 2], 4).unwrap();
        let tile = DistributedTile::new(dist, 7.0f32);
        let mut out = vec![0.0f32; 3];
        {
            let mut view = TensorViewMut::new(Descriptor::packed(&[3]), &mut out).unwrap();
            let mut window = TileWindow::new(&[1], &[2]);
            let row = DistributedTile::new(TileDistribution::spread(&[2], 4).unwrap(), 7.0f32);
            window.store(&mut view, &row);
            window.move_by(&[1]);
            assert_eq!(window.origin(), &[2]);
            window.store(&mut view, &row.map(|v| v + 1.0));
        }
        assert_eq!(out, vec![0.0, 7.0, 8.0]);
        assert_eq!(tile.distribution().lengths(), &[2, 2]);
    }

    #[test]
    fn test_strided_transpose_view() {
        let data: Vec<f32> = (0..6).map(|v| v as f32).collect();
        // logical [3, 2] over a row-major [2, 3] buffer
        let desc = Descriptor::new(&[3, 2], &[1, 3], 0).unwrap();
        let view = TensorView::new(desc, &data).unwrap();
        assert_eq!(view.read(&[2, 1]), 5.0);
        assert_eq!(view.read(&[1, 0]), 1.0);
    }
}
