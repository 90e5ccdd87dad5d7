// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Block-shared scratch memory.
//!
//! A block owns one [`ScratchMemory`] and carves regions out of it by
//! element range. Views borrow the scratch, so a mutable view over a region
//! must be dropped before the next stage can look at the same memory.

use std::ops::Range;

use super::window::{Descriptor, TensorView, TensorViewMut};
use crate::error::{Result, TilekitError};

/// Scratch buffer shared by the lanes of one block.
#[derive(Debug, Clone, Default)]
pub struct ScratchMemory {
    data: Vec<f32>,
}

impl ScratchMemory {
    /// Allocate `len` zeroed elements.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            data: vec![0.0; len],
        }
    }

    /// Capacity in elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the scratch has no capacity.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Grow to at least `len` elements.
    pub fn ensure_len(&mut self, len: usize) {
        if self.data.len() < len {
            self.data.resize(len, 0.0);
        }
    }

    fn region_error(&self, range: &Range<usize>) -> TilekitError {
        TilekitError::InvalidConfig(format!(
            "scratch region {}..{} exceeds capacity {}",
            range.start,
            range.end,
            self.data.len()
        ))
    }

    /// Read-only view of a region.
    ///
    /// # Errors
    ///
    /// Returns an error if the region or the descriptor exceeds the scratch.
    pub fn view(&self, range: Range<usize>, desc: Descriptor) -> Result<TensorView<'_, f32>> {
        let region = self
            .data
            .get(range.clone())
            .ok_or_else(|| self.region_error(&range))?;
        TensorView::new(desc, region)
    }

    /// Mutable view of a region.
    ///
    /// # Errors
    ///
    /// Returns an error if the region or the descriptor exceeds the scratch.
    pub fn view_mut(
        &mut self,
        range: Range<usize>,
        desc: Descriptor,
    ) -> Result<TensorViewMut<'_, f32>> {
        if range.end > self.data.len() || range.start > range.end {
            return Err(self.region_error(&range));
        }
        TensorViewMut::new(desc, &mut self.data[range])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::tile::window::{ReadView, WriteView};

    #[test]
    fn test_regions_are_disjoint() {
        let mut scratch = ScratchMemory::new(8);
        {
            let mut lo = scratch.view_mut(0..4, Descriptor::packed(&[2, 2])).unwrap();
            lo.write(&[1, 1], 3.0);
        }
        {
            let mut hi = scratch.view_mut(4..8, Descriptor::packed(&[4])).unwrap();
            hi.write(&[0], 5.0);
        }
        let all = scratch.view(0..8, Descriptor::packed(&[8])).unwrap();
        assert_eq!(all.read(&[3]), 3.0);
        assert_eq!(all.read(&[4]), 5.0);
    }

    #[test]
    fn test_out_of_range_region() {
        let mut scratch = ScratchMemory::new(4);
        assert!(scratch.view(2..6, Descriptor::packed(&[4])).is_err());
        assert!(scratch.view_mut(0..4, Descriptor::packed(&[5])).is_err());
        scratch.ensure_len(6);
        assert_eq!(scratch.len(), 6);
        assert!(scratch.view(2..6, Descriptor::packed(&[4])).is_ok());
    }
}
