// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Memory sizing for the split-KV combine.
//!
//! Two budgets matter: the per-block scratch region (LSE staging plus the
//! per-lane-group output accumulators) and the bulk workspace holding the
//! per-split partial results produced upstream.

use std::ops::Range;

use crate::kernels::element::NumericKind;

/// Bytes per accumulator element (`f32`).
const ACC_BYTES: usize = 4;

/// Layout of one block's scratch region.
///
/// ```text
/// [0, lse_len)                 LSE / weights, [max_splits, m0]
/// [lse_len, lse_len + acc_len) output partials, [lane_groups, m0, n1]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchLayout {
    /// Maximum splits staged.
    pub max_splits: usize,
    /// Rows per block.
    pub m0: usize,
    /// Head-dim columns per block.
    pub n1: usize,
    /// Lane-groups per block.
    pub num_lane_groups: usize,
}

impl ScratchLayout {
    /// Elements of the LSE region.
    #[must_use]
    pub const fn lse_len(&self) -> usize {
        self.max_splits * self.m0
    }

    /// Elements of the accumulator region.
    #[must_use]
    pub const fn acc_len(&self) -> usize {
        self.num_lane_groups * self.m0 * self.n1
    }

    /// Total elements.
    #[must_use]
    pub const fn total_len(&self) -> usize {
        self.lse_len() + self.acc_len()
    }

    /// Total bytes.
    #[must_use]
    pub const fn bytes(&self) -> usize {
        self.total_len() * ACC_BYTES
    }

    /// Element range of the LSE region.
    #[must_use]
    pub const fn lse_range(&self) -> Range<usize> {
        0..self.lse_len()
    }

    /// Element range of the accumulator region.
    #[must_use]
    pub const fn acc_range(&self) -> Range<usize> {
        self.lse_len()..self.total_len()
    }
}

/// Bulk memory consumed by one combine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CombineWorkspace {
    /// Partial LSE input.
    pub lse_acc_bytes: usize,
    /// Partial output input.
    pub o_acc_bytes: usize,
    /// Final output.
    pub output_bytes: usize,
    /// Merged LSE output (zero when not stored).
    pub lse_bytes: usize,
}

impl CombineWorkspace {
    /// Sum of all buffers.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.lse_acc_bytes + self.o_acc_bytes + self.output_bytes + self.lse_bytes
    }
}

/// Estimate bulk memory for combining `num_splits` partials.
///
/// Partials are `f32`; outputs use `out_kind`.
#[must_use]
pub fn estimate_combine_workspace(
    batch: usize,
    nhead: usize,
    num_splits: usize,
    seqlen_q: usize,
    head_dim_v: usize,
    out_kind: NumericKind,
    store_lse: bool,
) -> CombineWorkspace {
    let rows = batch * nhead * seqlen_q;
    let out = out_kind.size_in_bytes();
    CombineWorkspace {
        lse_acc_bytes: num_splits * rows * ACC_BYTES,
        o_acc_bytes: num_splits * rows * head_dim_v * ACC_BYTES,
        output_bytes: rows * head_dim_v * out,
        lse_bytes: if store_lse { rows * out } else { 0 },
    }
}

/// Format a byte count with a binary unit suffix.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_layout_regions() {
        let layout = ScratchLayout {
            max_splits: 16,
            m0: 32,
            n1: 64,
            num_lane_groups: 4,
        };
        assert_eq!(layout.lse_range(), 0..512);
        assert_eq!(layout.acc_range(), 512..512 + 8192);
        assert_eq!(layout.bytes(), (512 + 8192) * 4);
    }

    #[test]
    fn test_workspace_scales_with_splits() {
        let one = estimate_combine_workspace(2, 8, 1, 128, 128, NumericKind::F16, true);
        let eight = estimate_combine_workspace(2, 8, 8, 128, 128, NumericKind::F16, true);
        assert_eq!(eight.o_acc_bytes, 8 * one.o_acc_bytes);
        assert_eq!(one.output_bytes, eight.output_bytes);
        assert_eq!(one.output_bytes, 2 * 8 * 128 * 128 * 2);

        let no_lse = estimate_combine_workspace(2, 8, 8, 128, 128, NumericKind::F16, false);
        assert_eq!(no_lse.lse_bytes, 0);
        assert!(no_lse.total() < eight.total());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MiB");
    }
}
