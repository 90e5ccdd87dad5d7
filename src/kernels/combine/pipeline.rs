// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Block pipeline merging per-split partial attention results.
//!
//! ## Algorithm
//!
//! ```text
//! 1. lse_acc[max_splits, m0] --(bulk)--> scratch            barrier
//! 2. registers[m0, max_splits] = scratch^T, -inf past num_splits
//! 3. m   = rowmax(registers)
//!    l   = rowsum(m == -inf ? 0 : exp(registers - m))
//!    lse = l == 0 ? -inf : ln(l) + m
//! 4. scratch[s, r] = lse[r] == -inf ? 0 : exp(registers[r, s] - lse[r])
//!    (optional) store lse_op(lse)                            barrier
//! 5. lane-group g accumulates weight[split_start + g] * o_acc[split_start + g]
//!    over ceil(num_splits / lane_groups) steps
//!    per-group sums --> scratch                              barrier
//!    fold lane-groups, apply o_op
//! ```
//!
//! Rows whose splits are all `-inf` end with `lse = -inf` and a zero output
//! row. Split columns past `num_splits` are seeded with `-inf` in step 2 and
//! weight `0` in step 5, so the result does not depend on `max_splits`.

use tracing::trace;

use super::config::CombineConfig;
use super::policy::CombinePolicy;
use crate::error::Result;
use crate::kernels::element::ElementOp;
use crate::kernels::tile::{
    block_reduce, BlockContext, Descriptor, DistributedTile, ReadView, ReduceOp, ScratchMemory,
    TileWindow, WriteView,
};

/// Inputs of one block: the partial LSE and partial output windows.
#[derive(Debug)]
pub struct CombineBlock<'a, L, O> {
    /// Partial LSE view, `[num_splits, rows]`.
    pub lse_acc: &'a L,
    /// `[max_splits, m0]` window over `lse_acc` at this block's first row.
    pub lse_acc_window: TileWindow,
    /// Partial output view, `[num_splits, rows, head_dim_v]`.
    pub o_acc: &'a O,
    /// `[lane_groups, m0, n1]` window over `o_acc` at this block's origin.
    pub o_acc_window: TileWindow,
    /// Splits to combine, `1..=max_splits`.
    pub num_splits: usize,
}

/// Destination of the merged LSE.
#[derive(Debug)]
pub struct LseSink<'a, S> {
    /// Merged LSE view, `[rows]`.
    pub view: &'a mut S,
    /// `[m0]` window at this block's first row.
    pub window: TileWindow,
}

/// The five-stage combine for one block.
#[derive(Debug, Clone)]
pub struct CombinePipeline {
    policy: CombinePolicy,
    lse_op: ElementOp,
    o_op: ElementOp,
}

impl CombinePipeline {
    /// Build the pipeline for a configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: &CombineConfig) -> Result<Self> {
        Ok(Self {
            policy: CombinePolicy::new(config)?,
            lse_op: config.lse_op,
            o_op: config.o_op,
        })
    }

    /// Tile layouts in use.
    #[must_use]
    pub const fn policy(&self) -> &CombinePolicy {
        &self.policy
    }

    /// Run the pipeline for one block and return the `[m0, n1]` output tile.
    ///
    /// The caller guarantees `1 <= num_splits <= max_splits` and a scratch of
    /// at least [`ScratchLayout::total_len`](crate::memory::ScratchLayout::total_len)
    /// elements. Scratch contents are undefined afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if scratch is too small or a tile layout does not
    /// match the block.
    pub fn run<L, O, S>(
        &self,
        ctx: &mut BlockContext,
        scratch: &mut ScratchMemory,
        block: &CombineBlock<'_, L, O>,
        lse_sink: Option<LseSink<'_, S>>,
    ) -> Result<DistributedTile<f32>>
    where
        L: ReadView,
        O: ReadView,
        S: WriteView,
    {
        let p = &self.policy;
        let layout = p.layout;
        let num_splits = block.num_splits;
        debug_assert!(num_splits >= 1 && num_splits <= p.max_splits);
        debug_assert!(scratch.len() >= layout.total_len());
        let lse_desc = Descriptor::packed(&[p.max_splits, p.m0]);

        // Stage 1
        let staged = block.lse_acc_window.load(block.lse_acc, &p.lse_staging);
        {
            let mut lds = scratch.view_mut(layout.lse_range(), lse_desc.clone())?;
            TileWindow::new(&[0, 0], &[p.max_splits, p.m0]).store(&mut lds, &staged);
        }
        ctx.barrier();
        trace!(num_splits, "combine: LSE staged");

        // Stage 2
        let lse_acc = {
            let lds = scratch.view(layout.lse_range(), lse_desc.clone())?;
            DistributedTile::from_fn(p.lse_registers.clone(), |c| {
                let (row, split) = (c[0], c[1]);
                if split < num_splits {
                    lds.read(&[split, row])
                } else {
                    f32::NEG_INFINITY
                }
            })
        };

        // Stage 3
        let row_max = block_reduce(ctx, &lse_acc, 1, ReduceOp::Max)?;
        let shifted = lse_acc.zip_reduced(&row_max, 1, |v, m| {
            if m == f32::NEG_INFINITY {
                0.0
            } else {
                (v - m).exp()
            }
        });
        let row_sum = block_reduce(ctx, &shifted, 1, ReduceOp::Sum)?;
        let lse_logsum = row_sum.zip_map(&row_max, |sum, max| {
            if sum == 0.0 {
                f32::NEG_INFINITY
            } else {
                sum.ln() + max
            }
        });

        // Stage 4
        {
            let mut lds = scratch.view_mut(layout.lse_range(), lse_desc.clone())?;
            let dist = lse_acc.distribution();
            for idx in dist.indices() {
                let c = dist.coords(idx);
                let (row, split) = (c[0], c[1]);
                if !dist.in_tile(idx) || split >= num_splits {
                    continue;
                }
                let lse = lse_logsum.get(dist.project(idx, 1));
                let weight = if lse == f32::NEG_INFINITY {
                    0.0
                } else {
                    (lse_acc.get(idx) - lse).exp()
                };
                lds.write(&[split, row], weight);
            }
        }
        if let Some(sink) = lse_sink {
            let lse_op = self.lse_op;
            sink.window.store(sink.view, &lse_logsum.map(|v| lse_op.apply(v)));
        }
        ctx.barrier();
        trace!("combine: rescale weights ready");

        // Stage 5
        let groups = p.num_lane_groups;
        let mut o_acc = DistributedTile::new(p.o_acc.clone(), 0.0f32);
        {
            let lds = scratch.view(layout.lse_range(), lse_desc)?;
            let mut window = block.o_acc_window.clone();
            for step in 0..num_splits.div_ceil(groups) {
                let split_start = step * groups;
                let mut partial = window.load(block.o_acc, &p.o_acc);
                partial.map_in_place_with_coords(|c, v| {
                    let split = split_start + c[0];
                    let weight = if split < num_splits {
                        lds.read(&[split, c[1]])
                    } else {
                        0.0
                    };
                    weight * v
                });
                o_acc = o_acc.zip_map(&partial, |acc, v| acc + v);
                window.move_by(&[groups, 0, 0]);
            }
        }
        {
            let mut acc = scratch.view_mut(layout.acc_range(), Descriptor::packed(&[groups, p.m0, p.n1]))?;
            TileWindow::new(&[0, 0, 0], &[groups, p.m0, p.n1]).store(&mut acc, &o_acc);
        }
        ctx.barrier();

        let slice = TileWindow::new(&[0, 0], &[p.m0, p.n1]);
        let mut out = DistributedTile::new(p.output.clone(), 0.0f32);
        for g in 0..groups {
            let desc = Descriptor::packed(&[p.m0, p.n1]).with_offset(g * p.m0 * p.n1);
            let part = slice.load(&scratch.view(layout.acc_range(), desc)?, &p.output);
            out = out.zip_map(&part, |acc, v| acc + v);
        }
        let o_op = self.o_op;
        out.map_in_place(|v| o_op.apply(v));
        trace!(groups, "combine: output folded");

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::tile::{TensorView, TensorViewMut};

    struct Fixture {
        num_splits: usize,
        rows: usize,
        head_dim: usize,
        lse: Vec<f32>,
        o: Vec<f32>,
    }

    fn small_config() -> CombineConfig {
        CombineConfig::default()
            .with_lane_groups(8, 2)
            .with_tile(2, 4)
            .with_max_splits(4)
    }

    /// Run one block at row 0, column 0; returns (output rows, lse, stats).
    fn run_block(config: &CombineConfig, f: &Fixture) -> (Vec<Vec<f32>>, Vec<f32>, usize) {
        let pipeline = CombinePipeline::new(config).unwrap();
        let p = pipeline.policy().clone();
        let mut ctx = BlockContext::new(config.lane_group_size, config.num_lane_groups).unwrap();
        let mut scratch = ScratchMemory::new(p.layout.total_len());

        let lse_view = TensorView::new(Descriptor::packed(&[f.num_splits, f.rows]), &f.lse).unwrap();
        let o_view =
            TensorView::new(Descriptor::packed(&[f.num_splits, f.rows, f.head_dim]), &f.o).unwrap();
        let mut lse_out = vec![0.0f32; f.rows];
        let mut lse_out_view = TensorViewMut::new(Descriptor::packed(&[f.rows]), &mut lse_out).unwrap();

        let block = CombineBlock {
            lse_acc: &lse_view,
            lse_acc_window: TileWindow::new(&[0, 0], &[p.max_splits, p.m0]),
            o_acc: &o_view,
            o_acc_window: TileWindow::new(&[0, 0, 0], &[p.num_lane_groups, p.m0, p.n1]),
            num_splits: f.num_splits,
        };
        let sink = LseSink {
            view: &mut lse_out_view,
            window: TileWindow::new(&[0], &[p.m0]),
        };
        let tile = pipeline.run(&mut ctx, &mut scratch, &block, Some(sink)).unwrap();

        let rows = (0..f.rows.min(p.m0))
            .map(|r| {
                (0..f.head_dim.min(p.n1))
                    .map(|c| tile.value_at(&[r, c]).unwrap())
                    .collect::<Vec<f32>>()
            })
            .collect();
        (rows, lse_out, ctx.stats().barriers)
    }

    #[test]
    fn test_three_splits_one_row() {
        let f = Fixture {
            num_splits: 3,
            rows: 1,
            head_dim: 2,
            lse: vec![1.0, 2.0, f32::NEG_INFINITY],
            o: vec![1.0, 1.0, 2.0, 2.0, 99.0, 99.0],
        };
        let config = small_config().with_tile(1, 2);
        let (out, lse, _) = run_block(&config, &f);
        let expected_lse = (1.0f32.exp() + 2.0f32.exp()).ln();
        assert!((lse[0] - expected_lse).abs() < 1e-5);
        assert!((lse[0] - 2.3133).abs() < 1e-3);
        for v in &out[0] {
            assert!((v - 1.731).abs() < 1e-3, "{v}");
        }
    }

    #[test]
    fn test_all_degenerate_row() {
        let f = Fixture {
            num_splits: 2,
            rows: 1,
            head_dim: 2,
            lse: vec![f32::NEG_INFINITY; 2],
            o: vec![5.0, 6.0, 7.0, 8.0],
        };
        let (out, lse, _) = run_block(&small_config(), &f);
        assert_eq!(lse[0], f32::NEG_INFINITY);
        assert_eq!(out[0], vec![0.0, 0.0]);
    }

    #[test]
    fn test_weights_sum_to_one() {
        // all partial outputs are 1, so each output equals the weight sum
        let f = Fixture {
            num_splits: 3,
            rows: 2,
            head_dim: 4,
            lse: vec![0.5, -3.0, 4.0, 1.5, f32::NEG_INFINITY, 2.0],
            o: vec![1.0; 3 * 2 * 4],
        };
        let (out, _, _) = run_block(&small_config(), &f);
        for row in out {
            for v in row {
                assert!((v - 1.0).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_barrier_count_is_data_independent() {
        let mut counts = Vec::new();
        for num_splits in 1..=4 {
            let lse = (0..num_splits * 2).map(|i| i as f32 * 0.25).collect();
            let f = Fixture {
                num_splits,
                rows: 2,
                head_dim: 4,
                lse,
                o: vec![0.5; num_splits * 8],
            };
            counts.push(run_block(&small_config(), &f).2);
        }
        let degenerate = Fixture {
            num_splits: 4,
            rows: 2,
            head_dim: 4,
            lse: vec![f32::NEG_INFINITY; 8],
            o: vec![0.5; 32],
        };
        counts.push(run_block(&small_config(), &degenerate).2);
        assert!(counts.iter().all(|&c| c == 3), "{counts:?}");
    }

    #[test]
    fn test_o_op_applied() {
        let f = Fixture {
            num_splits: 1,
            rows: 1,
            head_dim: 1,
            lse: vec![0.0],
            o: vec![3.0],
        };
        let config = small_config().with_o_op(ElementOp::Scale(2.0)).with_lse_op(ElementOp::Neg);
        let (out, lse, _) = run_block(&config, &f);
        assert!((out[0][0] - 6.0).abs() < 1e-6);
        assert_eq!(lse[0], 0.0);
    }
}
