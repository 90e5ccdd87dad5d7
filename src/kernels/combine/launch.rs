// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Host-side launch of the combine kernel.
//!
//! Shapes are validated into a [`CombineProblem`], a [`LaunchPlan`] sizes the
//! grid, and the emulated kernel runs one [`CombinePipeline`] per block.
//! Output slabs (one per `(batch, head)` in batch mode, one per head in group
//! mode) are independent and run in parallel on the rayon pool; blocks
//! within a slab run in order on one worker, which owns its scratch.

use std::ops::Range;

use candle_core::Tensor;
use rayon::prelude::*;
use tracing::debug;

use super::config::CombineConfig;
use super::pipeline::{CombineBlock, CombinePipeline, LseSink};
use crate::error::{Result, TilekitError};
use crate::kernels::element::{tensor_to_f32, NumericKind};
use crate::kernels::tile::{
    BlockContext, Descriptor, ScratchMemory, TensorView, TensorViewMut, TileWindow,
};

/// How rows are grouped into sequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CombineMode {
    /// Fixed-length sequences: `[batch, nhead, num_splits, seqlen_q]`.
    Batch,
    /// Packed variable-length sequences: `[nhead, num_splits, total_q]`
    /// with `seqstart_q` prefix offsets.
    Group {
        /// `batch + 1` row offsets into `total_q`.
        seqstart_q: Vec<usize>,
    },
}

/// Validated combine problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombineProblem {
    /// Row grouping.
    pub mode: CombineMode,
    /// Sequences.
    pub batch: usize,
    /// Heads.
    pub nhead: usize,
    /// Splits present in the inputs.
    pub num_splits: usize,
    /// Rows per slab (`seqlen_q` in batch mode, `total_q` in group mode).
    pub slab_rows: usize,
    /// Value head dimension.
    pub head_dim_v: usize,
    /// Output shape.
    pub out_shape: Vec<usize>,
    /// Merged-LSE shape.
    pub lse_shape: Vec<usize>,
}

impl CombineProblem {
    /// Problem for flat `[num_splits, rows]` / `[num_splits, rows, head_dim_v]`
    /// or batched `[batch, nhead, num_splits, seqlen_q]` /
    /// `[batch, nhead, num_splits, seqlen_q, head_dim_v]` inputs.
    ///
    /// # Errors
    ///
    /// Returns [`TilekitError::ShapeMismatch`] for inconsistent ranks or dims.
    pub fn from_batch(lse_dims: &[usize], o_dims: &[usize]) -> Result<Self> {
        check_o_dims(lse_dims, o_dims)?;
        let (batch, nhead, num_splits, seqlen_q) = match *lse_dims {
            [s, q] => (1, 1, s, q),
            [b, h, s, q] => (b, h, s, q),
            _ => {
                return Err(TilekitError::ShapeMismatch {
                    expected: vec![0; 4],
                    actual: lse_dims.to_vec(),
                })
            }
        };
        let head_dim_v = o_dims[o_dims.len() - 1];
        let (out_shape, lse_shape) = if lse_dims.len() == 2 {
            (vec![seqlen_q, head_dim_v], vec![seqlen_q])
        } else {
            (
                vec![batch, nhead, seqlen_q, head_dim_v],
                vec![batch, nhead, seqlen_q],
            )
        };
        Ok(Self {
            mode: CombineMode::Batch,
            batch,
            nhead,
            num_splits,
            slab_rows: seqlen_q,
            head_dim_v,
            out_shape,
            lse_shape,
        })
    }

    /// Problem for packed `[nhead, num_splits, total_q]` /
    /// `[nhead, num_splits, total_q, head_dim_v]` inputs.
    ///
    /// # Errors
    ///
    /// Returns [`TilekitError::ShapeMismatch`] for inconsistent shapes and
    /// [`TilekitError::InvalidConfig`] for malformed `seqstart_q`.
    pub fn from_group(lse_dims: &[usize], o_dims: &[usize], seqstart_q: &[usize]) -> Result<Self> {
        check_o_dims(lse_dims, o_dims)?;
        let [nhead, num_splits, total_q] = *lse_dims else {
            return Err(TilekitError::ShapeMismatch {
                expected: vec![0; 3],
                actual: lse_dims.to_vec(),
            });
        };
        if seqstart_q.len() < 2
            || seqstart_q[0] != 0
            || seqstart_q.windows(2).any(|w| w[1] < w[0])
            || seqstart_q[seqstart_q.len() - 1] != total_q
        {
            return Err(TilekitError::InvalidConfig(format!(
                "seqstart_q {seqstart_q:?} must rise from 0 to total_q = {total_q}"
            )));
        }
        let head_dim_v = o_dims[3];
        Ok(Self {
            mode: CombineMode::Group {
                seqstart_q: seqstart_q.to_vec(),
            },
            batch: seqstart_q.len() - 1,
            nhead,
            num_splits,
            slab_rows: total_q,
            head_dim_v,
            out_shape: vec![nhead, total_q, head_dim_v],
            lse_shape: vec![nhead, total_q],
        })
    }

    /// Number of independent output slabs.
    #[must_use]
    pub fn num_slabs(&self) -> usize {
        match self.mode {
            CombineMode::Batch => self.batch * self.nhead,
            CombineMode::Group { .. } => self.nhead,
        }
    }

    /// Row ranges of the sequences inside one slab.
    #[must_use]
    pub fn sequences(&self) -> Vec<Range<usize>> {
        match &self.mode {
            CombineMode::Batch => vec![0..self.slab_rows],
            CombineMode::Group { seqstart_q } => seqstart_q.windows(2).map(|w| w[0]..w[1]).collect(),
        }
    }

    /// Longest sequence.
    #[must_use]
    pub fn max_seqlen_q(&self) -> usize {
        self.sequences().iter().map(ExactSizeIterator::len).max().unwrap_or(0)
    }

    /// Check the problem against a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TilekitError::InvalidConfig`] for split counts outside
    /// `1..=max_splits`, an empty head dimension, or unpadded ragged tiles.
    pub fn check(&self, config: &CombineConfig) -> Result<()> {
        config.validate()?;
        if self.num_splits == 0 || self.num_splits > config.max_splits {
            return Err(TilekitError::InvalidConfig(format!(
                "num_splits {} outside 1..={}",
                self.num_splits, config.max_splits
            )));
        }
        if self.head_dim_v == 0 {
            return Err(TilekitError::InvalidConfig("head_dim_v is zero".to_string()));
        }
        if !config.pad_head_dim_v && self.head_dim_v % config.n1 != 0 {
            return Err(TilekitError::InvalidConfig(format!(
                "head_dim_v {} is not a multiple of n1 = {} and pad_head_dim_v is off",
                self.head_dim_v, config.n1
            )));
        }
        if !config.pad_seqlen_q {
            if let Some(seq) = self.sequences().iter().find(|r| r.len() % config.m0 != 0) {
                return Err(TilekitError::InvalidConfig(format!(
                    "sequence length {} is not a multiple of m0 = {} and pad_seqlen_q is off",
                    seq.len(),
                    config.m0
                )));
            }
        }
        config.resolve_blocks_per_cu(self.head_dim_v)?;
        Ok(())
    }
}

fn check_o_dims(lse_dims: &[usize], o_dims: &[usize]) -> Result<()> {
    if o_dims.len() != lse_dims.len() + 1 || o_dims[..lse_dims.len()] != *lse_dims {
        let mut expected = lse_dims.to_vec();
        expected.push(o_dims.last().copied().unwrap_or(0));
        return Err(TilekitError::ShapeMismatch {
            expected,
            actual: o_dims.to_vec(),
        });
    }
    Ok(())
}

/// Grid and resource plan for one launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchPlan {
    /// `[nhead, row_tiles * head_dim_tiles, batch]`.
    pub grid: [usize; 3],
    /// Lanes per block.
    pub block_size: usize,
    /// Scratch bytes per block.
    pub scratch_bytes: usize,
    /// Occupancy target.
    pub blocks_per_cu: usize,
    /// Row tiles per sequence (longest sequence in group mode).
    pub row_tiles: usize,
    /// Head-dim tiles per row tile.
    pub head_dim_tiles: usize,
}

impl LaunchPlan {
    /// Plan a launch.
    ///
    /// # Errors
    ///
    /// Returns an error if the problem does not fit the configuration.
    pub fn new(config: &CombineConfig, problem: &CombineProblem) -> Result<Self> {
        problem.check(config)?;
        let row_tiles = problem.max_seqlen_q().div_ceil(config.m0);
        let head_dim_tiles = problem.head_dim_v.div_ceil(config.n1);
        Ok(Self {
            grid: [problem.nhead, row_tiles * head_dim_tiles, problem.batch],
            block_size: config.block_size(),
            scratch_bytes: config.scratch_layout().bytes(),
            blocks_per_cu: config.resolve_blocks_per_cu(problem.head_dim_v)?,
            row_tiles,
            head_dim_tiles,
        })
    }

    /// Blocks in the grid.
    #[must_use]
    pub fn total_blocks(&self) -> usize {
        self.grid.iter().product()
    }
}

/// Combined output and optional merged LSE.
#[derive(Debug, Clone)]
pub struct CombineOutput {
    /// Output with the split dimension removed.
    pub output: Tensor,
    /// Merged LSE, present when `store_lse` is set.
    pub lse: Option<Tensor>,
}

/// Run the combine with the emulated block kernel.
///
/// # Errors
///
/// Returns an error for invalid problems or candle failures.
pub fn combine_on_host(
    lse_acc: &Tensor,
    o_acc: &Tensor,
    problem: &CombineProblem,
    config: &CombineConfig,
) -> Result<CombineOutput> {
    let plan = LaunchPlan::new(config, problem)?;
    let out_kind = match config.out_kind {
        Some(kind) => kind,
        None => NumericKind::from_dtype(o_acc.dtype())?,
    };
    debug!(
        grid = ?plan.grid,
        block_size = plan.block_size,
        scratch_bytes = plan.scratch_bytes,
        blocks_per_cu = plan.blocks_per_cu,
        ?out_kind,
        "combine: host launch"
    );

    let lse_data = tensor_to_f32(lse_acc)?;
    let o_data = tensor_to_f32(o_acc)?;

    let rows = problem.slab_rows;
    let dim = problem.head_dim_v;
    let slabs = problem.num_slabs();
    let mut out = vec![0.0f32; slabs * rows * dim];
    let mut lse = vec![0.0f32; slabs * rows];

    if rows > 0 {
        let pipeline = CombinePipeline::new(config)?;
        let ctx = BlockContext::new(config.lane_group_size, config.num_lane_groups)?;
        let scratch_len = config.scratch_layout().total_len();
        let sequences = problem.sequences();
        let slab = SlabInputs {
            problem,
            config,
            pipeline: &pipeline,
            sequences: &sequences,
            lse_acc: &lse_data,
            o_acc: &o_data,
        };

        out.par_chunks_mut(rows * dim)
            .zip(lse.par_chunks_mut(rows))
            .enumerate()
            .try_for_each_init(
                || (ScratchMemory::new(scratch_len), ctx.clone()),
                |(scratch, ctx), (index, (out_slab, lse_slab))| {
                    slab.run(index, ctx, scratch, out_slab, lse_slab)
                },
            )?;
    }

    let device = o_acc.device();
    let output = Tensor::from_vec(out, problem.out_shape.as_slice(), device)?.to_dtype(out_kind.dtype())?;
    let lse = if config.store_lse {
        Some(Tensor::from_vec(lse, problem.lse_shape.as_slice(), device)?.to_dtype(out_kind.dtype())?)
    } else {
        None
    };
    Ok(CombineOutput { output, lse })
}

struct SlabInputs<'a> {
    problem: &'a CombineProblem,
    config: &'a CombineConfig,
    pipeline: &'a CombinePipeline,
    sequences: &'a [Range<usize>],
    lse_acc: &'a [f32],
    o_acc: &'a [f32],
}

impl SlabInputs<'_> {
    fn run(
        &self,
        index: usize,
        ctx: &mut BlockContext,
        scratch: &mut ScratchMemory,
        out_slab: &mut [f32],
        lse_slab: &mut [f32],
    ) -> Result<()> {
        let c = self.config;
        let splits = self.problem.num_splits;
        let rows = self.problem.slab_rows;
        let dim = self.problem.head_dim_v;
        let lse_base = index * splits * rows;
        let o_base = lse_base * dim;

        for seq in self.sequences {
            let len = seq.len();
            if len == 0 {
                continue;
            }
            let lse_view = TensorView::new(
                Descriptor::new(&[splits, len], &[rows, 1], lse_base + seq.start)?,
                self.lse_acc,
            )?;
            let o_view = TensorView::new(
                Descriptor::new(&[splits, len, dim], &[rows * dim, dim, 1], o_base + seq.start * dim)?,
                self.o_acc,
            )?;
            let mut out_view = TensorViewMut::new(
                Descriptor::packed(&[len, dim]).with_offset(seq.start * dim),
                &mut *out_slab,
            )?;
            let mut lse_view_out =
                TensorViewMut::new(Descriptor::packed(&[len]).with_offset(seq.start), &mut *lse_slab)?;

            for row_tile in 0..len.div_ceil(c.m0) {
                let row0 = row_tile * c.m0;
                for col_tile in 0..dim.div_ceil(c.n1) {
                    let col0 = col_tile * c.n1;
                    let block = CombineBlock {
                        lse_acc: &lse_view,
                        lse_acc_window: TileWindow::new(&[0, row0], &[c.max_splits, c.m0]),
                        o_acc: &o_view,
                        o_acc_window: TileWindow::new(&[0, row0, col0], &[c.num_lane_groups, c.m0, c.n1]),
                        num_splits: splits,
                    };
                    let sink = if c.store_lse && col_tile == 0 {
                        Some(LseSink {
                            view: &mut lse_view_out,
                            window: TileWindow::new(&[row0], &[c.m0]),
                        })
                    } else {
                        None
                    };
                    let tile = self.pipeline.run(ctx, scratch, &block, sink)?;
                    TileWindow::new(&[row0, col0], &[c.m0, c.n1]).store(&mut out_view, &tile);
                }
            }
        }
        Ok(())
    }
}
