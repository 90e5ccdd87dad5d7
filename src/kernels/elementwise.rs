// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Strided elementwise kernel with an output permutation.
//!
//! Each block loads a tile of the input through a packed descriptor, applies
//! an [`ElementOp`] in registers and stores through a descriptor whose
//! strides scatter input coordinates into the permuted output layout, e.g.
//! NCHW to NHWC with `perm = [0, 2, 3, 1]`.

use candle_core::Tensor;
use tracing::debug;

use crate::error::{Result, TilekitError};
use crate::kernels::element::{tensor_to_f32, ElementOp, NumericKind};
use crate::kernels::tile::{Descriptor, TensorView, TensorViewMut, TileDistribution, TileWindow, MAX_RANK};

/// Lanes per block.
const BLOCK_SIZE: usize = 256;

/// Tile extent along the innermost input dimension.
const TILE_INNER: usize = 64;

/// Tile extent along the second innermost input dimension.
const TILE_OUTER: usize = 16;

/// Apply `op` to every element of `input` and write it permuted.
///
/// `perm` follows [`Tensor::permute`]: output dimension `k` is input
/// dimension `perm[k]`. The output uses `out_kind`, or the input dtype
/// when `None`.
///
/// # Errors
///
/// Returns [`TilekitError::InvalidConfig`] if `perm` is not a permutation of
/// the input axes or the rank exceeds the tile rank, and
/// [`TilekitError::UnsupportedDType`] for integer inputs.
///
/// # Example
///
/// ```rust
/// use candle_core::{Device, Tensor};
/// use tilekit::kernels::element::ElementOp;
/// use tilekit::kernels::elementwise::elementwise_permute;
///
/// let x = Tensor::new(&[[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]], &Device::Cpu)?;
/// let y = elementwise_permute(&x, &[1, 0], ElementOp::Scale(2.0), None)?;
/// assert_eq!(y.to_vec2::<f32>()?, vec![vec![2.0, 8.0], vec![4.0, 10.0], vec![6.0, 12.0]]);
/// # Ok::<(), tilekit::TilekitError>(())
/// ```
pub fn elementwise_permute(
    input: &Tensor,
    perm: &[usize],
    op: ElementOp,
    out_kind: Option<NumericKind>,
) -> Result<Tensor> {
    let in_dims = input.dims();
    let rank = in_dims.len();
    check_permutation(perm, rank)?;
    let out_kind = match out_kind {
        Some(kind) => kind,
        None => NumericKind::from_dtype(input.dtype())?,
    };

    let out_dims: Vec<usize> = perm.iter().map(|&p| in_dims[p]).collect();
    let num_elements: usize = in_dims.iter().product();
    if num_elements == 0 {
        return Ok(Tensor::zeros(out_dims.as_slice(), out_kind.dtype(), input.device())?);
    }

    // out[k] = in[perm[k]], so input axis perm[k] walks output stride k
    let out_packed = Descriptor::packed(&out_dims);
    let mut scatter = vec![0; rank];
    for (k, &p) in perm.iter().enumerate() {
        scatter[p] = out_packed.strides()[k];
    }

    let mut tile = vec![1; rank];
    tile[rank - 1] = in_dims[rank - 1].min(TILE_INNER);
    if rank >= 2 {
        tile[rank - 2] = in_dims[rank - 2].min(TILE_OUTER);
    }
    let dist = TileDistribution::spread(&tile, BLOCK_SIZE)?;
    let tiles_per_dim: Vec<usize> = in_dims.iter().zip(&tile).map(|(d, t)| d.div_ceil(*t)).collect();
    let num_tiles: usize = tiles_per_dim.iter().product();
    debug!(?in_dims, ?perm, ?op, num_tiles, "elementwise permute");

    let data = tensor_to_f32(input)?;
    let in_view = TensorView::new(Descriptor::packed(in_dims), &data)?;
    let mut out = vec![0.0f32; num_elements];
    {
        let mut out_view = TensorViewMut::new(Descriptor::new(in_dims, &scatter, 0)?, &mut out)?;
        let mut origin = vec![0; rank];
        for t in 0..num_tiles {
            let mut rest = t;
            for d in (0..rank).rev() {
                origin[d] = (rest % tiles_per_dim[d]) * tile[d];
                rest /= tiles_per_dim[d];
            }
            let window = TileWindow::new(&origin, &tile);
            let mut regs = window.load(&in_view, &dist);
            regs.map_in_place(|v| op.apply(v));
            window.store(&mut out_view, &regs);
        }
    }

    Ok(Tensor::from_vec(out, out_dims.as_slice(), input.device())?.to_dtype(out_kind.dtype())?)
}

fn check_permutation(perm: &[usize], rank: usize) -> Result<()> {
    if rank == 0 || rank > MAX_RANK {
        return Err(TilekitError::InvalidConfig(format!(
            "elementwise permute supports rank 1..={MAX_RANK}, got {rank}"
        )));
    }
    let mut seen = [false; MAX_RANK];
    let valid = perm.len() == rank
        && perm.iter().all(|&p| p < rank && !std::mem::replace(&mut seen[p], true));
    if !valid {
        return Err(TilekitError::InvalidConfig(format!(
            "{perm:?} is not a permutation of {rank} axes"
        )));
    }
    Ok(())
}
