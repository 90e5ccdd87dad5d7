// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Split combine `CubeCL` kernel.
//!
//! One cube merges one query row of one `(batch, head)` slab:
//!
//! ```text
//! cube (slab, row):
//!     stage lse_acc[0..num_splits] in shared memory         sync
//!     unit 0: lse = log(sum exp(lse_acc - max)) + max       sync
//!     weights[s] = exp(lse_acc[s] - lse)                    sync
//!     for col in unit..head_dim step cube_dim:
//!         out[col] = sum_s weights[s] * o_acc[s, col]
//! ```
//!
//! ## `CubeCL` API (v0.8.1)
//!
//! - `#[cube(launch)]` - Kernel definition
//! - `SharedMemory::<F>::new(comptime_size)` - Per-cube staging for split weights
//! - `CUBE_POS_X`, `CUBE_POS_Y`, `UNIT_POS_X`, `CUBE_DIM_X` - Indexing primitives
//! - `sync_cube()` - Cube-level barrier
//!
//! Only batch-mode problems run here; packed variable-length problems and
//! hosts without CUDA use the emulated block kernel.

use crate::error::{Result, TilekitError};
use crate::kernels::combine::{CombineConfig, CombineMode, CombineProblem};

#[cfg(feature = "cuda")]
use crate::kernels::combine::CombineOutput;
#[cfg(feature = "cuda")]
use candle_core::Tensor;
#[cfg(feature = "cuda")]
use cubecl::prelude::*;
#[cfg(feature = "cuda")]
use cubecl_cuda::CudaRuntime;

/// Split weights staged per cube. Must match the kernel's shared allocation.
pub const SHARED_SPLITS: usize = 128;

/// Upper bound on units per cube.
pub const MAX_CUBE_DIM: usize = 256;

/// Merge all splits of one row.
///
/// Memory layout, all contiguous:
/// - `lse_acc`: `[slabs, num_splits, rows]`
/// - `o_acc`: `[slabs, num_splits, rows, head_dim]`
/// - `out`: `[slabs, rows, head_dim]`
/// - `lse_out`: `[slabs, rows]`
#[cfg(feature = "cuda")]
#[cube(launch)]
fn split_combine_rows<F: Float>(
    lse_acc: &Array<F>,
    o_acc: &Array<F>,
    out: &mut Array<F>,
    lse_out: &mut Array<F>,
    num_splits: u32,
    rows: u32,
    head_dim: u32,
) {
    let slab = CUBE_POS_X;
    let row = CUBE_POS_Y;
    let tid = UNIT_POS_X;
    let neg_inf = F::new(f32::NEG_INFINITY);

    let mut weights = SharedMemory::<F>::new(128);
    let mut merged = SharedMemory::<F>::new(1);

    if tid < num_splits {
        weights[tid] = lse_acc[slab * num_splits * rows + tid * rows + row];
    }
    sync_cube();

    if tid == 0 {
        let mut row_max = neg_inf;
        for s in 0..num_splits {
            row_max = F::max(row_max, weights[s]);
        }
        let mut row_sum = F::new(0.0);
        if row_max > neg_inf {
            for s in 0..num_splits {
                row_sum += F::exp(weights[s] - row_max);
            }
        }
        let mut lse = neg_inf;
        if row_sum > F::new(0.0) {
            lse = F::log(row_sum) + row_max;
        }
        merged[0] = lse;
        lse_out[slab * rows + row] = lse;
    }
    sync_cube();

    let lse = merged[0];
    if tid < num_splits {
        let mut weight = F::new(0.0);
        if lse > neg_inf {
            weight = F::exp(weights[tid] - lse);
        }
        weights[tid] = weight;
    }
    sync_cube();

    let o_base = slab * num_splits * rows * head_dim + row * head_dim;
    let split_stride = rows * head_dim;
    let out_base = (slab * rows + row) * head_dim;
    let mut col = tid;
    while col < head_dim {
        let mut acc = F::new(0.0);
        for s in 0..num_splits {
            acc += weights[s] * o_acc[o_base + s * split_stride + col];
        }
        out[out_base + col] = acc;
        col += CUBE_DIM_X;
    }
}

/// Grid `[slabs, rows]` and units per cube for a batch-mode problem.
///
/// Every split needs a unit to stage its LSE, so the cube is at least
/// `num_splits` wide; beyond that it grows with the head dimension up to
/// [`MAX_CUBE_DIM`].
///
/// # Errors
///
/// Returns [`TilekitError::Kernel`] for group-mode problems, split counts
/// above [`SHARED_SPLITS`], or grids that overflow `u32`.
pub fn launch_dims(problem: &CombineProblem, config: &CombineConfig) -> Result<([u32; 2], u32)> {
    if !matches!(problem.mode, CombineMode::Batch) {
        return Err(TilekitError::Kernel(
            "CubeCL combine supports batch mode only".to_string(),
        ));
    }
    if problem.num_splits > SHARED_SPLITS {
        return Err(TilekitError::Kernel(format!(
            "num_splits {} exceeds shared staging of {SHARED_SPLITS}",
            problem.num_splits
        )));
    }
    let units = problem
        .head_dim_v
        .min(config.block_size())
        .min(MAX_CUBE_DIM)
        .max(problem.num_splits)
        .next_power_of_two();
    let to_u32 = |v: usize| {
        u32::try_from(v).map_err(|_| TilekitError::Kernel(format!("launch dimension {v} overflows u32")))
    };
    Ok((
        [to_u32(problem.num_slabs())?, to_u32(problem.slab_rows)?],
        to_u32(units)?,
    ))
}

/// Combine split results on the GPU.
///
/// Inputs are copied to `f32` device buffers; `lse_op`, `o_op` and the
/// output kind are applied on readback.
///
/// # Errors
///
/// Returns an error if the problem cannot run on the GPU, tensors are not on
/// a CUDA device, or the readback does not match the expected sizes.
#[cfg(feature = "cuda")]
pub fn combine_splits_cubecl(
    lse_acc: &Tensor,
    o_acc: &Tensor,
    problem: &CombineProblem,
    config: &CombineConfig,
) -> Result<CombineOutput> {
    use super::interop::{bytes_to_f32, candle_to_cubecl_handle};
    use crate::kernels::element::NumericKind;

    let (grid, units) = launch_dims(problem, config)?;
    let out_kind = match config.out_kind {
        Some(kind) => kind,
        None => NumericKind::from_dtype(o_acc.dtype())?,
    };

    let lse_len = problem.num_slabs() * problem.slab_rows;
    let out_len = lse_len * problem.head_dim_v;
    tracing::debug!(?grid, units, num_splits = problem.num_splits, "combine: CubeCL launch");

    // PERF: round-trips through host memory; candle does not expose the raw
    // device pointer to CubeCL
    let (lse_bytes, _) = candle_to_cubecl_handle(lse_acc)?;
    let (o_bytes, _) = candle_to_cubecl_handle(o_acc)?;

    let device = cubecl_cuda::CudaDevice::new(0);
    let client = CudaRuntime::client(&device);

    let lse_handle = client.create(&lse_bytes);
    let o_handle = client.create(&o_bytes);
    let out_handle = client.empty(out_len * std::mem::size_of::<f32>());
    let lse_out_handle = client.empty(lse_len * std::mem::size_of::<f32>());

    let cube_count = CubeCount::Static(grid[0], grid[1], 1);
    let cube_dim = CubeDim::new(units, 1, 1);

    // SAFETY: every handle was allocated above with exactly the element
    // count passed alongside it
    unsafe {
        split_combine_rows::launch::<f32, CudaRuntime>(
            &client,
            cube_count,
            cube_dim,
            ArrayArg::from_raw_parts::<f32>(&lse_handle, lse_acc.elem_count(), 1),
            ArrayArg::from_raw_parts::<f32>(&o_handle, o_acc.elem_count(), 1),
            ArrayArg::from_raw_parts::<f32>(&out_handle, out_len, 1),
            ArrayArg::from_raw_parts::<f32>(&lse_out_handle, lse_len, 1),
            ScalarArg::new(problem.num_splits as u32),
            ScalarArg::new(problem.slab_rows as u32),
            ScalarArg::new(problem.head_dim_v as u32),
        );
    }

    let out_bytes = client.read_one(out_handle);
    let mut out = bytes_to_f32(&out_bytes, out_len)?;
    if !config.o_op.is_identity() {
        out.iter_mut().for_each(|v| *v = config.o_op.apply(*v));
    }

    let device = o_acc.device();
    let output = Tensor::from_vec(out, problem.out_shape.as_slice(), device)?.to_dtype(out_kind.dtype())?;
    let lse = if config.store_lse {
        let lse_out_bytes = client.read_one(lse_out_handle);
        let lse: Vec<f32> = bytes_to_f32(&lse_out_bytes, lse_len)?
            .into_iter()
            .map(|v| config.lse_op.apply(v))
            .collect();
        Some(Tensor::from_vec(lse, problem.lse_shape.as_slice(), device)?.to_dtype(out_kind.dtype())?)
    } else {
        None
    };
    Ok(CombineOutput { output, lse })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_dims_batch() {
        let config = CombineConfig::default();
        let p = CombineProblem::from_batch(&[2, 8, 4, 100], &[2, 8, 4, 100, 128]).unwrap();
        let (grid, units) = launch_dims(&p, &config).unwrap();
        assert_eq!(grid, [16, 100]);
        assert_eq!(units, 128);
    }

    #[test]
    fn test_launch_dims_covers_splits() {
        let config = CombineConfig::for_long_context();
        let p = CombineProblem::from_batch(&[100, 3], &[100, 3, 16]).unwrap();
        let (_, units) = launch_dims(&p, &config).unwrap();
        assert_eq!(units, 128);
    }

    #[test]
    fn test_launch_dims_rejects_group_mode() {
        let config = CombineConfig::default();
        let p = CombineProblem::from_group(&[2, 3, 10], &[2, 3, 10, 8], &[0, 4, 10]).unwrap();
        assert!(matches!(launch_dims(&p, &config), Err(TilekitError::Kernel(_))));
    }

    // GPU tests require cuda feature and hardware
    #[cfg(feature = "cuda")]
    mod cuda_tests {
        use super::*;
        use crate::kernels::combine::combine_splits_reference;
        use candle_core::{DType, Device, Tensor};

        #[test]
        fn test_cubecl_matches_reference() {
            let Ok(device @ Device::Cuda(_)) = Device::cuda_if_available(0) else {
                return;
            };
            let lse = Tensor::randn(0.0f32, 2.0, (2, 4, 5, 33), &device).unwrap();
            let o = Tensor::randn(0.0f32, 1.0, (2, 4, 5, 33, 64), &device).unwrap();
            let p = CombineProblem::from_batch(lse.dims(), o.dims()).unwrap();
            let res = combine_splits_cubecl(&lse, &o, &p, &CombineConfig::default()).unwrap();
            let (want, want_lse) = combine_splits_reference(&lse, &o).unwrap();

            let diff = (res.output.to_dtype(DType::F64).unwrap() - want)
                .unwrap()
                .abs()
                .unwrap()
                .flatten_all()
                .unwrap()
                .max(0)
                .unwrap()
                .to_scalar::<f64>()
                .unwrap();
            assert!(diff < 1e-4, "max diff {diff}");

            let lse_diff = (res.lse.unwrap().to_dtype(DType::F64).unwrap() - want_lse)
                .unwrap()
                .abs()
                .unwrap()
                .flatten_all()
                .unwrap()
                .max(0)
                .unwrap()
                .to_scalar::<f64>()
                .unwrap();
            assert!(lse_diff < 1e-4, "max lse diff {lse_diff}");
        }
    }
}
