// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Tiling and reduction substrate shared by the block kernels.
//!
//! ## Module Structure
//!
//! - [`distribution`] - Pure mapping of tile elements onto lanes
//! - [`distributed`] - Register tiles stored per lane
//! - [`window`] - Descriptors, views and tile windows over bulk/scratch memory
//! - [`block`] - Block identity, barriers and synchronization counters
//! - [`scratch`] - Block-shared scratch memory with scoped views
//! - [`reduce`] - Lane-group butterfly reduction of distributed tiles
//!
//! ## Example
//!
//! ```rust
//! use tilekit::kernels::tile::{
//!     block_reduce, BlockContext, DistributedTile, ReduceOp, TileDistribution,
//! };
//!
//! let mut ctx = BlockContext::new(8, 1)?;
//! let dist = TileDistribution::spread(&[2, 8], ctx.block_size())?;
//! let tile = DistributedTile::from_fn(dist, |c| c[1] as f32);
//! let row_sum = block_reduce(&mut ctx, &tile, 1, ReduceOp::Sum)?;
//! assert_eq!(row_sum.value_at(&[1]), Some(28.0));
//! # Ok::<(), tilekit::TilekitError>(())
//! ```

pub mod block;
pub mod distributed;
pub mod distribution;
pub mod reduce;
pub mod scratch;
pub mod window;

pub use block::{BlockContext, BlockStats};
pub use distributed::DistributedTile;
pub use distribution::{Coord, DistributedIndex, TileDistribution, MAX_RANK};
pub use reduce::{block_reduce, block_reduce_with, ReduceOp};
pub use scratch::ScratchMemory;
pub use window::{Descriptor, ReadView, TensorView, TensorViewMut, TileWindow, WriteView};
