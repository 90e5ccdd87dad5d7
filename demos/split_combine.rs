// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Split-KV decode attention example.
//!
//! This example shows how to:
//! - Split the key/value sequence into chunks and attend to each one
//! - Merge the per-split results with `combine_splits`
//! - Check the merged output against full softmax attention
//!
//! Run with: `cargo run --example split_combine`

use anyhow::Result;
use candle_core::{Device, Tensor, D};
use tilekit::kernels::combine::{combine_splits, CombineConfig};
use tilekit::memory::{estimate_combine_workspace, format_bytes};

/// Attention of `q` over one key/value chunk.
///
/// Returns the normalized chunk output and the log-sum-exp of its scores.
fn attend(q: &Tensor, k: &Tensor, v: &Tensor, scale: f64) -> Result<(Tensor, Tensor)> {
    let scores = (q.matmul(&k.t()?.contiguous()?)? * scale)?;
    let max = scores.max_keepdim(D::Minus1)?;
    let lse = scores
        .broadcast_sub(&max)?
        .exp()?
        .sum_keepdim(D::Minus1)?
        .log()?
        .add(&max)?;
    let probs = candle_nn::ops::softmax_last_dim(&scores)?;
    Ok((probs.matmul(v)?, lse.squeeze(D::Minus1)?))
}

fn main() -> Result<()> {
    println!("=== Split-KV Combine Example ===\n");

    let device = Device::Cpu;
    let (batch, nhead, kv_len, head_dim) = (2, 8, 1000, 64);
    let num_splits = 6;
    let scale = 1.0 / (head_dim as f64).sqrt();

    println!("Configuration:");
    println!("  Batch: {batch}, heads: {nhead}, head dim: {head_dim}");
    println!("  KV length: {kv_len} in {num_splits} splits\n");

    let q = Tensor::randn(0.0f32, 1.0, (batch, nhead, 1, head_dim), &device)?;
    let k = Tensor::randn(0.0f32, 1.0, (batch, nhead, kv_len, head_dim), &device)?;
    let v = Tensor::randn(0.0f32, 1.0, (batch, nhead, kv_len, head_dim), &device)?;

    // Per-split partial attention
    let chunk = kv_len.div_ceil(num_splits);
    let mut o_parts = Vec::with_capacity(num_splits);
    let mut lse_parts = Vec::with_capacity(num_splits);
    for split in 0..num_splits {
        let start = split * chunk;
        let len = chunk.min(kv_len - start);
        let k_s = k.narrow(2, start, len)?.contiguous()?;
        let v_s = v.narrow(2, start, len)?.contiguous()?;
        let (o_s, lse_s) = attend(&q, &k_s, &v_s, scale)?;
        println!("  Split {split}: keys {start}..{}", start + len);
        o_parts.push(o_s);
        lse_parts.push(lse_s);
    }
    // [batch, nhead, num_splits, 1] and [batch, nhead, num_splits, 1, head_dim]
    let lse_acc = Tensor::stack(&lse_parts, 2)?;
    let o_acc = Tensor::stack(&o_parts, 2)?;

    let ws = estimate_combine_workspace(
        batch,
        nhead,
        num_splits,
        1,
        head_dim,
        tilekit::kernels::NumericKind::F32,
        true,
    );
    println!("\nCombine workspace: {}", format_bytes(ws.total()));

    println!("Combining splits...");
    let config = CombineConfig::default().with_max_splits(8);
    let result = combine_splits(&lse_acc, &o_acc, &config)?;
    println!("  Output shape: {:?}", result.output.dims());

    // Full attention over the whole sequence
    let (full, full_lse) = attend(&q, &k, &v, scale)?;

    let max_diff = (result.output - full)?
        .abs()?
        .flatten_all()?
        .max(0)?
        .to_scalar::<f32>()?;
    let lse_diff = (result.lse.expect("lse stored by default") - full_lse)?
        .abs()?
        .flatten_all()?
        .max(0)?
        .to_scalar::<f32>()?;
    println!("\nMax |combined - full| output: {max_diff:.2e}");
    println!("Max |combined - full| lse:    {lse_diff:.2e}");

    assert!(max_diff < 1e-4, "combined output diverged from full attention");
    assert!(lse_diff < 1e-4, "merged lse diverged from full attention");
    println!("\n✓ Split combine matches full attention");
    Ok(())
}
