// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Split combine GPU tests.
//!
//! Inputs are generated on the host, moved to the device and combined
//! through the public entry points, so these cover the `CubeCL` kernel and
//! the dispatch around it.

use anyhow::Result;
use candle_core::Device;

use tilekit::kernels::combine::{
    combine_splits, combine_splits_reference, combine_splits_varlen, CombineConfig,
};

use crate::helpers::{SplitMasking, SplitProblemConfig, TestFixtures, ValidationUtils};

fn cuda_device() -> Result<Device> {
    Ok(Device::new_cuda(0)?)
}

/// GPU results match the candle reference.
pub fn test_gpu_matches_reference() -> Result<()> {
    crate::require_gpu!();
    let device = cuda_device()?;

    for problem in [
        SplitProblemConfig::default(),
        SplitProblemConfig {
            num_splits: 16,
            head_dim_v: 256,
            seqlen_q: 3,
            seed: 9,
            ..Default::default()
        },
    ] {
        let (lse, o) = TestFixtures::split_inputs(&problem)?;
        let (want, want_lse) = combine_splits_reference(&lse, &o)?;

        let result = combine_splits(&lse.to_device(&device)?, &o.to_device(&device)?, &CombineConfig::default())?;
        ValidationUtils::assert_close(&result.output.to_device(&Device::Cpu)?, &want, 1e-4)?;
        let merged = result.lse.expect("lse stored").to_device(&Device::Cpu)?;
        ValidationUtils::assert_close(&merged, &want_lse, 1e-4)?;
    }
    Ok(())
}

/// Rows with no keys produce zeros and `-inf` on the GPU as well.
pub fn test_gpu_degenerate_rows() -> Result<()> {
    crate::require_gpu!();
    let device = cuda_device()?;

    let problem = SplitProblemConfig {
        masking: SplitMasking::EveryThirdRowEmpty,
        ..Default::default()
    };
    let (lse, o) = TestFixtures::split_inputs(&problem)?;
    let (want, want_lse) = combine_splits_reference(&lse, &o)?;

    let result = combine_splits(&lse.to_device(&device)?, &o.to_device(&device)?, &CombineConfig::default())?;
    ValidationUtils::assert_close(&result.output.to_device(&Device::Cpu)?, &want, 1e-4)?;
    let merged = result.lse.expect("lse stored").to_device(&Device::Cpu)?;
    ValidationUtils::assert_close(&merged, &want_lse, 1e-4)?;
    Ok(())
}

/// Group mode on device inputs runs on the host kernel and still agrees.
pub fn test_gpu_falls_back_for_group_mode() -> Result<()> {
    crate::require_gpu!();
    let device = cuda_device()?;

    let (lse, o, seqstart_q) = TestFixtures::group_inputs(2, 4, &[7, 20], 64, 5)?;
    let (want, _) = combine_splits_reference(&lse, &o)?;
    let result = combine_splits_varlen(
        &lse.to_device(&device)?,
        &o.to_device(&device)?,
        &seqstart_q,
        &CombineConfig::default(),
    )?;
    assert!(matches!(result.output.device(), Device::Cuda(_)));
    ValidationUtils::assert_close(&result.output.to_device(&Device::Cpu)?, &want, 1e-5)?;
    Ok(())
}
