//! Predictor backend selection.

use anyhow::{bail, Result};

use vos_harness_core::predictor::hold::HoldPredictor;
use vos_harness_core::predictor::{MemoryInfo, VideoPredictor};

use crate::config::PredictorConfig;

/// Instantiate the backend named in `[predictor].backend`.
pub fn build_predictor(config: &PredictorConfig) -> Result<Box<dyn VideoPredictor>> {
    match config.backend.as_str() {
        "hold" => Ok(Box::new(HoldPredictor::new(
            config.logit_scale,
            config.point_radius,
        ))),
        other => bail!("Unknown predictor backend: '{}'. Must be hold.", other),
    }
}

/// True when the predictor reports less free memory than `floor_mb`.
/// Backends that cannot report memory always pass.
pub fn below_memory_floor(info: Option<MemoryInfo>, floor_mb: u64) -> bool {
    match info {
        Some(info) if floor_mb > 0 => info.free_bytes < floor_mb.saturating_mul(1024 * 1024),
        _ => false,
    }
}
