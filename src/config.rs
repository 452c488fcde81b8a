//! TOML configuration.
//!
//! ```toml
//! [dataset]
//! path = "data/coco_annotations.json"
//!
//! [output]
//! root = "./runs"
//!
//! [inference]
//! prompt_kind = "points"      # points | bbox | mask
//! clip_length = 50            # omit for one clip per video
//! category_growth = false
//! num_points = 1
//! videos = ["3", "17"]        # omit to write every video
//!
//! [predictor]
//! backend = "hold"
//! min_free_memory_mb = 2048
//!
//! [staging]
//! mode = "symlink"            # symlink | in_place
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use vos_harness_core::models::PromptKind;
use vos_harness_core::planner::{PlanMode, PlanOptions};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub dataset: DatasetConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub predictor: PredictorConfig,
    #[serde(default)]
    pub staging: StagingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatasetConfig {
    /// COCO annotation file.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    /// Artifacts go to `<root>/output/<prompt_kind>/`.
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    #[serde(default)]
    pub prompt_kind: PromptKind,
    #[serde(default)]
    pub clip_length: Option<usize>,
    #[serde(default)]
    pub category_growth: bool,
    #[serde(default = "default_num_points")]
    pub num_points: usize,
    /// Videos whose predictions are written. All of them when absent.
    #[serde(default)]
    pub videos: Option<Vec<String>>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            prompt_kind: PromptKind::default(),
            clip_length: None,
            category_growth: false,
            num_points: default_num_points(),
            videos: None,
        }
    }
}

fn default_num_points() -> usize {
    1
}

impl InferenceConfig {
    pub fn plan_options(&self) -> PlanOptions {
        let mode = if self.category_growth {
            PlanMode::CategoryGrowth
        } else {
            PlanMode::FixedLength {
                clip_length: self.clip_length,
            }
        };
        PlanOptions {
            mode,
            prompt_kind: self.prompt_kind,
            num_points: self.num_points,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PredictorConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Logit magnitude emitted by the `hold` backend.
    #[serde(default = "default_logit_scale")]
    pub logit_scale: f32,
    /// Disc radius in pixels for point prompts on the `hold` backend.
    #[serde(default = "default_point_radius")]
    pub point_radius: usize,
    /// Warn after a video when the predictor reports less free memory.
    #[serde(default)]
    pub min_free_memory_mb: u64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            logit_scale: default_logit_scale(),
            point_radius: default_point_radius(),
            min_free_memory_mb: 0,
        }
    }
}

fn default_backend() -> String {
    "hold".to_string()
}
fn default_logit_scale() -> f32 {
    10.0
}
fn default_point_radius() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StagingMode {
    /// Symlink each clip's frames into a temporary directory as `%08d.jpg`.
    #[default]
    Symlink,
    /// Hand the original frame paths to the predictor.
    InPlace,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StagingConfig {
    #[serde(default)]
    pub mode: StagingMode,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Checks shared by file loading and CLI overrides.
pub fn validate(config: &Config) -> Result<()> {
    if config.inference.clip_length == Some(0) {
        bail!("inference.clip_length must be > 0");
    }
    if config.inference.num_points == 0 {
        bail!("inference.num_points must be >= 1");
    }
    if config.inference.category_growth {
        if config.inference.clip_length.is_some() {
            tracing::warn!("inference.clip_length is ignored when category_growth is enabled");
        }
        if config.inference.prompt_kind != PromptKind::Points {
            tracing::warn!(
                prompt_kind = %config.inference.prompt_kind,
                "category growth seeds ground truth with points; prompt_kind only names the output directory"
            );
        }
    }
    if let Some(videos) = &config.inference.videos {
        if videos.is_empty() {
            bail!("inference.videos must list at least one video when present");
        }
    }

    match config.predictor.backend.as_str() {
        "hold" => {}
        other => bail!("Unknown predictor backend: '{}'. Must be hold.", other),
    }
    let scale = config.predictor.logit_scale;
    if scale.is_nan() || scale <= 0.0 {
        bail!("predictor.logit_scale must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml)?;
        validate(&config)?;
        Ok(config)
    }

    const MINIMAL: &str = r#"
[dataset]
path = "coco.json"

[output]
root = "out"
"#;

    #[test]
    fn defaults_fill_optional_sections() {
        let config = parse(MINIMAL).unwrap();
        assert_eq!(config.inference.prompt_kind, PromptKind::Points);
        assert_eq!(config.inference.num_points, 1);
        assert!(config.inference.clip_length.is_none());
        assert_eq!(config.predictor.backend, "hold");
        assert_eq!(config.staging.mode, StagingMode::Symlink);
        assert_eq!(
            config.inference.plan_options().mode,
            PlanMode::FixedLength { clip_length: None }
        );
    }

    #[test]
    fn full_config_parses() {
        let config = parse(&format!(
            "{MINIMAL}
[inference]
prompt_kind = \"bbox\"
clip_length = 30
num_points = 3
videos = [\"4\"]

[staging]
mode = \"in_place\"
"
        ))
        .unwrap();
        let options = config.inference.plan_options();
        assert_eq!(options.prompt_kind, PromptKind::BBox);
        assert_eq!(
            options.mode,
            PlanMode::FixedLength {
                clip_length: Some(30)
            }
        );
        assert_eq!(options.num_points, 3);
        assert_eq!(config.staging.mode, StagingMode::InPlace);
    }

    #[test]
    fn growth_mode_selected() {
        let config = parse(&format!("{MINIMAL}\n[inference]\ncategory_growth = true\n")).unwrap();
        assert_eq!(config.inference.plan_options().mode, PlanMode::CategoryGrowth);
    }

    #[test]
    fn invalid_values_are_rejected() {
        for bad in [
            "[inference]\nclip_length = 0\n",
            "[inference]\nnum_points = 0\n",
            "[inference]\nvideos = []\n",
            "[inference]\nprompt_kind = \"polygon\"\n",
            "[predictor]\nbackend = \"sam9\"\n",
            "[predictor]\nlogit_scale = 0.0\n",
        ] {
            assert!(parse(&format!("{MINIMAL}\n{bad}")).is_err(), "{bad}");
        }
    }
}
