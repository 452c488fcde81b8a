//! Run artifacts.
//!
//! Every run writes two JSON files under `<root>/output/<prompt_kind>/`:
//!
//! - `predict.json`: the COCO prediction list, one record per
//!   (keyframe, category).
//! - `prompts.json`: the prompt log. It records every prompt batch handed
//!   to the predictor, with masks as RLE, plus the run id, creation time and
//!   the SHA-256 of the dataset file so a log can be matched to its input.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vos_harness_core::identity::decode_category;
use vos_harness_core::mask::Rle;
use vos_harness_core::models::{
    AnnotationRecord, CategoryId, ObjectId, Point, PromptInfo, PromptKind,
};

/// Artifact locations for one prompt kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub dir: PathBuf,
    pub predictions: PathBuf,
    pub prompts: PathBuf,
}

impl OutputPaths {
    pub fn new(root: &Path, kind: PromptKind) -> Self {
        let dir = root.join("output").join(kind.as_str());
        Self {
            predictions: dir.join("predict.json"),
            prompts: dir.join("prompts.json"),
            dir,
        }
    }

    pub fn create_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create output directory: {}", self.dir.display()))
    }
}

/// Run-level metadata stored at the top of the prompt log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub dataset_path: PathBuf,
    pub dataset_sha256: String,
    pub prompt_kind: PromptKind,
    pub clip_length: Option<usize>,
    pub category_growth: bool,
    pub predictor: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptLogFile {
    #[serde(flatten)]
    pub run: RunInfo,
    pub prompts: Vec<PromptRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRecord {
    pub video_id: String,
    pub frame_idx: usize,
    pub kind: PromptKind,
    pub path: PathBuf,
    pub objects: Vec<PromptObjectRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptObjectRecord {
    pub object_id: ObjectId,
    pub category_id: CategoryId,
    /// `[x, y, width, height]`.
    pub bbox: [f32; 4],
    pub points: Vec<Point>,
    pub mask: Rle,
}

impl PromptRecord {
    pub fn from_prompt(prompt: &PromptInfo, num_categories: u32) -> Self {
        Self {
            video_id: prompt.video_id.clone(),
            frame_idx: prompt.frame_idx,
            kind: prompt.kind,
            path: prompt.path.clone(),
            objects: prompt
                .objects
                .iter()
                .map(|o| PromptObjectRecord {
                    object_id: o.object_id,
                    category_id: decode_category(o.object_id, num_categories),
                    bbox: o.bbox.to_xywh(),
                    points: o.points.clone(),
                    mask: Rle::encode(&o.mask),
                })
                .collect(),
        }
    }
}

pub fn write_predictions(path: &Path, records: &[AnnotationRecord]) -> Result<()> {
    write_json(path, &records)?;
    tracing::info!(path = %path.display(), records = records.len(), "predictions written");
    Ok(())
}

pub fn write_prompt_log(
    path: &Path,
    run: RunInfo,
    prompts: &[PromptInfo],
    num_categories: u32,
) -> Result<()> {
    let log = PromptLogFile {
        run,
        prompts: prompts
            .iter()
            .map(|p| PromptRecord::from_prompt(p, num_categories))
            .collect(),
    };
    write_json(path, &log)?;
    tracing::info!(path = %path.display(), prompts = prompts.len(), "prompt log written");
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}
