//! Core data models that flow through the planning, prediction and
//! reassembly pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::geometry::BBox;
use crate::mask::{Mask, Rle};

/// Category identifier as found in the dataset.
pub type CategoryId = u32;

/// Object identifier handed to the predictor. See [`crate::identity`].
pub type ObjectId = u64;

/// One video frame as described by the dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub id: u64,
    pub video_id: String,
    pub order_in_video: usize,
    pub path: PathBuf,
    pub is_keyframe: bool,
    pub width: u32,
    pub height: u32,
}

/// A ground-truth annotation attached to a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub id: u64,
    pub image_id: u64,
    pub category_id: CategoryId,
    pub segmentation: Rle,
}

/// Inclusive, 0-based range of frame ordinals within one video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClipRange {
    pub start_idx: usize,
    pub end_idx: usize,
}

impl ClipRange {
    pub fn new(start_idx: usize, end_idx: usize) -> Self {
        debug_assert!(start_idx <= end_idx);
        Self { start_idx, end_idx }
    }

    /// Number of frames in the range. Never zero.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.end_idx - self.start_idx + 1
    }

    pub fn contains(&self, frame_idx: usize) -> bool {
        (self.start_idx..=self.end_idx).contains(&frame_idx)
    }
}

impl fmt::Display for ClipRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start_idx, self.end_idx)
    }
}

/// How prompt objects are presented to the predictor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PromptKind {
    #[default]
    Points,
    #[serde(rename = "bbox")]
    BBox,
    Mask,
}

impl PromptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptKind::Points => "points",
            PromptKind::BBox => "bbox",
            PromptKind::Mask => "mask",
        }
    }
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "points" => Ok(PromptKind::Points),
            "bbox" => Ok(PromptKind::BBox),
            "mask" => Ok(PromptKind::Mask),
            other => bail!(
                "Unknown prompt kind: '{}'. Must be points, bbox, or mask.",
                other
            ),
        }
    }
}

/// A point in pixel coordinates, `x` along the width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// One object instance used to seed the predictor.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptObject {
    pub mask: Mask,
    pub bbox: BBox,
    pub points: Vec<Point>,
    pub object_id: ObjectId,
}

/// A batch of prompt objects anchored to one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptInfo {
    pub objects: Vec<PromptObject>,
    /// Absolute frame ordinal within the video.
    pub frame_idx: usize,
    pub kind: PromptKind,
    pub video_id: String,
    pub path: PathBuf,
}

/// Predicted mask and confidence for one object on one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectPrediction {
    pub mask: Mask,
    pub score: f32,
}

/// Object id → prediction for one frame, in ascending id order.
pub type FrameSegment = BTreeMap<ObjectId, ObjectPrediction>;

/// Frame ordinal → per-object predictions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoSegment {
    frames: BTreeMap<usize, FrameSegment>,
}

impl VideoSegment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever is stored for `frame_idx`.
    pub fn insert_frame(&mut self, frame_idx: usize, segment: FrameSegment) {
        self.frames.insert(frame_idx, segment);
    }

    pub fn frame(&self, frame_idx: usize) -> Option<&FrameSegment> {
        self.frames.get(&frame_idx)
    }

    pub fn contains_frame(&self, frame_idx: usize) -> bool {
        self.frames.contains_key(&frame_idx)
    }

    pub fn frame_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.frames.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &FrameSegment)> {
        self.frames.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Keep only the frames inside `range`.
    pub fn restrict(mut self, range: ClipRange) -> Self {
        self.frames.retain(|idx, _| range.contains(*idx));
        self
    }

    /// Disjoint union. A frame present on both sides is an invariant
    /// violation and leaves `self` unchanged.
    pub fn merge_disjoint(&mut self, other: VideoSegment) -> Result<()> {
        if let Some(idx) = other.frames.keys().find(|idx| self.frames.contains_key(idx)) {
            return Err(PipelineError::ClipOverlap { frame_idx: *idx }.into());
        }
        self.frames.extend(other.frames);
        Ok(())
    }
}

/// One COCO prediction record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub image_id: u64,
    pub category_id: CategoryId,
    pub segmentation: Rle,
    /// `[x, y, width, height]`.
    pub bbox: [f32; 4],
    pub iscrowd: u8,
    pub score: f32,
}
