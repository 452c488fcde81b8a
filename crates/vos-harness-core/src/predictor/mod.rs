//! Video segmentation model and frame staging abstractions.
//!
//! The [`VideoPredictor`] trait is the seam to the external model. A
//! predictor opens one [`InferenceState`] per clip over a [`StagedClip`]
//! (frames reindexed from 0), accepts point, box and mask prompts, and
//! streams per-frame logits when asked to propagate in either direction.
//!
//! # Lifecycle
//!
//! 1. [`FrameStager::stage`] lays out the clip's frames.
//! 2. [`with_inference_state`] opens the state, hands it to the caller and
//!    drops it, then calls [`VideoPredictor::release_memory`] on every exit
//!    path, unwinding included.
//! 3. Only one state is live at a time; the state borrows the predictor
//!    mutably for its whole lifetime.
//!
//! [`hold::HoldPredictor`] is an in-memory baseline that repeats each
//! prompt's mask on every propagated frame.

pub mod hold;

use std::any::Any;
use std::path::PathBuf;

use anyhow::Result;

use crate::geometry::BBox;
use crate::mask::{LogitMap, Mask};
use crate::models::{Frame, ObjectId, Point};

/// Direction of a propagation pass, starting from the prompted frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationDirection {
    /// From the last prompted frame down to frame 0.
    Reverse,
    /// From the first prompted frame up to the last frame.
    Forward,
}

/// Point or box seed for [`InferenceState::add_points_or_box`].
#[derive(Debug, Clone, PartialEq)]
pub enum SeedPrompt {
    /// Points with SAM-style labels (`1` foreground, `0` background).
    Points { points: Vec<Point>, labels: Vec<i32> },
    Box(BBox),
}

/// Logits for one tracked object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectLogits {
    pub object_id: ObjectId,
    pub logits: LogitMap,
}

/// All object logits for one clip-relative frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PropagatedFrame {
    pub frame_idx: usize,
    pub objects: Vec<ObjectLogits>,
}

/// Lazily produced propagation results.
pub type FrameStream<'s> = Box<dyn Iterator<Item = Result<PropagatedFrame>> + 's>;

/// Accelerator memory snapshot in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryInfo {
    pub free_bytes: u64,
    pub total_bytes: u64,
}

/// Model state for one clip.
pub trait InferenceState {
    /// Seed `object_id` on a clip-relative frame with points or a box.
    /// Returns the logits of every object prompted on that frame.
    fn add_points_or_box(
        &mut self,
        frame_idx: usize,
        object_id: ObjectId,
        prompt: SeedPrompt,
    ) -> Result<Vec<ObjectLogits>>;

    /// Seed `object_id` on a clip-relative frame with a binary mask.
    fn add_mask(
        &mut self,
        frame_idx: usize,
        object_id: ObjectId,
        mask: &Mask,
    ) -> Result<Vec<ObjectLogits>>;

    /// Propagate every seeded object in `direction`.
    fn propagate(&mut self, direction: PropagationDirection) -> Result<FrameStream<'_>>;
}

/// The external video segmentation model.
pub trait VideoPredictor {
    /// Backend identifier for logs (e.g. `"hold"`).
    fn name(&self) -> &str;

    /// Open model state over a staged clip.
    fn init_state(&mut self, clip: &StagedClip) -> Result<Box<dyn InferenceState + '_>>;

    /// Return cached accelerator memory after a state is dropped.
    fn release_memory(&mut self) {}

    /// Free/total accelerator memory, when the backend can report it.
    fn memory_info(&self) -> Option<MemoryInfo> {
        None
    }
}

struct ReleaseGuard<'p> {
    predictor: &'p mut dyn VideoPredictor,
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        self.predictor.release_memory();
    }
}

/// Open a state for `clip`, run `f` on it, then drop the state and release
/// predictor memory whatever `f` returned.
pub fn with_inference_state<T, F>(
    predictor: &mut dyn VideoPredictor,
    clip: &StagedClip,
    f: F,
) -> Result<T>
where
    F: FnOnce(&mut dyn InferenceState) -> Result<T>,
{
    let mut guard = ReleaseGuard { predictor };
    let mut state = guard.predictor.init_state(clip)?;
    let out = f(state.as_mut());
    drop(state);
    out
}

/// Frames of one clip laid out for the predictor, reindexed from 0.
pub struct StagedClip {
    /// Frame files in clip order; index `i` is clip-relative frame `i`.
    pub frames: Vec<PathBuf>,
    /// Directory holding the staged frames, when the stager made one.
    pub root: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
    guard: Option<Box<dyn Any>>,
}

impl StagedClip {
    pub fn new(frames: Vec<PathBuf>, width: u32, height: u32) -> Self {
        Self {
            frames,
            root: None,
            width,
            height,
            guard: None,
        }
    }

    /// Attach a staging directory and a value that cleans it up on drop.
    pub fn with_root(mut self, root: PathBuf, guard: Box<dyn Any>) -> Self {
        self.root = Some(root);
        self.guard = Some(guard);
        self
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Prepares a clip's frames for the predictor.
pub trait FrameStager {
    fn stage(&self, frames: &[Frame]) -> Result<StagedClip>;
}

/// Passes the original frame paths through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct InPlaceStager;

impl FrameStager for InPlaceStager {
    fn stage(&self, frames: &[Frame]) -> Result<StagedClip> {
        let (width, height) = frames
            .first()
            .map(|f| (f.width, f.height))
            .unwrap_or((0, 0));
        Ok(StagedClip::new(
            frames.iter().map(|f| f.path.clone()).collect(),
            width,
            height,
        ))
    }
}

/// Sigmoid of the largest logit, i.e. the peak foreground probability.
pub fn peak_score(logits: &LogitMap) -> f32 {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if max == f32::NEG_INFINITY {
        return 0.0;
    }
    1.0 / (1.0 + (-max).exp())
}

/// Foreground where the logit is strictly positive.
pub fn logits_to_mask(logits: &LogitMap) -> Mask {
    logits.mapv(|l| l > 0.0)
}
