//! Per-clip inference.
//!
//! [`ClipProcessor::process`] stages a window of frames, seeds the model
//! with every prompt batch, runs a reverse pass and then a forward pass and
//! returns the predictions keyed by absolute frame ordinal. Where both
//! passes visit a frame the forward result replaces the reverse one.

use std::collections::HashSet;

use anyhow::{bail, Context, Result};

use crate::cancel::CancelToken;
use crate::error::PipelineError;
use crate::models::{
    ClipRange, Frame, FrameSegment, ObjectId, ObjectPrediction, PromptInfo, PromptKind,
    VideoSegment,
};
use crate::predictor::{
    logits_to_mask, peak_score, with_inference_state, FrameStager, InferenceState,
    ObjectLogits, PropagationDirection, SeedPrompt, VideoPredictor,
};

/// Runs one clip at a time through a predictor.
pub struct ClipProcessor<'a> {
    predictor: &'a mut dyn VideoPredictor,
    stager: &'a dyn FrameStager,
    cancel: CancelToken,
}

impl<'a> ClipProcessor<'a> {
    pub fn new(
        predictor: &'a mut dyn VideoPredictor,
        stager: &'a dyn FrameStager,
        cancel: CancelToken,
    ) -> Self {
        Self {
            predictor,
            stager,
            cancel,
        }
    }

    /// Predict every frame of `window` (absolute ordinals into `frames`)
    /// from `prompts`. The result holds frames inside `window` only.
    pub fn process(
        &mut self,
        frames: &[Frame],
        window: ClipRange,
        prompts: &[PromptInfo],
    ) -> Result<VideoSegment> {
        if window.end_idx >= frames.len() {
            bail!(
                "clip window {} exceeds the video's {} frames",
                window,
                frames.len()
            );
        }
        let num_objects: usize = prompts.iter().map(|p| p.objects.len()).sum();
        if num_objects == 0 {
            tracing::warn!(clip = %window, "clip has no prompt objects, nothing to propagate");
            return Ok(VideoSegment::new());
        }

        let staged = self
            .stager
            .stage(&frames[window.start_idx..=window.end_idx])
            .with_context(|| format!("Failed to stage frames for clip {}", window))?;
        tracing::debug!(
            predictor = self.predictor.name(),
            clip = %window,
            frames = staged.len(),
            objects = num_objects,
            "processing clip"
        );

        let mut ids = HashSet::new();
        for object in prompts.iter().flat_map(|p| &p.objects) {
            if !ids.insert(object.object_id) {
                return Err(PipelineError::ObjectIdCollision {
                    object_id: object.object_id,
                }
                .into());
            }
        }

        let cancel = &self.cancel;
        with_inference_state(&mut *self.predictor, &staged, |state| {
            for batch in prompts {
                seed_batch(state, window, batch)?;
            }

            let mut segment = VideoSegment::new();
            for direction in [PropagationDirection::Reverse, PropagationDirection::Forward] {
                for result in state.propagate(direction)? {
                    cancel.check()?;
                    let frame = result?;
                    if frame.frame_idx >= window.len() {
                        bail!(
                            "predictor returned frame {} for a {}-frame clip",
                            frame.frame_idx,
                            window.len()
                        );
                    }
                    segment.insert_frame(
                        window.start_idx + frame.frame_idx,
                        to_frame_segment(frame.objects),
                    );
                }
            }
            Ok(segment)
        })
    }
}

fn seed_batch(
    state: &mut dyn InferenceState,
    window: ClipRange,
    batch: &PromptInfo,
) -> Result<()> {
    if !window.contains(batch.frame_idx) {
        return Err(PipelineError::PromptOutsideClip {
            frame_idx: batch.frame_idx,
            window,
        }
        .into());
    }
    let rel = batch.frame_idx - window.start_idx;

    let mut live: Vec<ObjectId> = Vec::new();
    for object in &batch.objects {
        let returned = match batch.kind {
            PromptKind::Points => state.add_points_or_box(
                rel,
                object.object_id,
                SeedPrompt::Points {
                    points: object.points.clone(),
                    labels: vec![1; object.points.len()],
                },
            )?,
            PromptKind::BBox => {
                state.add_points_or_box(rel, object.object_id, SeedPrompt::Box(object.bbox))?
            }
            PromptKind::Mask => state.add_mask(rel, object.object_id, &object.mask)?,
        };
        live = returned.into_iter().map(|o| o.object_id).collect();
    }
    tracing::debug!(
        frame = batch.frame_idx,
        kind = %batch.kind,
        live = ?live,
        "seeded prompt batch"
    );
    Ok(())
}

fn to_frame_segment(objects: Vec<ObjectLogits>) -> FrameSegment {
    objects
        .into_iter()
        .map(|o| {
            (
                o.object_id,
                ObjectPrediction {
                    mask: logits_to_mask(&o.logits),
                    score: peak_score(&o.logits),
                },
            )
        })
        .collect()
}
