//! Clip planning.
//!
//! Splits a video's ordered frame list into contiguous clips and picks the
//! prompt frame and prompt objects for each one. Planning is lazy: prompt
//! objects (and therefore object ids) are produced only when a plan is
//! pulled from the iterator. Each call to [`ClipPlanner::plan`] starts a
//! fresh pass over the video.
//!
//! # Policies
//!
//! **Fixed length.** Clip `k` owns `[kL, min((k+1)L - 1, N - 1)]`. The
//! first keyframe in the range that carries at least one annotation anchors
//! a prompt batch built from every annotated instance on it. A range with no
//! such keyframe is emitted without prompts and is skipped downstream.
//!
//! **Category growth.** Keyframes are walked in order while tracking the
//! categories introduced so far. A keyframe that brings an unseen category
//! anchors a new clip; the previous clip ends one frame before it. The first
//! clip starts at frame 0 and the last one ends at `N - 1`, so the owned
//! ranges tile the video. Every clip except the last is processed over a
//! window extended by the next anchor frame: the prediction on that frame
//! becomes the carried mask prompt for the next clip, which owns it.
//!
//! ```text
//! frames      0 1 2 3 4 5 6 7 8 9
//! anchors       ^       ^     ^
//! owned       [0 . . 3][4 . 6][7 . 9]
//! windows     [0 . . . 4]
//!                     [4 . . 7]
//!                           [7 . 9]
//! ```

use std::collections::BTreeSet;

use anyhow::Result;

use crate::dataset::{frame_categories, AnnotationSource};
use crate::error::PipelineError;
use crate::geometry::{mask_to_bbox, mask_to_instances, mask_to_points};
use crate::identity::ObjectIdEncoder;
use crate::models::{CategoryId, ClipRange, Frame, PromptInfo, PromptKind, PromptObject};

/// How a video is split into clips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanMode {
    /// Fixed-length clips; `None` means one clip for the whole video.
    FixedLength { clip_length: Option<usize> },
    /// A new clip whenever a keyframe introduces an unseen category.
    CategoryGrowth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanOptions {
    pub mode: PlanMode,
    /// Prompt kind for ground-truth batches in fixed-length mode. Category
    /// growth always seeds ground truth with points.
    pub prompt_kind: PromptKind,
    /// Seed points per instance.
    pub num_points: usize,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            mode: PlanMode::FixedLength { clip_length: None },
            prompt_kind: PromptKind::Points,
            num_points: 1,
        }
    }
}

/// One planned clip.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipPlan {
    /// Frames whose predictions this clip contributes. Owned ranges tile
    /// the video.
    pub range: ClipRange,
    /// Frames handed to the predictor. Equal to `range`, or `range` plus the
    /// next clip's first frame in category-growth mode.
    pub window: ClipRange,
    pub prompts: Vec<PromptInfo>,
}

impl ClipPlan {
    /// A clip with no prompt batch is never submitted to the predictor.
    pub fn is_skipped(&self) -> bool {
        self.prompts.is_empty()
    }

    /// The frame past `range` that was predicted only to seed the next clip.
    pub fn boundary_frame(&self) -> Option<usize> {
        (self.window.end_idx > self.range.end_idx).then_some(self.window.end_idx)
    }
}

/// Builds clip plans for one video at a time.
pub struct ClipPlanner<'a> {
    source: &'a dyn AnnotationSource,
    encoder: &'a ObjectIdEncoder,
    options: PlanOptions,
}

impl<'a> ClipPlanner<'a> {
    pub fn new(
        source: &'a dyn AnnotationSource,
        encoder: &'a ObjectIdEncoder,
        options: PlanOptions,
    ) -> Self {
        Self {
            source,
            encoder,
            options,
        }
    }

    /// Start a pass over `frames`, which must be one video sorted by
    /// `order_in_video`.
    pub fn plan(&self, frames: &'a [Frame]) -> ClipPlans<'a> {
        let state = match self.options.mode {
            PlanMode::FixedLength { clip_length } => PlanState::Fixed {
                clip_length: clip_length.unwrap_or(frames.len()).max(1),
                next_start: 0,
            },
            PlanMode::CategoryGrowth => PlanState::Growth {
                cursor: 0,
                seen: BTreeSet::new(),
                open: None,
                clip_start: 0,
            },
        };
        ClipPlans {
            frames,
            source: self.source,
            encoder: self.encoder,
            options: self.options,
            state,
            done: false,
        }
    }
}

enum PlanState {
    Fixed {
        clip_length: usize,
        next_start: usize,
    },
    Growth {
        cursor: usize,
        seen: BTreeSet<CategoryId>,
        open: Option<PromptInfo>,
        clip_start: usize,
    },
}

/// Iterator over the clip plans of one video.
pub struct ClipPlans<'a> {
    frames: &'a [Frame],
    source: &'a dyn AnnotationSource,
    encoder: &'a ObjectIdEncoder,
    options: PlanOptions,
    state: PlanState,
    done: bool,
}

impl<'a> Iterator for ClipPlans<'a> {
    type Item = Result<ClipPlan>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = match self.state {
            PlanState::Fixed { .. } => self.next_fixed(),
            PlanState::Growth { .. } => self.next_growth(),
        };
        match item {
            Some(Err(e)) => {
                self.done = true;
                Some(Err(e))
            }
            None => {
                self.done = true;
                None
            }
            other => other,
        }
    }
}

impl<'a> ClipPlans<'a> {
    fn next_fixed(&mut self) -> Option<Result<ClipPlan>> {
        let n = self.frames.len();
        let PlanState::Fixed {
            clip_length,
            next_start,
        } = &mut self.state
        else {
            return None;
        };
        if *next_start >= n {
            return None;
        }
        let range = ClipRange::new(*next_start, (*next_start + *clip_length - 1).min(n - 1));
        *next_start = range.end_idx + 1;

        let Some(anchor) = find_prompt_frame(self.frames, self.source, range) else {
            tracing::warn!(
                video_id = %self.video_id(),
                clip = %range,
                "no prompt frame found for clip, skipping"
            );
            return Some(Ok(ClipPlan {
                range,
                window: range,
                prompts: Vec::new(),
            }));
        };

        let prompt = match self.prompt_for(anchor, self.options.prompt_kind) {
            Ok(p) => p,
            Err(e) => return Some(Err(e)),
        };
        let prompts = if prompt.objects.is_empty() {
            tracing::warn!(
                video_id = %self.video_id(),
                clip = %range,
                frame = anchor,
                "prompt frame has only empty masks, skipping"
            );
            Vec::new()
        } else {
            vec![prompt]
        };
        Some(Ok(ClipPlan {
            range,
            window: range,
            prompts,
        }))
    }

    fn next_growth(&mut self) -> Option<Result<ClipPlan>> {
        let n = self.frames.len();
        loop {
            let PlanState::Growth {
                cursor,
                seen,
                open,
                clip_start,
            } = &mut self.state
            else {
                return None;
            };

            if *cursor >= n {
                self.done = true;
                return match open.take() {
                    Some(prev) => Some(Ok(ClipPlan {
                        range: ClipRange::new(*clip_start, n - 1),
                        window: ClipRange::new(*clip_start, n - 1),
                        prompts: vec![prev],
                    })),
                    None if n > 0 => {
                        tracing::warn!(
                            video_id = %self.video_id(),
                            "no annotated keyframe in video, skipping"
                        );
                        Some(Ok(ClipPlan {
                            range: ClipRange::new(0, n - 1),
                            window: ClipRange::new(0, n - 1),
                            prompts: Vec::new(),
                        }))
                    }
                    None => None,
                };
            }

            let pos = *cursor;
            *cursor += 1;
            let frame = &self.frames[pos];
            if !frame.is_keyframe {
                continue;
            }
            let cats = frame_categories(self.source, frame);
            if cats.is_subset(seen) {
                continue;
            }
            seen.extend(cats);

            let prompt = match self.prompt_for(pos, PromptKind::Points) {
                Ok(p) => p,
                Err(e) => return Some(Err(e)),
            };

            // Re-borrow after `prompt_for` released `self`.
            let PlanState::Growth {
                open, clip_start, ..
            } = &mut self.state
            else {
                return None;
            };
            match open.replace(prompt) {
                None => continue,
                Some(prev) => {
                    let plan = ClipPlan {
                        range: ClipRange::new(*clip_start, pos - 1),
                        window: ClipRange::new(*clip_start, pos),
                        prompts: vec![prev],
                    };
                    *clip_start = pos;
                    return Some(Ok(plan));
                }
            }
        }
    }

    fn video_id(&self) -> &str {
        self.frames
            .first()
            .map(|f| f.video_id.as_str())
            .unwrap_or("")
    }

    fn prompt_for(&self, frame_idx: usize, kind: PromptKind) -> Result<PromptInfo> {
        let frame = &self.frames[frame_idx];
        Ok(PromptInfo {
            objects: ground_truth_objects(
                self.source,
                self.encoder,
                frame,
                self.options.num_points,
            )?,
            frame_idx,
            kind,
            video_id: frame.video_id.clone(),
            path: frame.path.clone(),
        })
    }
}

/// First keyframe inside `range` that has at least one annotation.
pub fn find_prompt_frame(
    frames: &[Frame],
    source: &dyn AnnotationSource,
    range: ClipRange,
) -> Option<usize> {
    (range.start_idx..=range.end_idx.min(frames.len().saturating_sub(1)))
        .find(|&i| frames[i].is_keyframe && !source.annotations(frames[i].id).is_empty())
}

/// One prompt object per connected component of every annotation on
/// `frame`, each with a freshly issued object id.
pub fn ground_truth_objects(
    source: &dyn AnnotationSource,
    encoder: &ObjectIdEncoder,
    frame: &Frame,
    num_points: usize,
) -> Result<Vec<PromptObject>> {
    let mut objects = Vec::new();
    for ann in source.annotations(frame.id) {
        let mask = ann.segmentation.decode()?;
        for instance in mask_to_instances(&mask) {
            let Some(bbox) = mask_to_bbox(&instance) else {
                continue;
            };
            let points = mask_to_points(&instance, num_points);
            objects.push(PromptObject {
                mask: instance,
                bbox,
                points,
                object_id: encoder.encode(ann.category_id)?,
            });
        }
    }
    Ok(objects)
}

/// Enforces that clip ranges arrive contiguously from frame 0.
#[derive(Debug, Clone)]
pub struct CoverageTracker {
    next_start: usize,
    num_frames: usize,
}

impl CoverageTracker {
    pub fn new(num_frames: usize) -> Self {
        Self {
            next_start: 0,
            num_frames,
        }
    }

    pub fn observe(&mut self, range: ClipRange) -> Result<()> {
        if range.start_idx != self.next_start || range.end_idx >= self.num_frames {
            return Err(PipelineError::CoverageGap {
                range,
                expected_start: self.next_start,
            }
            .into());
        }
        self.next_start = range.end_idx + 1;
        Ok(())
    }

    pub fn finish(&self) -> Result<()> {
        if self.next_start != self.num_frames {
            return Err(PipelineError::IncompleteCoverage {
                covered: self.next_start,
                num_frames: self.num_frames,
            }
            .into());
        }
        Ok(())
    }
}

/// Check that `ranges` tile `[0, num_frames - 1]` without gaps or overlaps.
pub fn verify_tiling(ranges: &[ClipRange], num_frames: usize) -> Result<()> {
    let mut sorted = ranges.to_vec();
    sorted.sort();
    let mut tracker = CoverageTracker::new(num_frames);
    for range in sorted {
        tracker.observe(range)?;
    }
    tracker.finish()
}
