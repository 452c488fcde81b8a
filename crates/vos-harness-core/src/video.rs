//! Per-video orchestration.
//!
//! [`VideoOrchestrator::run`] pulls clip plans one at a time, checks that
//! their owned ranges tile the video, submits every non-skipped clip to the
//! [`ClipProcessor`] and merges the results. In category-growth mode the
//! prediction on a clip's boundary frame is turned into a mask prompt for
//! the next clip, which keeps object identities stable across clips.

use anyhow::Result;

use crate::context::RunContext;
use crate::dataset::AnnotationSource;
use crate::geometry::{mask_to_bbox, mask_to_instances, mask_to_points};
use crate::identity::ObjectIdEncoder;
use crate::mask;
use crate::models::{Frame, FrameSegment, PromptInfo, PromptKind, PromptObject, VideoSegment};
use crate::planner::{ClipPlanner, CoverageTracker, PlanOptions};
use crate::predictor::{FrameStager, VideoPredictor};
use crate::processor::ClipProcessor;

pub struct VideoOrchestrator<'a> {
    source: &'a dyn AnnotationSource,
    predictor: &'a mut dyn VideoPredictor,
    stager: &'a dyn FrameStager,
    options: PlanOptions,
}

impl<'a> VideoOrchestrator<'a> {
    pub fn new(
        source: &'a dyn AnnotationSource,
        predictor: &'a mut dyn VideoPredictor,
        stager: &'a dyn FrameStager,
        options: PlanOptions,
    ) -> Self {
        Self {
            source,
            predictor,
            stager,
            options,
        }
    }

    /// Segment one video. `frames` must be the video's frames sorted by
    /// `order_in_video`; the result is keyed by position in that list.
    pub fn run(&mut self, ctx: &mut RunContext, frames: &[Frame]) -> Result<VideoSegment> {
        let RunContext {
            encoder,
            prompt_log,
            cancel,
        } = ctx;
        let encoder: &ObjectIdEncoder = encoder;
        encoder.reset();

        let video_id = frames.first().map(|f| f.video_id.as_str()).unwrap_or("");
        let planner = ClipPlanner::new(self.source, encoder, self.options);
        let mut processor = ClipProcessor::new(&mut *self.predictor, self.stager, cancel.clone());
        let mut tracker = CoverageTracker::new(frames.len());
        let mut result = VideoSegment::new();
        let mut carry: Option<PromptInfo> = None;
        let (mut processed, mut skipped) = (0usize, 0usize);

        for plan in planner.plan(frames) {
            cancel.check()?;
            let mut plan = plan?;
            tracker.observe(plan.range)?;

            if plan.is_skipped() {
                skipped += 1;
                continue;
            }
            if let Some(prompt) = carry.take() {
                plan.prompts.push(prompt);
            }
            prompt_log.extend(plan.prompts.iter().cloned());

            let segment = processor.process(frames, plan.window, &plan.prompts)?;
            processed += 1;
            tracing::debug!(
                video_id,
                clip = %plan.range,
                window = %plan.window,
                frames = segment.len(),
                "clip processed"
            );

            if let Some(boundary) = plan.boundary_frame() {
                carry = match segment.frame(boundary) {
                    Some(objects) => {
                        let prompt = boundary_prompt(
                            encoder,
                            &frames[boundary],
                            boundary,
                            objects,
                            self.options.num_points,
                        )?;
                        (!prompt.objects.is_empty()).then_some(prompt)
                    }
                    None => None,
                };
                if carry.is_none() {
                    tracing::warn!(
                        video_id,
                        frame = boundary,
                        "no object survived to the clip boundary, next clip starts from ground truth only"
                    );
                }
            }

            result.merge_disjoint(segment.restrict(plan.range))?;
        }
        tracker.finish()?;

        tracing::info!(
            video_id,
            frames = frames.len(),
            clips = processed,
            skipped,
            predicted = result.len(),
            objects = encoder.issued(),
            "video segmented"
        );
        Ok(result)
    }
}

/// Mask prompt built from the predictions on a clip's boundary frame.
///
/// Every non-empty instance mask is split into connected components. The
/// first component keeps the propagated object id; every further component
/// is a new instance of the same category with a fresh id.
pub fn boundary_prompt(
    encoder: &ObjectIdEncoder,
    frame: &Frame,
    frame_idx: usize,
    objects: &FrameSegment,
    num_points: usize,
) -> Result<PromptInfo> {
    let mut prompt_objects = Vec::new();
    for (&object_id, prediction) in objects {
        if mask::is_empty(&prediction.mask) {
            continue;
        }
        for (i, component) in mask_to_instances(&prediction.mask).into_iter().enumerate() {
            let Some(bbox) = mask_to_bbox(&component) else {
                continue;
            };
            let object_id = if i == 0 {
                object_id
            } else {
                encoder.encode(encoder.decode(object_id))?
            };
            prompt_objects.push(PromptObject {
                points: mask_to_points(&component, num_points),
                mask: component,
                bbox,
                object_id,
            });
        }
    }
    Ok(PromptInfo {
        objects: prompt_objects,
        frame_idx,
        kind: PromptKind::Mask,
        video_id: frame.video_id.clone(),
        path: frame.path.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::dataset::memory::InMemoryDataset;
    use crate::error::PipelineError;
    use crate::models::{ClipRange, ObjectPrediction};
    use crate::planner::PlanMode;
    use crate::predictor::hold::HoldPredictor;
    use crate::predictor::InPlaceStager;
    use crate::testutil::{add_video, annotate, block, frame};
    use std::collections::HashSet;

    fn run(
        ds: &InMemoryDataset,
        ctx: &mut RunContext,
        frames: &[Frame],
        mode: PlanMode,
    ) -> Result<VideoSegment> {
        let mut predictor = HoldPredictor::default();
        let options = PlanOptions {
            mode,
            ..PlanOptions::default()
        };
        VideoOrchestrator::new(ds, &mut predictor, &InPlaceStager, options).run(ctx, frames)
    }

    #[test]
    fn skipped_clip_frames_are_absent() {
        let mut ds = InMemoryDataset::new();
        let frames = add_video(&mut ds, "v", 0, 6, &[1]);
        annotate(&mut ds, 1, 1, &block(1, 1, 3, 3));
        let mut ctx = RunContext::new(ds.num_categories(), CancelToken::new());

        let segment = run(
            &ds,
            &mut ctx,
            &frames,
            PlanMode::FixedLength {
                clip_length: Some(3),
            },
        )
        .unwrap();
        assert_eq!(segment.frame_indices().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(ctx.prompt_log().len(), 1);
        assert_eq!(ctx.prompt_log()[0].frame_idx, 1);
        // The held seed is visible on every frame of the first clip.
        for idx in 0..3 {
            assert_eq!(segment.frame(idx).unwrap().len(), 1);
        }
    }

    #[test]
    fn growth_carries_mask_prompt_into_next_clip() {
        let mut ds = InMemoryDataset::new();
        let frames = add_video(&mut ds, "v", 0, 8, &[1, 4]);
        annotate(&mut ds, 1, 1, &block(0, 0, 2, 2));
        annotate(&mut ds, 4, 2, &block(3, 3, 5, 5));
        let mut ctx = RunContext::new(ds.num_categories(), CancelToken::new());

        let segment = run(&ds, &mut ctx, &frames, PlanMode::CategoryGrowth).unwrap();
        assert_eq!(segment.len(), 8);

        let log = ctx.prompt_log();
        assert_eq!(log.len(), 3);
        assert_eq!((log[0].frame_idx, log[0].kind), (1, PromptKind::Points));
        assert_eq!((log[1].frame_idx, log[1].kind), (4, PromptKind::Points));
        // Carried prompt sits on the second clip's first frame and keeps the
        // id of the object it was propagated from.
        let carried = &log[2];
        assert_eq!((carried.frame_idx, carried.kind), (4, PromptKind::Mask));
        assert_eq!(carried.objects.len(), 1);
        assert_eq!(carried.objects[0].object_id, log[0].objects[0].object_id);

        // Second clip tracks both the carried and the new object.
        let last = segment.frame(7).unwrap();
        let cats: HashSet<_> = last.keys().map(|&id| ctx.encoder().decode(id)).collect();
        assert_eq!(cats, HashSet::from([1, 2]));
    }

    #[test]
    fn boundary_prompt_splits_components() {
        let encoder = ObjectIdEncoder::new(2);
        let tracked = encoder.encode(2).unwrap();
        let other = encoder.encode(1).unwrap();

        let mut two_blobs = block(0, 0, 1, 1);
        two_blobs |= &block(4, 4, 5, 5);
        let mut objects = FrameSegment::new();
        objects.insert(
            tracked,
            ObjectPrediction {
                mask: two_blobs,
                score: 0.9,
            },
        );
        objects.insert(
            other,
            ObjectPrediction {
                mask: block(0, 0, 0, 0).mapv(|_| false),
                score: 0.1,
            },
        );

        let prompt = boundary_prompt(&encoder, &frame("v", 9, 3, false), 3, &objects, 1).unwrap();
        assert_eq!(prompt.kind, PromptKind::Mask);
        assert_eq!(prompt.frame_idx, 3);
        assert_eq!(prompt.objects.len(), 2);
        assert_eq!(prompt.objects[0].object_id, tracked);
        let fresh = prompt.objects[1].object_id;
        assert_ne!(fresh, tracked);
        assert_eq!(encoder.decode(fresh), 2);
        assert_eq!(encoder.issued(), 3);
        assert_eq!(prompt.objects[1].mask, block(4, 4, 5, 5));
    }

    #[test]
    fn object_ids_are_distinct_and_reset_per_video() {
        let mut ds = InMemoryDataset::new();
        let a = add_video(&mut ds, "a", 0, 4, &[0, 2]);
        let b = add_video(&mut ds, "b", 100, 4, &[0]);
        annotate(&mut ds, 0, 1, &block(0, 0, 1, 1));
        annotate(&mut ds, 0, 1, &block(4, 4, 5, 5));
        annotate(&mut ds, 2, 1, &block(0, 0, 1, 1));
        annotate(&mut ds, 100, 1, &block(0, 0, 1, 1));
        let mut ctx = RunContext::new(ds.num_categories(), CancelToken::new());
        let fixed = PlanMode::FixedLength {
            clip_length: Some(2),
        };

        run(&ds, &mut ctx, &a, fixed).unwrap();
        assert_eq!(ctx.encoder().issued(), 3);
        let ids: Vec<_> = ctx
            .prompt_log()
            .iter()
            .flat_map(|p| p.objects.iter().map(|o| o.object_id))
            .collect();
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), ids.len());

        run(&ds, &mut ctx, &b, fixed).unwrap();
        assert_eq!(ctx.encoder().issued(), 1);
        assert_eq!(ctx.prompt_log().len(), 3);
    }

    #[test]
    fn cancelled_run_stops_before_first_clip() {
        let mut ds = InMemoryDataset::new();
        let frames = add_video(&mut ds, "v", 0, 3, &[0]);
        annotate(&mut ds, 0, 1, &block(0, 0, 1, 1));
        let cancel = CancelToken::new();
        let mut ctx = RunContext::new(1, cancel.clone());
        cancel.cancel();

        let err = run(&ds, &mut ctx, &frames, PlanMode::CategoryGrowth).unwrap_err();
        assert_eq!(
            err.downcast_ref::<PipelineError>(),
            Some(&PipelineError::Cancelled)
        );
        assert!(ctx.prompt_log().is_empty());
    }

    #[test]
    fn single_clip_covers_whole_video() {
        let mut ds = InMemoryDataset::new();
        let frames = add_video(&mut ds, "v", 0, 5, &[3]);
        annotate(&mut ds, 3, 1, &block(2, 2, 3, 3));
        let mut ctx = RunContext::new(1, CancelToken::new());
        let segment = run(
            &ds,
            &mut ctx,
            &frames,
            PlanMode::FixedLength { clip_length: None },
        )
        .unwrap();
        assert_eq!(
            segment.frame_indices().collect::<Vec<_>>(),
            (0..5).collect::<Vec<_>>()
        );
        assert!(segment.clone().restrict(ClipRange::new(0, 1)).len() == 2);
    }
}
