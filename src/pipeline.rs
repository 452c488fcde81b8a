//! Dataset-level orchestration.
//!
//! Coordinates a full run: COCO dataset → per-video segmentation → record
//! assembly → artifacts. Videos are processed one after another in
//! ascending id order and all of them are segmented; the `videos` subset
//! only selects which ones are written.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::Utc;
use uuid::Uuid;

use vos_harness_core::cancel::CancelToken;
use vos_harness_core::context::RunContext;
use vos_harness_core::dataset::AnnotationSource;
use vos_harness_core::identity::ObjectIdEncoder;
use vos_harness_core::models::{AnnotationRecord, VideoSegment};
use vos_harness_core::planner::{ClipPlan, ClipPlanner, PlanOptions};
use vos_harness_core::predictor::{FrameStager, VideoPredictor};
use vos_harness_core::reassemble::reassemble;
use vos_harness_core::video::VideoOrchestrator;

use crate::coco::load_coco;
use crate::config::Config;
use crate::output::{write_predictions, write_prompt_log, OutputPaths, RunInfo};
use crate::predictor::{below_memory_floor, build_predictor};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::staging::make_stager;

/// Sort video ids ascending: numerically when every id is a number (COCO
/// exports stringified here), lexicographically otherwise.
pub fn sort_video_ids(ids: &mut [String]) {
    if ids.iter().all(|id| id.parse::<u64>().is_ok()) {
        ids.sort_by_cached_key(|id| id.parse::<u64>().ok());
    } else {
        ids.sort();
    }
}

/// Segment every video of `source`, keyed by video id.
pub fn segment_videos(
    source: &dyn AnnotationSource,
    predictor: &mut dyn VideoPredictor,
    stager: &dyn FrameStager,
    options: PlanOptions,
    ctx: &mut RunContext,
    memory_floor_mb: u64,
    progress: &dyn ProgressReporter,
) -> Result<BTreeMap<String, VideoSegment>> {
    let mut video_ids = source.video_ids();
    sort_video_ids(&mut video_ids);
    let total = video_ids.len() as u64;

    let mut segments = BTreeMap::new();
    for (n, video_id) in video_ids.into_iter().enumerate() {
        ctx.cancel_token().check()?;
        progress.report(ProgressEvent::Segmenting {
            video_id: video_id.clone(),
            n: n as u64 + 1,
            total,
        });

        let frames = source.frames(&video_id);
        let segment = VideoOrchestrator::new(source, &mut *predictor, stager, options)
            .run(ctx, &frames)
            .with_context(|| format!("Failed to segment video {}", video_id))?;

        if below_memory_floor(predictor.memory_info(), memory_floor_mb) {
            tracing::warn!(
                video_id = %video_id,
                floor_mb = memory_floor_mb,
                "predictor free memory is below the configured floor"
            );
        }
        segments.insert(video_id, segment);
    }
    Ok(segments)
}

/// Records for the selected videos (all when `videos` is `None`), in
/// ascending video id order.
pub fn assemble_records(
    source: &dyn AnnotationSource,
    segments: &BTreeMap<String, VideoSegment>,
    videos: Option<&[String]>,
) -> Result<Vec<AnnotationRecord>> {
    if let Some(selected) = videos {
        for video_id in selected {
            if !segments.contains_key(video_id) {
                tracing::warn!(video_id = %video_id, "selected video is not in the dataset");
            }
        }
    }

    let mut video_ids: Vec<String> = segments.keys().cloned().collect();
    sort_video_ids(&mut video_ids);

    let mut records = Vec::new();
    for video_id in &video_ids {
        if videos.is_some_and(|selected| !selected.contains(video_id)) {
            continue;
        }
        let segment = &segments[video_id];
        let frames = source.frames(video_id);
        records.extend(
            reassemble(&frames, segment, source.num_categories())
                .with_context(|| format!("Failed to assemble records for video {}", video_id))?,
        );
    }
    Ok(records)
}

/// Clip plans of one video, for inspection without running a predictor.
#[derive(Debug, Clone)]
pub struct VideoPlan {
    pub video_id: String,
    pub num_frames: usize,
    pub clips: Vec<ClipPlan>,
}

pub fn plan_videos(
    source: &dyn AnnotationSource,
    options: PlanOptions,
    videos: Option<&[String]>,
) -> Result<Vec<VideoPlan>> {
    let encoder = ObjectIdEncoder::new(source.num_categories());
    let planner = ClipPlanner::new(source, &encoder, options);

    let mut video_ids = source.video_ids();
    sort_video_ids(&mut video_ids);

    let mut out = Vec::new();
    for video_id in video_ids {
        if videos.is_some_and(|v| !v.contains(&video_id)) {
            continue;
        }
        encoder.reset();
        let frames = source.frames(&video_id);
        let clips = planner
            .plan(&frames)
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("Failed to plan video {}", video_id))?;
        out.push(VideoPlan {
            num_frames: frames.len(),
            video_id,
            clips,
        });
    }
    Ok(out)
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub videos: usize,
    pub frames_predicted: usize,
    pub prompts: usize,
    pub records: usize,
    pub paths: OutputPaths,
}

/// Full run driven by `config`: load, segment, assemble, write.
pub fn run_inference(
    config: &Config,
    progress: &dyn ProgressReporter,
    cancel: CancelToken,
) -> Result<RunSummary> {
    let run_id = Uuid::new_v4();
    let created_at = Utc::now();
    let options = config.inference.plan_options();
    tracing::info!(
        run_id = %run_id,
        prompt_kind = %options.prompt_kind,
        mode = ?options.mode,
        "starting run"
    );

    let coco = load_coco(&config.dataset.path)?;
    let source = &coco.dataset;
    if coco.skipped_annotations > 0 {
        tracing::warn!(
            skipped = coco.skipped_annotations,
            "annotations without RLE segmentation were ignored"
        );
    }

    let mut predictor = build_predictor(&config.predictor)?;
    let stager = make_stager(config.staging.mode);
    let mut ctx = RunContext::new(source.num_categories(), cancel);

    let segments = segment_videos(
        source,
        predictor.as_mut(),
        stager.as_ref(),
        options,
        &mut ctx,
        config.predictor.min_free_memory_mb,
        progress,
    )?;

    let selected = config.inference.videos.as_deref();
    progress.report(ProgressEvent::Assembling {
        videos: selected.map_or(segments.len(), <[String]>::len) as u64,
    });
    let records = assemble_records(source, &segments, selected)?;

    let paths = OutputPaths::new(&config.output.root, config.inference.prompt_kind);
    paths.create_dir()?;
    write_predictions(&paths.predictions, &records)?;
    write_prompt_log(
        &paths.prompts,
        RunInfo {
            run_id,
            created_at,
            dataset_path: coco.path.clone(),
            dataset_sha256: coco.sha256.clone(),
            prompt_kind: config.inference.prompt_kind,
            clip_length: config.inference.clip_length,
            category_growth: config.inference.category_growth,
            predictor: predictor.name().to_string(),
        },
        ctx.prompt_log(),
        source.num_categories(),
    )?;

    Ok(RunSummary {
        run_id,
        videos: segments.len(),
        frames_predicted: segments.values().map(VideoSegment::len).sum(),
        prompts: ctx.prompt_log().len(),
        records: records.len(),
        paths,
    })
}
