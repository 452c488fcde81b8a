//! Library-level runs over in-memory datasets, with the real stager and the
//! `hold` predictor.

use std::collections::BTreeSet;

use ndarray::Array2;
use tempfile::TempDir;

use vos_harness::output::PromptLogFile;
use vos_harness::pipeline::{assemble_records, run_inference, segment_videos};
use vos_harness::progress::NoProgress;
use vos_harness::staging::SymlinkStager;
use vos_harness_core::cancel::CancelToken;
use vos_harness_core::context::RunContext;
use vos_harness_core::dataset::memory::InMemoryDataset;
use vos_harness_core::dataset::AnnotationSource;
use vos_harness_core::mask::Rle;
use vos_harness_core::models::{Annotation, Frame};
use vos_harness_core::planner::{PlanMode, PlanOptions};
use vos_harness_core::predictor::hold::HoldPredictor;

fn square(r0: usize, c0: usize) -> Rle {
    let mut mask = Array2::from_elem((8, 8), false);
    for r in r0..r0 + 2 {
        for c in c0..c0 + 2 {
            mask[[r, c]] = true;
        }
    }
    Rle::encode(&mask)
}

/// Adds `num_frames` frames for `video` with ids `first_id..`, marking
/// `keyframes` as keyframes.
fn add_video(
    ds: &mut InMemoryDataset,
    dir: &std::path::Path,
    video: &str,
    first_id: u64,
    num_frames: usize,
    keyframes: &[usize],
) {
    for order in 0..num_frames {
        let path = dir.join(format!("{video}_{order}.jpg"));
        std::fs::write(&path, b"").unwrap();
        ds.add_frame(Frame {
            id: first_id + order as u64,
            video_id: video.to_string(),
            order_in_video: order,
            path,
            is_keyframe: keyframes.contains(&order),
            width: 8,
            height: 8,
        });
    }
}

fn annotate(ds: &mut InMemoryDataset, id: u64, image_id: u64, category_id: u32, rle: Rle) {
    ds.add_annotation(Annotation {
        id,
        image_id,
        category_id,
        segmentation: rle,
    });
}

fn fixed(clip_length: usize) -> PlanOptions {
    PlanOptions {
        mode: PlanMode::FixedLength {
            clip_length: Some(clip_length),
        },
        ..PlanOptions::default()
    }
}

#[test]
fn skipped_clip_yields_no_records() {
    let tmp = TempDir::new().unwrap();
    let mut ds = InMemoryDataset::new();
    ds.add_category(1, "grasper");
    // Video "1": six frames, one annotated keyframe at frame 1.
    add_video(&mut ds, tmp.path(), "1", 100, 6, &[1, 4]);
    annotate(&mut ds, 1, 101, 1, square(2, 2));
    // Video "2": three frames, annotated keyframe at frame 0.
    add_video(&mut ds, tmp.path(), "2", 200, 3, &[0]);
    annotate(&mut ds, 2, 200, 1, square(4, 4));

    let mut predictor = HoldPredictor::default();
    let stager = SymlinkStager::in_dir(tmp.path());
    let mut ctx = RunContext::new(ds.num_categories(), CancelToken::new());
    let segments = segment_videos(
        &ds,
        &mut predictor,
        &stager,
        fixed(3),
        &mut ctx,
        0,
        &NoProgress,
    )
    .unwrap();

    let video_1 = &segments["1"];
    assert_eq!(video_1.frame_indices().collect::<Vec<_>>(), vec![0, 1, 2]);
    assert_eq!(ctx.prompt_log().len(), 2);
    assert_eq!(ctx.prompt_log()[0].frame_idx, 1);
    assert_eq!(predictor.states_opened(), 2);
    assert_eq!(predictor.releases(), predictor.states_opened());

    let records = assemble_records(&ds, &segments, None).unwrap();
    let image_ids: Vec<u64> = records.iter().map(|r| r.image_id).collect();
    assert_eq!(image_ids, vec![101, 200]);
    assert!(records.iter().all(|r| r.category_id == 1));
    assert!(!image_ids.iter().any(|id| (103..=105).contains(id)));
}

#[test]
fn category_growth_tiles_and_carries() {
    let tmp = TempDir::new().unwrap();
    let mut ds = InMemoryDataset::new();
    ds.add_category(1, "grasper");
    ds.add_category(2, "hook");
    add_video(&mut ds, tmp.path(), "g", 10, 8, &[0, 3, 6]);
    annotate(&mut ds, 1, 10, 1, square(0, 0));
    annotate(&mut ds, 2, 13, 1, square(0, 0));
    annotate(&mut ds, 3, 13, 2, square(5, 5));
    // Frame 6 brings no new category, so it does not open a clip.
    annotate(&mut ds, 4, 16, 2, square(5, 5));

    let mut predictor = HoldPredictor::default();
    let mut ctx = RunContext::new(ds.num_categories(), CancelToken::new());
    let options = PlanOptions {
        mode: PlanMode::CategoryGrowth,
        ..PlanOptions::default()
    };
    let segments = segment_videos(
        &ds,
        &mut predictor,
        &SymlinkStager::in_dir(tmp.path()),
        options,
        &mut ctx,
        0,
        &NoProgress,
    )
    .unwrap();

    let video = &segments["g"];
    assert_eq!(video.frame_indices().collect::<Vec<_>>(), (0..8).collect::<Vec<_>>());
    assert_eq!(predictor.states_opened(), 2);

    // Ground truth at 0, then ground truth and the carried mask at 3.
    let frames: Vec<usize> = ctx.prompt_log().iter().map(|p| p.frame_idx).collect();
    assert_eq!(frames, vec![0, 3, 3]);

    let records = assemble_records(&ds, &segments, None).unwrap();
    let at_3: BTreeSet<u32> = records
        .iter()
        .filter(|r| r.image_id == 13)
        .map(|r| r.category_id)
        .collect();
    assert_eq!(at_3, BTreeSet::from([1, 2]));
    assert!(records.iter().any(|r| r.image_id == 16 && r.category_id == 2));
}

#[test]
fn run_inference_writes_artifacts() {
    let tmp = TempDir::new().unwrap();
    let frames = tmp.path().join("frames");
    std::fs::create_dir_all(&frames).unwrap();
    for order in 0..4 {
        std::fs::write(frames.join(format!("{order}.jpg")), b"").unwrap();
    }
    let images: Vec<_> = (0..4u64)
        .map(|order| {
            serde_json::json!({
                "id": order + 1,
                "video_id": 7,
                "order_in_video": order,
                "is_det_keyframe": order == 2,
                "file_name": format!("frames/{order}.jpg"),
                "width": 8,
                "height": 8
            })
        })
        .collect();
    let coco = serde_json::json!({
        "images": images,
        "annotations": [{"id": 1, "image_id": 3, "category_id": 4, "segmentation": square(3, 3)}],
        "categories": [{"id": 4, "name": "clipper"}]
    });
    let coco_path = tmp.path().join("coco.json");
    std::fs::write(&coco_path, coco.to_string()).unwrap();

    let config: vos_harness::config::Config = toml::from_str(&format!(
        r#"
[dataset]
path = "{}"

[output]
root = "{}"

[inference]
prompt_kind = "mask"
"#,
        coco_path.display(),
        tmp.path().join("runs").display()
    ))
    .unwrap();

    let summary = run_inference(&config, &NoProgress, CancelToken::new()).unwrap();
    assert_eq!(summary.videos, 1);
    assert_eq!(summary.frames_predicted, 4);
    assert_eq!(summary.records, 1);
    assert_eq!(
        summary.paths.predictions,
        tmp.path().join("runs/output/mask/predict.json")
    );

    let log: PromptLogFile =
        serde_json::from_str(&std::fs::read_to_string(&summary.paths.prompts).unwrap()).unwrap();
    assert_eq!(log.run.run_id, summary.run_id);
    assert_eq!(log.run.predictor, "hold");
    assert_eq!(log.prompts.len(), 1);
    assert_eq!(log.prompts[0].video_id, "7");
    assert_eq!(log.prompts[0].objects[0].category_id, 4);
    assert_eq!(log.prompts[0].path, tmp.path().join("frames/2.jpg"));
}

#[test]
fn cancelled_run_writes_nothing() {
    let tmp = TempDir::new().unwrap();
    let coco_path = tmp.path().join("coco.json");
    std::fs::write(
        &coco_path,
        r#"{"images": [{"id": 1, "video_id": 1, "order_in_video": 0, "path": "/f.jpg"}]}"#,
    )
    .unwrap();
    let config: vos_harness::config::Config = toml::from_str(&format!(
        "[dataset]\npath = \"{}\"\n[output]\nroot = \"{}\"\n",
        coco_path.display(),
        tmp.path().join("runs").display()
    ))
    .unwrap();

    let cancel = CancelToken::new();
    cancel.cancel();
    assert!(run_inference(&config, &NoProgress, cancel).is_err());
    assert!(!tmp.path().join("runs").exists());
}
