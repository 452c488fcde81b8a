use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn vos_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("vos");
    path
}

/// One video of six 4x4 frames. Frame 1 is an annotated keyframe holding a
/// 2x2 grasper; frame 4 is a keyframe without annotations.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let frames_dir = root.join("frames");
    fs::create_dir_all(&frames_dir).unwrap();
    let mut images = Vec::new();
    for order in 0..6u64 {
        let name = format!("{order:03}.jpg");
        fs::write(frames_dir.join(&name), b"").unwrap();
        images.push(serde_json::json!({
            "id": 100 + order,
            "video_id": 1,
            "order_in_video": order,
            "is_det_keyframe": order == 1 || order == 4,
            "file_name": format!("frames/{name}"),
            "width": 4,
            "height": 4
        }));
    }
    let coco = serde_json::json!({
        "images": images,
        "annotations": [{
            "id": 1,
            "image_id": 101,
            "category_id": 1,
            "segmentation": {"size": [4, 4], "counts": [5, 2, 2, 2, 5]}
        }],
        "categories": [{"id": 1, "name": "grasper"}]
    });
    fs::write(root.join("coco.json"), coco.to_string()).unwrap();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_content = format!(
        r#"[dataset]
path = "{root}/coco.json"

[output]
root = "{root}/runs"

[inference]
prompt_kind = "points"
clip_length = 3

[staging]
mode = "symlink"
"#,
        root = root.display()
    );
    let config_path = config_dir.join("vos.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_vos(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = vos_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run vos binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_run_writes_predictions_and_prompt_log() {
    let (tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_vos(&config, &["run", "--progress", "off"]);
    assert!(success, "run failed: {}", stderr);
    assert!(stdout.contains("ok"));
    assert!(stdout.contains("records: 1"));

    let out_dir = tmp.path().join("runs/output/points");
    let predictions: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out_dir.join("predict.json")).unwrap()).unwrap();
    let records = predictions.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["image_id"], 101);
    assert_eq!(records[0]["category_id"], 1);
    assert_eq!(records[0]["iscrowd"], 0);
    assert!(records[0]["score"].as_f64().unwrap() > 0.9);

    let prompts: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out_dir.join("prompts.json")).unwrap()).unwrap();
    assert!(prompts["run_id"].is_string());
    assert_eq!(prompts["predictor"], "hold");
    let batches = prompts["prompts"].as_array().unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0]["frame_idx"], 1);
    assert_eq!(batches[0]["kind"], "points");
    assert_eq!(batches[0]["objects"][0]["category_id"], 1);
}

#[test]
fn test_prompt_kind_flag_selects_output_dir() {
    let (tmp, config) = setup_test_env();
    let (_, stderr, success) = run_vos(
        &config,
        &["run", "--progress", "off", "--prompt-kind", "bbox"],
    );
    assert!(success, "run failed: {}", stderr);
    assert!(tmp.path().join("runs/output/bbox/predict.json").exists());
    assert!(!tmp.path().join("runs/output/points").exists());
}

#[test]
fn test_plan_prints_clips() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_vos(&config, &["plan"]);
    assert!(success, "plan failed: {}", stderr);
    assert!(stdout.contains("video 1  frames 6"));
    assert!(stdout.contains("clip [0, 2]  window [0, 2]  prompt frame 1  objects 1"));
    assert!(stdout.contains("clip [3, 5]  skipped"));
}

#[test]
fn test_plan_category_growth_single_clip() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, success) = run_vos(&config, &["plan", "--category-growth"]);
    assert!(success);
    assert!(stdout.contains("clip [0, 5]  window [0, 5]  prompt frame 1"));
}

#[test]
fn test_no_category_growth_overrides_config() {
    let (_tmp, config) = setup_test_env();
    let content = fs::read_to_string(&config).unwrap();
    fs::write(
        &config,
        content.replace("clip_length = 3", "clip_length = 3\ncategory_growth = true"),
    )
    .unwrap();

    let (stdout, _, success) = run_vos(&config, &["plan"]);
    assert!(success);
    assert!(stdout.contains("clip [0, 5]  window [0, 5]"));

    let (stdout, stderr, success) = run_vos(&config, &["plan", "--no-category-growth"]);
    assert!(success, "plan failed: {}", stderr);
    assert!(stdout.contains("clip [0, 2]  window [0, 2]  prompt frame 1"));
    assert!(stdout.contains("clip [3, 5]  skipped"));

    let (_, _, success) = run_vos(
        &config,
        &["plan", "--category-growth", "--no-category-growth"],
    );
    assert!(!success);
}

#[test]
fn test_zero_clip_length_rejected() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, success) = run_vos(&config, &["run", "--clip-length", "0"]);
    assert!(!success);
    assert!(stderr.contains("clip_length must be > 0"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_vos(&tmp.path().join("nope.toml"), &["run"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_missing_dataset_fails() {
    let (tmp, config) = setup_test_env();
    fs::remove_file(tmp.path().join("coco.json")).unwrap();
    let (_, _, success) = run_vos(&config, &["run", "--progress", "off"]);
    assert!(!success);
    assert!(!tmp.path().join("runs/output/points/predict.json").exists());
}
