//! # VOS Harness CLI (`vos`)
//!
//! ## Usage
//!
//! ```bash
//! vos --config ./config/vos.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `vos run` | Segment every video and write `predict.json` and `prompts.json` |
//! | `vos plan` | Print the clip plan of each video without running a predictor |
//!
//! ## Examples
//!
//! ```bash
//! # Fixed 50-frame clips seeded with boxes
//! vos run --prompt-kind bbox --clip-length 50
//!
//! # New clip whenever a keyframe introduces a new category
//! vos run --category-growth
//!
//! # Inspect how two videos would be split
//! vos plan --clip-length 30 --video 12 --video 40
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vos_harness::coco::load_coco;
use vos_harness::config::{self, Config};
use vos_harness::pipeline::{plan_videos, run_inference};
use vos_harness::progress::ProgressMode;
use vos_harness_core::cancel::CancelToken;
use vos_harness_core::models::PromptKind;

/// VOS Harness CLI: clip-based video object segmentation inference.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Inference flags override the matching `[inference]` keys.
#[derive(Parser)]
#[command(
    name = "vos",
    about = "VOS Harness: clip-based video object segmentation inference over COCO video datasets",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/vos.toml")]
    config: PathBuf,

    /// Write logs to stderr as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment every video and write the prediction and prompt files.
    Run {
        #[command(flatten)]
        inference: InferenceArgs,

        /// Override `[output].root`.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Progress on stderr. Defaults to `human` on a terminal, else `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Print clip ranges, windows and prompt frames without running a
    /// predictor.
    Plan {
        #[command(flatten)]
        inference: InferenceArgs,
    },
}

#[derive(Args)]
struct InferenceArgs {
    /// Prompt kind: `points`, `bbox` or `mask`.
    #[arg(long)]
    prompt_kind: Option<PromptKind>,

    /// Frames per clip. Without it each video is one clip.
    #[arg(long)]
    clip_length: Option<usize>,

    /// Open a new clip whenever a keyframe introduces an unseen category.
    #[arg(long)]
    category_growth: bool,

    /// Use fixed-length clips even when the config enables category growth.
    #[arg(long, conflicts_with = "category_growth")]
    no_category_growth: bool,

    /// Restrict output (or planning) to this video id. Repeatable.
    #[arg(long = "video")]
    videos: Vec<String>,
}

impl InferenceArgs {
    fn apply(self, cfg: &mut Config) -> anyhow::Result<()> {
        if let Some(kind) = self.prompt_kind {
            cfg.inference.prompt_kind = kind;
        }
        if self.clip_length.is_some() {
            cfg.inference.clip_length = self.clip_length;
        }
        if self.category_growth {
            cfg.inference.category_growth = true;
        }
        if self.no_category_growth {
            cfg.inference.category_growth = false;
        }
        if !self.videos.is_empty() {
            cfg.inference.videos = Some(self.videos);
        }
        config::validate(cfg)
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "vos_harness=info,vos_harness_core=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Run {
            inference,
            output,
            progress,
        } => {
            inference.apply(&mut cfg)?;
            if let Some(root) = output {
                cfg.output.root = root;
            }
            let reporter = progress
                .unwrap_or_else(ProgressMode::default_for_tty)
                .reporter();

            let summary = run_inference(&cfg, reporter.as_ref(), CancelToken::new())?;
            println!("run {}", summary.run_id);
            println!("  videos: {}", summary.videos);
            println!("  frames predicted: {}", summary.frames_predicted);
            println!("  prompt batches: {}", summary.prompts);
            println!("  records: {}", summary.records);
            println!("  predictions: {}", summary.paths.predictions.display());
            println!("  prompt log: {}", summary.paths.prompts.display());
            println!("ok");
        }
        Commands::Plan { inference } => {
            inference.apply(&mut cfg)?;
            let coco = load_coco(&cfg.dataset.path)?;
            let plans = plan_videos(
                &coco.dataset,
                cfg.inference.plan_options(),
                cfg.inference.videos.as_deref(),
            )?;
            for video in plans {
                println!("video {}  frames {}", video.video_id, video.num_frames);
                for clip in &video.clips {
                    if clip.is_skipped() {
                        println!("  clip {}  skipped", clip.range);
                        continue;
                    }
                    let prompt = &clip.prompts[0];
                    println!(
                        "  clip {}  window {}  prompt frame {}  objects {}  kind {}",
                        clip.range,
                        clip.window,
                        prompt.frame_idx,
                        prompt.objects.len(),
                        prompt.kind
                    );
                }
            }
        }
    }

    Ok(())
}
