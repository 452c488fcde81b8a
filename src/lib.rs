//! # VOS Harness
//!
//! Clip-based video object segmentation inference over COCO video datasets.
//!
//! Each video is split into clips, every clip is seeded with object prompts
//! from ground truth (or, in category-growth mode, from the previous clip's
//! boundary prediction), a video predictor propagates the prompts over the
//! clip in both directions, and the per-object masks on keyframes are folded
//! into one COCO prediction per (frame, category).
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────────┐   ┌────────────┐
//! │ COCO file  │──▶│ Clip planner │──▶│ Clip process │──▶│ Reassemble │
//! │ (coco.rs)  │   │  per video   │   │  predictor   │   │  records   │
//! └────────────┘   └──────────────┘   └──────────────┘   └─────┬──────┘
//!                                                              ▼
//!                                          predict.json + prompts.json
//! ```
//!
//! The pipeline logic lives in [`vos_harness_core`]; this crate adds the
//! file formats, frame staging, backend selection and the `vos` CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`coco`] | COCO video dataset reader |
//! | [`staging`] | Symlinked clip directories |
//! | [`predictor`] | Predictor backend selection |
//! | [`pipeline`] | Dataset-level orchestration |
//! | [`output`] | Prediction and prompt log writers |
//! | [`progress`] | Progress reporting on stderr |

pub mod coco;
pub mod config;
pub mod output;
pub mod pipeline;
pub mod predictor;
pub mod progress;
pub mod staging;
