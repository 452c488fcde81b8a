//! # VOS Harness Core
//!
//! Pipeline logic for clip-based video object segmentation: data models,
//! COCO RLE, mask geometry, object identity encoding, clip planning, the
//! predictor and stager traits, per-clip processing, per-video
//! orchestration and mask reassembly.
//!
//! This crate performs no filesystem or process I/O of its own. Dataset
//! loading, frame staging on disk, output serialization and the CLI live in
//! the `vos-harness` app crate.

pub mod cancel;
pub mod context;
pub mod dataset;
pub mod error;
pub mod geometry;
pub mod identity;
pub mod mask;
pub mod models;
pub mod planner;
pub mod predictor;
pub mod processor;
pub mod reassemble;
pub mod video;

#[cfg(test)]
pub(crate) mod testutil;
