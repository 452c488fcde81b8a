//! Typed pipeline invariant violations.
//!
//! Most fallible operations return [`anyhow::Result`]. The variants here are
//! raised for conditions that indicate a broken invariant rather than bad
//! input, so callers and tests can recover them with
//! `err.downcast_ref::<PipelineError>()`.

use crate::models::{CategoryId, ClipRange, ObjectId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("clip {range} does not continue coverage at frame {expected_start}")]
    CoverageGap {
        range: ClipRange,
        expected_start: usize,
    },

    #[error("clip plan ends at frame {covered} but video has {num_frames} frames")]
    IncompleteCoverage { covered: usize, num_frames: usize },

    #[error("frame {frame_idx} was produced by more than one clip")]
    ClipOverlap { frame_idx: usize },

    #[error("object id {object_id} issued twice")]
    ObjectIdCollision { object_id: ObjectId },

    #[error("category {category_id} exceeds the category count {num_categories}")]
    CategoryOutOfRange {
        category_id: CategoryId,
        num_categories: u32,
    },

    #[error("prompt anchored at frame {frame_idx} lies outside clip {window}")]
    PromptOutsideClip { frame_idx: usize, window: ClipRange },

    #[error("run cancelled")]
    Cancelled,
}
