//! Annotation dataset abstraction.
//!
//! The [`AnnotationSource`] trait is everything the pipeline needs from a
//! COCO-style store: per-video ordered frame lists, per-frame ground-truth
//! annotations and the category count used for identity encoding.
//! [`memory::InMemoryDataset`] is the only implementation; the app crate
//! fills it from a COCO JSON file.

pub mod memory;

use std::collections::BTreeSet;

use crate::models::{Annotation, CategoryId, Frame};

pub trait AnnotationSource {
    /// Category count `n` used by the identity encoder. Every category id in
    /// the dataset is at most `n`.
    fn num_categories(&self) -> u32;

    /// All video ids in ascending order.
    fn video_ids(&self) -> Vec<String>;

    /// Frames of one video sorted by `order_in_video`. Empty for unknown ids.
    fn frames(&self, video_id: &str) -> Vec<Frame>;

    /// Ground-truth annotations of one frame, in dataset order.
    fn annotations(&self, image_id: u64) -> &[Annotation];
}

/// Distinct categories annotated on a frame.
pub fn frame_categories(source: &dyn AnnotationSource, frame: &Frame) -> BTreeSet<CategoryId> {
    source
        .annotations(frame.id)
        .iter()
        .map(|a| a.category_id)
        .collect()
}
