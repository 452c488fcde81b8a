//! In-memory [`AnnotationSource`] backed by ordered maps.

use std::collections::{BTreeMap, HashMap};

use super::AnnotationSource;
use crate::models::{Annotation, CategoryId, Frame};

/// Dataset held entirely in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDataset {
    frames: BTreeMap<String, Vec<Frame>>,
    annotations: HashMap<u64, Vec<Annotation>>,
    categories: BTreeMap<CategoryId, String>,
}

impl InMemoryDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_category(&mut self, id: CategoryId, name: impl Into<String>) {
        self.categories.insert(id, name.into());
    }

    /// Insert a frame, keeping its video's list sorted by `order_in_video`.
    pub fn add_frame(&mut self, frame: Frame) {
        let frames = self.frames.entry(frame.video_id.clone()).or_default();
        let pos = frames.partition_point(|f| f.order_in_video <= frame.order_in_video);
        frames.insert(pos, frame);
    }

    pub fn add_annotation(&mut self, annotation: Annotation) {
        self.annotations
            .entry(annotation.image_id)
            .or_default()
            .push(annotation);
    }

    pub fn categories(&self) -> &BTreeMap<CategoryId, String> {
        &self.categories
    }

    pub fn num_frames(&self) -> usize {
        self.frames.values().map(Vec::len).sum()
    }

    pub fn num_annotations(&self) -> usize {
        self.annotations.values().map(Vec::len).sum()
    }
}

impl AnnotationSource for InMemoryDataset {
    /// The larger of the declared category count and the largest category id
    /// seen, so sparse id schemes still decode correctly.
    fn num_categories(&self) -> u32 {
        let declared = self.categories.len() as u32;
        let max_declared = self.categories.keys().copied().max().unwrap_or(0);
        let max_used = self
            .annotations
            .values()
            .flatten()
            .map(|a| a.category_id)
            .max()
            .unwrap_or(0);
        declared.max(max_declared).max(max_used)
    }

    fn video_ids(&self) -> Vec<String> {
        self.frames.keys().cloned().collect()
    }

    fn frames(&self, video_id: &str) -> Vec<Frame> {
        self.frames.get(video_id).cloned().unwrap_or_default()
    }

    fn annotations(&self, image_id: u64) -> &[Annotation] {
        self.annotations
            .get(&image_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
