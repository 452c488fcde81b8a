//! Baseline predictor that holds every seed mask constant over time.
//!
//! Points become discs of `point_radius` pixels, boxes become filled
//! rectangles, and mask prompts are taken as-is. Propagation repeats each
//! object's seed on every visited frame with logits of `±logit_scale`. It
//! needs no model weights, which makes it the backend for dry runs and
//! tests of the surrounding pipeline.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use ndarray::Array2;

use super::{
    FrameStream, InferenceState, ObjectLogits, PropagatedFrame, PropagationDirection, SeedPrompt,
    StagedClip, VideoPredictor,
};
use crate::geometry::BBox;
use crate::mask::{LogitMap, Mask};
use crate::models::{ObjectId, Point};

#[derive(Debug, Clone)]
pub struct HoldPredictor {
    logit_scale: f32,
    point_radius: usize,
    states_opened: usize,
    releases: usize,
}

impl Default for HoldPredictor {
    fn default() -> Self {
        Self::new(10.0, 2)
    }
}

impl HoldPredictor {
    pub fn new(logit_scale: f32, point_radius: usize) -> Self {
        Self {
            logit_scale,
            point_radius,
            states_opened: 0,
            releases: 0,
        }
    }

    pub fn states_opened(&self) -> usize {
        self.states_opened
    }

    pub fn releases(&self) -> usize {
        self.releases
    }
}

impl VideoPredictor for HoldPredictor {
    fn name(&self) -> &str {
        "hold"
    }

    fn init_state(&mut self, clip: &StagedClip) -> Result<Box<dyn InferenceState + '_>> {
        if clip.is_empty() {
            bail!("cannot open inference state over an empty clip");
        }
        self.states_opened += 1;
        Ok(Box::new(HoldState {
            num_frames: clip.len(),
            height: clip.height as usize,
            width: clip.width as usize,
            logit_scale: self.logit_scale,
            point_radius: self.point_radius,
            seeds: BTreeMap::new(),
        }))
    }

    fn release_memory(&mut self) {
        self.releases += 1;
    }
}

struct HoldState {
    num_frames: usize,
    height: usize,
    width: usize,
    logit_scale: f32,
    point_radius: usize,
    /// Object id → (seed frame, seed mask). A later prompt replaces the seed.
    seeds: BTreeMap<ObjectId, (usize, Mask)>,
}

impl HoldState {
    fn check_frame(&self, frame_idx: usize) -> Result<()> {
        if frame_idx >= self.num_frames {
            bail!(
                "frame {} is outside the {}-frame clip",
                frame_idx,
                self.num_frames
            );
        }
        Ok(())
    }

    fn check_size(&self) -> Result<()> {
        if self.height == 0 || self.width == 0 {
            bail!("clip frame size is unknown; point and box prompts need it");
        }
        Ok(())
    }

    fn logits(&self, mask: &Mask) -> LogitMap {
        let scale = self.logit_scale;
        mask.mapv(|px| if px { scale } else { -scale })
    }

    fn seed(&mut self, frame_idx: usize, object_id: ObjectId, mask: Mask) -> Vec<ObjectLogits> {
        self.seeds.insert(object_id, (frame_idx, mask));
        self.seeds
            .iter()
            .filter(|(_, (f, _))| *f == frame_idx)
            .map(|(&object_id, (_, m))| ObjectLogits {
                object_id,
                logits: self.logits(m),
            })
            .collect()
    }

    fn rasterize_points(&self, points: &[Point], labels: &[i32]) -> Mask {
        let mut mask = Array2::from_elem((self.height, self.width), false);
        let r = self.point_radius as f32;
        for (i, p) in points.iter().enumerate() {
            let fg = labels.get(i).copied().unwrap_or(1) != 0;
            for ((y, x), px) in mask.indexed_iter_mut() {
                let (dx, dy) = (x as f32 - p.x, y as f32 - p.y);
                if dx * dx + dy * dy <= r * r {
                    *px = fg;
                }
            }
        }
        mask
    }

    fn rasterize_box(&self, bbox: &BBox) -> Mask {
        Array2::from_shape_fn((self.height, self.width), |(y, x)| {
            let (x, y) = (x as f32, y as f32);
            x >= bbox.x0 && x < bbox.x1 && y >= bbox.y0 && y < bbox.y1
        })
    }
}

impl InferenceState for HoldState {
    fn add_points_or_box(
        &mut self,
        frame_idx: usize,
        object_id: ObjectId,
        prompt: SeedPrompt,
    ) -> Result<Vec<ObjectLogits>> {
        self.check_frame(frame_idx)?;
        self.check_size()?;
        let mask = match &prompt {
            SeedPrompt::Points { points, labels } => self.rasterize_points(points, labels),
            SeedPrompt::Box(bbox) => self.rasterize_box(bbox),
        };
        Ok(self.seed(frame_idx, object_id, mask))
    }

    fn add_mask(
        &mut self,
        frame_idx: usize,
        object_id: ObjectId,
        mask: &Mask,
    ) -> Result<Vec<ObjectLogits>> {
        self.check_frame(frame_idx)?;
        if self.height > 0 && mask.dim() != (self.height, self.width) {
            bail!(
                "mask prompt is {:?}, clip frames are {}x{}",
                mask.dim(),
                self.height,
                self.width
            );
        }
        Ok(self.seed(frame_idx, object_id, mask.clone()))
    }

    fn propagate(&mut self, direction: PropagationDirection) -> Result<FrameStream<'_>> {
        let seed_frames = self.seeds.values().map(|(f, _)| *f);
        let frames: Vec<usize> = match direction {
            PropagationDirection::Reverse => match seed_frames.max() {
                Some(anchor) => (0..=anchor).rev().collect(),
                None => bail!("propagate called before any prompt was added"),
            },
            PropagationDirection::Forward => match seed_frames.min() {
                Some(anchor) => (anchor..self.num_frames).collect(),
                None => bail!("propagate called before any prompt was added"),
            },
        };
        let objects: Vec<ObjectLogits> = self
            .seeds
            .iter()
            .map(|(&object_id, (_, m))| ObjectLogits {
                object_id,
                logits: self.logits(m),
            })
            .collect();
        Ok(Box::new(frames.into_iter().map(move |frame_idx| {
            Ok(PropagatedFrame {
                frame_idx,
                objects: objects.clone(),
            })
        })))
    }
}
