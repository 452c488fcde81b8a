//! Fixtures shared by the unit tests of this crate.

use std::path::PathBuf;

use ndarray::Array2;

use crate::dataset::memory::InMemoryDataset;
use crate::dataset::AnnotationSource;
use crate::mask::{Mask, Rle};
use crate::models::{Annotation, CategoryId, Frame};

pub const H: usize = 6;
pub const W: usize = 6;

pub fn frame(video: &str, id: u64, order: usize, is_keyframe: bool) -> Frame {
    Frame {
        id,
        video_id: video.to_string(),
        order_in_video: order,
        path: PathBuf::from(format!("/data/{video}/{order:05}.jpg")),
        is_keyframe,
        width: W as u32,
        height: H as u32,
    }
}

/// Mask with the inclusive block `[r0..=r1] x [c0..=c1]` set.
pub fn block(r0: usize, c0: usize, r1: usize, c1: usize) -> Mask {
    let mut m = Array2::from_elem((H, W), false);
    for r in r0..=r1 {
        for c in c0..=c1 {
            m[[r, c]] = true;
        }
    }
    m
}

pub fn annotate(ds: &mut InMemoryDataset, image_id: u64, category_id: CategoryId, mask: &Mask) {
    let id = ds.num_annotations() as u64 + 1;
    ds.add_annotation(Annotation {
        id,
        image_id,
        category_id,
        segmentation: Rle::encode(mask),
    });
}

/// Add `n` frames of `video` with ids starting at `first_id`; every index in
/// `keyframes` is a keyframe. Returns the frames in order.
pub fn add_video(
    ds: &mut InMemoryDataset,
    video: &str,
    first_id: u64,
    n: usize,
    keyframes: &[usize],
) -> Vec<Frame> {
    for order in 0..n {
        ds.add_frame(frame(
            video,
            first_id + order as u64,
            order,
            keyframes.contains(&order),
        ));
    }
    ds.frames(video)
}
