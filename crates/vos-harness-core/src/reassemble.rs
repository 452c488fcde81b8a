//! Folding per-instance predictions back into per-category annotations.

use std::collections::BTreeMap;

use anyhow::{bail, Result};

use crate::geometry::mask_to_bbox;
use crate::identity::decode_category;
use crate::mask::{Mask, Rle};
use crate::models::{AnnotationRecord, CategoryId, Frame, VideoSegment};

/// One record per (keyframe, category) with a non-empty union mask.
///
/// Instances are merged in ascending object id order. The record's score
/// is the score of the last instance merged into the category. Records
/// come out in frame order, then ascending category id.
pub fn reassemble(
    frames: &[Frame],
    segment: &VideoSegment,
    num_categories: u32,
) -> Result<Vec<AnnotationRecord>> {
    let mut records = Vec::new();
    for (idx, frame) in frames.iter().enumerate() {
        if !frame.is_keyframe {
            continue;
        }
        let Some(objects) = segment.frame(idx) else {
            continue;
        };

        let mut unions: BTreeMap<CategoryId, (Mask, f32)> = BTreeMap::new();
        for (&object_id, prediction) in objects {
            let category_id = decode_category(object_id, num_categories);
            match unions.get_mut(&category_id) {
                Some((union, score)) => {
                    if union.dim() != prediction.mask.dim() {
                        bail!(
                            "object {} on image {} has mask shape {:?}, expected {:?}",
                            object_id,
                            frame.id,
                            prediction.mask.dim(),
                            union.dim()
                        );
                    }
                    *union |= &prediction.mask;
                    *score = prediction.score;
                }
                None => {
                    unions.insert(category_id, (prediction.mask.clone(), prediction.score));
                }
            }
        }

        for (category_id, (union, score)) in unions {
            let Some(bbox) = mask_to_bbox(&union) else {
                continue;
            };
            records.push(AnnotationRecord {
                image_id: frame.id,
                category_id,
                segmentation: Rle::encode(&union),
                bbox: bbox.to_xywh(),
                iscrowd: 0,
                score,
            });
        }
    }
    Ok(records)
}
