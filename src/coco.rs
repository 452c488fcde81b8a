//! COCO video dataset reader.
//!
//! Reads a COCO annotation file whose images carry video metadata
//! (`video_id`, `order_in_video`, `is_det_keyframe`) into an
//! [`InMemoryDataset`]. Only RLE segmentations are supported; polygon
//! annotations are skipped with a warning.
//!
//! Relative image paths are resolved against the annotation file's
//! directory.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use sha2::{Digest, Sha256};

use vos_harness_core::dataset::memory::InMemoryDataset;
use vos_harness_core::dataset::AnnotationSource;
use vos_harness_core::mask::Rle;
use vos_harness_core::models::{Annotation, CategoryId, Frame};

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("image {0} appears more than once")]
    DuplicateImage(u64),

    #[error("image {0} has neither `path` nor `file_name`")]
    MissingPath(u64),

    #[error("annotation {annotation} refers to unknown image {image}")]
    UnknownImage { annotation: u64, image: u64 },

    #[error("annotation {annotation} is {actual:?} but image {image} is {expected:?}")]
    SizeMismatch {
        annotation: u64,
        image: u64,
        expected: [usize; 2],
        actual: [usize; 2],
    },
}

#[derive(Deserialize)]
struct CocoFile {
    images: Vec<CocoImage>,
    #[serde(default)]
    annotations: Vec<CocoAnnotation>,
    #[serde(default)]
    categories: Vec<CocoCategory>,
}

#[derive(Deserialize)]
struct CocoImage {
    id: u64,
    video_id: VideoId,
    order_in_video: usize,
    #[serde(default, deserialize_with = "flag")]
    is_det_keyframe: bool,
    #[serde(default)]
    path: Option<PathBuf>,
    #[serde(default)]
    file_name: Option<PathBuf>,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}

/// Video ids are numbers in some exports and strings in others.
#[derive(Deserialize)]
#[serde(untagged)]
enum VideoId {
    Number(u64),
    Text(String),
}

impl VideoId {
    fn into_string(self) -> String {
        match self {
            VideoId::Number(n) => n.to_string(),
            VideoId::Text(s) => s,
        }
    }
}

#[derive(Deserialize)]
struct CocoAnnotation {
    #[serde(default)]
    id: u64,
    image_id: u64,
    category_id: CategoryId,
    segmentation: Segmentation,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Segmentation {
    Rle(Rle),
    Polygon(serde_json::Value),
}

#[derive(Deserialize)]
struct CocoCategory {
    id: CategoryId,
    #[serde(default)]
    name: String,
}

/// Keyframe flags come as booleans or as 0/1.
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }
    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
    })
}

/// A loaded dataset and the fingerprint of the file it came from.
#[derive(Debug)]
pub struct CocoDataset {
    pub dataset: InMemoryDataset,
    pub path: PathBuf,
    /// Hex SHA-256 of the annotation file.
    pub sha256: String,
    pub skipped_annotations: usize,
}

pub fn load_coco(path: &Path) -> Result<CocoDataset> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read COCO file: {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    let (dataset, skipped_annotations) = parse_coco(&bytes, base)
        .with_context(|| format!("Failed to parse COCO file: {}", path.display()))?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let sha256 = format!("{:x}", hasher.finalize());

    tracing::info!(
        path = %path.display(),
        videos = dataset.video_ids().len(),
        frames = dataset.num_frames(),
        annotations = dataset.num_annotations(),
        categories = dataset.categories().len(),
        "dataset loaded"
    );
    Ok(CocoDataset {
        dataset,
        path: path.to_path_buf(),
        sha256,
        skipped_annotations,
    })
}

/// Parse COCO JSON. Returns the dataset and the number of annotations
/// skipped for using polygon segmentation.
pub fn parse_coco(bytes: &[u8], base: &Path) -> Result<(InMemoryDataset, usize)> {
    let file: CocoFile = serde_json::from_slice(bytes)?;
    let mut dataset = InMemoryDataset::new();

    for category in file.categories {
        dataset.add_category(category.id, category.name);
    }

    let mut sizes = HashMap::new();
    let mut seen = HashSet::new();
    for image in file.images {
        if !seen.insert(image.id) {
            return Err(DatasetError::DuplicateImage(image.id).into());
        }
        let rel = image
            .path
            .or(image.file_name)
            .ok_or(DatasetError::MissingPath(image.id))?;
        let path = if rel.is_absolute() {
            rel
        } else {
            base.join(rel)
        };
        sizes.insert(image.id, [image.height as usize, image.width as usize]);
        dataset.add_frame(Frame {
            id: image.id,
            video_id: image.video_id.into_string(),
            order_in_video: image.order_in_video,
            path,
            is_keyframe: image.is_det_keyframe,
            width: image.width,
            height: image.height,
        });
    }

    let mut skipped = 0usize;
    for (n, ann) in file.annotations.into_iter().enumerate() {
        let id = if ann.id == 0 { n as u64 + 1 } else { ann.id };
        let Some(expected) = sizes.get(&ann.image_id).copied() else {
            return Err(DatasetError::UnknownImage {
                annotation: id,
                image: ann.image_id,
            }
            .into());
        };
        let segmentation = match ann.segmentation {
            Segmentation::Rle(rle) => rle,
            Segmentation::Polygon(_) => {
                tracing::warn!(annotation = id, "polygon segmentation is not supported, skipping");
                skipped += 1;
                continue;
            }
        };
        if expected != [0, 0] && segmentation.size != expected {
            return Err(DatasetError::SizeMismatch {
                annotation: id,
                image: ann.image_id,
                expected,
                actual: segmentation.size,
            }
            .into());
        }
        let area = segmentation
            .area()
            .with_context(|| format!("annotation {} has malformed RLE counts", id))?;
        if area == 0 {
            tracing::debug!(annotation = id, image = ann.image_id, "annotation mask is empty");
        }
        dataset.add_annotation(Annotation {
            id,
            image_id: ann.image_id,
            category_id: ann.category_id,
            segmentation,
        });
    }

    Ok((dataset, skipped))
}
