//! Binary masks and COCO run-length encoding.
//!
//! Masks are `(height, width)` boolean arrays. COCO RLE stores run lengths
//! in column-major (Fortran) order, always starting with a run of zeros
//! (possibly of length 0). The compressed string form packs each count,
//! delta-coded against the count two positions back from the third count
//! on, into 5-bit groups offset by ASCII `'0'`.
//!
//! # Example
//!
//! ```rust
//! use ndarray::array;
//! use vos_harness_core::mask::Rle;
//!
//! let mask = array![[false, true], [true, true]];
//! let rle = Rle::encode(&mask);
//! assert_eq!(rle.size, [2, 2]);
//! assert_eq!(rle.decode().unwrap(), mask);
//! ```

use anyhow::{bail, Result};
use ndarray::{Array2, ShapeBuilder};
use serde::{Deserialize, Serialize};

/// A `(height, width)` binary mask.
pub type Mask = Array2<bool>;

/// A `(height, width)` map of raw model logits for one object.
pub type LogitMap = Array2<f32>;

/// Run-length counts in either COCO form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RleCounts {
    /// pycocotools compressed string form.
    Compressed(String),
    /// Plain list of run lengths (`iscrowd` style).
    Uncompressed(Vec<u64>),
}

/// A COCO RLE segmentation: `{"size": [h, w], "counts": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rle {
    pub size: [usize; 2],
    pub counts: RleCounts,
}

impl Rle {
    /// Encode a mask into compressed RLE.
    pub fn encode(mask: &Mask) -> Self {
        let (h, w) = mask.dim();
        Self {
            size: [h, w],
            counts: RleCounts::Compressed(counts_to_string(&mask_to_counts(mask))),
        }
    }

    /// Decode into a `(height, width)` mask.
    pub fn decode(&self) -> Result<Mask> {
        let counts = match &self.counts {
            RleCounts::Compressed(s) => counts_from_string(s)?,
            RleCounts::Uncompressed(c) => c.clone(),
        };
        counts_to_mask(self.size[0], self.size[1], &counts)
    }

    /// Number of foreground pixels, computed from the counts.
    pub fn area(&self) -> Result<u64> {
        let counts = match &self.counts {
            RleCounts::Compressed(s) => counts_from_string(s)?,
            RleCounts::Uncompressed(c) => c.clone(),
        };
        counts
            .iter()
            .skip(1)
            .step_by(2)
            .try_fold(0u64, |acc, &c| acc.checked_add(c))
            .ok_or_else(|| anyhow::anyhow!("RLE counts overflow"))
    }
}

/// Run lengths of a mask in column-major order, beginning with zeros.
pub fn mask_to_counts(mask: &Mask) -> Vec<u64> {
    let mut counts = Vec::new();
    let mut current = false;
    let mut run: u64 = 0;
    // The transposed view iterates the original column by column.
    for &px in mask.t().iter() {
        if px != current {
            counts.push(run);
            run = 0;
            current = px;
        }
        run += 1;
    }
    counts.push(run);
    counts
}

/// Rebuild a mask from column-major run lengths.
pub fn counts_to_mask(height: usize, width: usize, counts: &[u64]) -> Result<Mask> {
    let Some(pixels) = height.checked_mul(width) else {
        bail!("RLE size {}x{} overflows", height, width);
    };
    let Some(total) = counts.iter().try_fold(0u64, |acc, &c| acc.checked_add(c)) else {
        bail!("RLE counts overflow");
    };
    if total != pixels as u64 {
        bail!(
            "RLE counts cover {} pixels but size is {}x{}",
            total,
            height,
            width
        );
    }
    let mut data = Vec::with_capacity(pixels);
    let mut value = false;
    for &c in counts {
        data.extend(std::iter::repeat(value).take(c as usize));
        value = !value;
    }
    let mask = Array2::from_shape_vec((height, width).f(), data)?;
    Ok(mask.as_standard_layout().into_owned())
}

/// Pack run lengths into the pycocotools string form.
pub fn counts_to_string(counts: &[u64]) -> String {
    let mut out = String::new();
    for (i, &count) in counts.iter().enumerate() {
        let mut x = count as i64;
        if i > 2 {
            x -= counts[i - 2] as i64;
        }
        loop {
            let mut c = x & 0x1f;
            x >>= 5;
            let more = if c & 0x10 != 0 { x != -1 } else { x != 0 };
            if more {
                c |= 0x20;
            }
            out.push((c as u8 + 48) as char);
            if !more {
                break;
            }
        }
    }
    out
}

/// Unpack the pycocotools string form into run lengths.
pub fn counts_from_string(s: &str) -> Result<Vec<u64>> {
    let bytes = s.as_bytes();
    let mut counts: Vec<u64> = Vec::new();
    let mut p = 0;
    while p < bytes.len() {
        let mut x: i64 = 0;
        let mut k = 0;
        loop {
            if p >= bytes.len() {
                bail!("truncated RLE string");
            }
            let c = bytes[p] as i64 - 48;
            if !(0..64).contains(&c) {
                bail!("invalid RLE character {:?}", bytes[p] as char);
            }
            if 5 * k >= 64 {
                bail!("RLE count too long at byte {}", p);
            }
            x |= (c & 0x1f) << (5 * k);
            let more = c & 0x20 != 0;
            p += 1;
            k += 1;
            if !more {
                if c & 0x10 != 0 && 5 * k < 64 {
                    x |= -1i64 << (5 * k);
                }
                break;
            }
        }
        let m = counts.len();
        if m > 2 {
            let Some(sum) = x.checked_add(counts[m - 2] as i64) else {
                bail!("RLE count overflows");
            };
            x = sum;
        }
        if x < 0 {
            bail!("negative run length in RLE string");
        }
        counts.push(x as u64);
    }
    Ok(counts)
}

/// True when no pixel is set.
pub fn is_empty(mask: &Mask) -> bool {
    !mask.iter().any(|&px| px)
}

/// Number of set pixels.
#[cfg(test)]
pub(crate) fn area(mask: &Mask) -> usize {
    mask.iter().filter(|&&px| px).count()
}
