//! Object identity encoding.
//!
//! The predictor tracks objects by integer id but knows nothing about
//! semantic categories. Every instance handed to it gets an id of the form
//!
//! ```text
//! object_id = instance_sequence * (num_categories + 1) + category_id
//! ```
//!
//! so the category survives propagation and is recovered with a single
//! modulo. The sequence number is a per-video counter that advances once per
//! emitted instance; distinct sequence numbers can never map to the same id.
//!
//! # Example
//!
//! ```rust
//! use vos_harness_core::identity::ObjectIdEncoder;
//!
//! let encoder = ObjectIdEncoder::new(6);
//! let a = encoder.encode(3).unwrap();
//! let b = encoder.encode(3).unwrap();
//! assert_ne!(a, b);
//! assert_eq!(encoder.decode(a), 3);
//! assert_eq!(encoder.decode(b), 3);
//! ```

use std::cell::Cell;

use anyhow::Result;

use crate::error::PipelineError;
use crate::models::{CategoryId, ObjectId};

/// Recover the category of an object id.
pub fn decode_category(object_id: ObjectId, num_categories: u32) -> CategoryId {
    (object_id % (num_categories as u64 + 1)) as CategoryId
}

/// Issues object ids for one video at a time.
///
/// The counter sits in a [`Cell`] so the clip planner and the video
/// orchestrator can both issue ids through shared references while a video
/// is being processed. The encoder is not `Sync`; one encoder serves one
/// video at a time.
#[derive(Debug)]
pub struct ObjectIdEncoder {
    num_categories: u32,
    next_instance: Cell<u64>,
}

impl ObjectIdEncoder {
    pub fn new(num_categories: u32) -> Self {
        Self {
            num_categories,
            next_instance: Cell::new(0),
        }
    }

    pub fn num_categories(&self) -> u32 {
        self.num_categories
    }

    /// Number of ids issued since the last reset.
    pub fn issued(&self) -> u64 {
        self.next_instance.get()
    }

    /// Restart the instance sequence. Called at the start of every video.
    pub fn reset(&self) {
        self.next_instance.set(0);
    }

    /// Issue a fresh id for an instance of `category_id`.
    pub fn encode(&self, category_id: CategoryId) -> Result<ObjectId> {
        if category_id > self.num_categories {
            return Err(PipelineError::CategoryOutOfRange {
                category_id,
                num_categories: self.num_categories,
            }
            .into());
        }
        let seq = self.next_instance.get();
        self.next_instance.set(seq + 1);
        Ok(seq * (self.num_categories as u64 + 1) + category_id as u64)
    }

    pub fn decode(&self, object_id: ObjectId) -> CategoryId {
        decode_category(object_id, self.num_categories)
    }
}
