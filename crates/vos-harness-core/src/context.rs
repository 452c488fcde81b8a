//! Mutable state of one pipeline run.

use crate::cancel::CancelToken;
use crate::identity::ObjectIdEncoder;
use crate::models::PromptInfo;

/// Owns the object id encoder, the audit log of every prompt batch handed
/// to the predictor, and the cancellation token. One per run; passed down
/// explicitly to the orchestrators.
#[derive(Debug)]
pub struct RunContext {
    pub(crate) encoder: ObjectIdEncoder,
    pub(crate) prompt_log: Vec<PromptInfo>,
    pub(crate) cancel: CancelToken,
}

impl RunContext {
    pub fn new(num_categories: u32, cancel: CancelToken) -> Self {
        Self {
            encoder: ObjectIdEncoder::new(num_categories),
            prompt_log: Vec::new(),
            cancel,
        }
    }

    pub fn encoder(&self) -> &ObjectIdEncoder {
        &self.encoder
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Prompt batches in the order they were submitted.
    pub fn prompt_log(&self) -> &[PromptInfo] {
        &self.prompt_log
    }
}
