//! Cooperative cancellation shared between the orchestrators and the clip
//! processor.
//!
//! Wraps [`tokio_util::sync::CancellationToken`], whose flag works without a
//! runtime, and adds [`CancelToken::check`] for `?` at the checkpoints.

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;

/// A cloneable token checked between clips and between propagated frames.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: CancellationToken,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Returns [`PipelineError::Cancelled`] once [`cancel`](Self::cancel) has
    /// been called on any clone of this token.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(PipelineError::Cancelled.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(token.check().is_ok());
        other.cancel();
        assert!(token.is_cancelled());
        let err = token.check().unwrap_err();
        assert_eq!(
            err.downcast_ref::<PipelineError>(),
            Some(&PipelineError::Cancelled)
        );
    }
}
