//! Cancellation token shared between a caller and the pipeline

use std::fmt;
use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::NetError;
use crate::transport::OperationKind;

/// Cloneable cancellation handle with an optional reason
///
/// All clones observe the same state. The first reason given wins;
/// cancelling again is a no-op.
#[derive(Clone, Default)]
pub struct CancelToken {
    token: CancellationToken,
    reason: Arc<OnceLock<String>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self, reason: impl Into<String>) {
        let reason = reason.into();
        debug!(%reason, "CancelToken::cancel: called");
        // reason must be visible before waiters wake
        let _ = self.reason.set(reason);
        self.token.cancel();
    }

    /// True once cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<String> {
        self.reason.get().cloned()
    }

    /// Fail with an abort error if cancellation was already requested
    pub fn ensure_not_cancelled(&self, kind: OperationKind) -> Result<(), NetError> {
        if self.is_cancelled() {
            debug!("CancelToken::ensure_not_cancelled: already cancelled");
            return Err(NetError::aborted(kind, self.reason()));
        }
        Ok(())
    }

    /// Resolves with the reason once cancellation is requested
    pub async fn cancelled(&self) -> String {
        self.token.cancelled().await;
        self.reason().unwrap_or_default()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason.get())
            .finish()
    }
}
