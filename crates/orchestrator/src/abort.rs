use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

const DEFAULT_REASON: &str = "abort requested";

/// External stop signal shared by everyone driving a cycle or a run.
///
/// Clones observe the same signal. The first reason given wins.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    token: CancellationToken,
    reason: Arc<OnceLock<String>>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self, reason: impl Into<String>) {
        let _ = self.reason.set(reason.into());
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> &str {
        self.reason.get().map(String::as_str).unwrap_or(DEFAULT_REASON)
    }

    /// Resolves once `abort` has been called.
    pub async fn aborted(&self) {
        self.token.cancelled().await
    }
}
