//! Per-call timeout wrapper for remote interpreters.

use std::sync::Arc;
use std::time::Duration;

use quiver_error::RemoteError;
use quiver_pipeline::{RemoteInterpreter, RemoteOutcome};

/// A [`RemoteInterpreter`] that enforces a per-call deadline on the
/// inner interpreter.
///
/// The pipeline's timeout is advisory; this wrapper is where a deadline
/// actually gets enforced. A caller-supplied timeout takes precedence
/// over the wrapper's own.
pub struct TimeoutInterpreter {
    inner: Arc<dyn RemoteInterpreter>,
    timeout: Duration,
}

impl TimeoutInterpreter {
    /// Wrap an inner interpreter with a default per-call deadline.
    pub fn new(inner: Arc<dyn RemoteInterpreter>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait::async_trait]
impl RemoteInterpreter for TimeoutInterpreter {
    #[tracing::instrument(skip(self, script), fields(script_len = script.len()))]
    async fn run_script(
        &self,
        script: &str,
        timeout: Option<Duration>,
    ) -> Result<RemoteOutcome, RemoteError> {
        let deadline = timeout.unwrap_or(self.timeout);
        match tokio::time::timeout(deadline, self.inner.run_script(script, timeout)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(RemoteError::Timeout {
                timeout_ms: deadline.as_millis() as u64,
            }),
        }
    }
}
