//! Audit logging for script executions.
//!
//! Every execution emits an [`AuditEntry`] containing:
//! - Execution ID (UUID)
//! - SHA-256 hash of the script (never the raw script in logs)
//! - A preview of the first 200 chars of the script
//! - Operation, duration, and outcome
//!
//! The [`AuditLogger`] trait allows pluggable backends.
//! [`JsonLinesAuditLogger`] writes newline-delimited JSON to any `AsyncWrite`.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Maximum length of the script preview in audit entries.
const SCRIPT_PREVIEW_MAX: usize = 200;

/// A complete audit record for a single pipeline call.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    /// Unique execution identifier.
    pub execution_id: String,
    /// ISO-8601 timestamp of when the call started.
    pub timestamp: DateTime<Utc>,
    /// SHA-256 hash of the submitted script.
    pub script_hash: String,
    /// First N characters of the script (for human review).
    pub script_preview: String,
    /// Whether this was a validate or an execute call.
    pub operation: AuditOperation,
    /// Whether test mode was requested.
    pub test_mode: bool,
    /// Total call duration in milliseconds.
    pub duration_ms: u64,
    /// Final outcome.
    pub outcome: AuditOutcome,
    /// Whether the result was truncated.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
    /// Number of records returned, where meaningful.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_count: Option<u64>,
}

/// The type of pipeline call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum AuditOperation {
    /// A lint validation call (no remote work).
    Validate,
    /// A script execution call.
    Execute,
}

/// The outcome of an audited call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
#[non_exhaustive]
pub enum AuditOutcome {
    /// The call completed.
    Success,
    /// The script was rejected before reaching the instance.
    Rejected {
        /// The rejection reason.
        reason: String,
    },
    /// The remote interpreter failed.
    Failed {
        /// The failure message.
        reason: String,
    },
}

/// Builds an [`AuditEntry`] across the lifetime of one call.
pub struct AuditEntryBuilder {
    execution_id: String,
    timestamp: DateTime<Utc>,
    script_hash: String,
    script_preview: String,
    operation: AuditOperation,
    test_mode: bool,
    started: Instant,
}

impl AuditEntryBuilder {
    /// Start an audit record for a script. Hashes the script immediately
    /// so the raw text never needs to be retained.
    pub fn new(script: &str, operation: AuditOperation, test_mode: bool) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(script.as_bytes());
        let script_hash = format!("{:x}", hasher.finalize());

        let script_preview: String = script.chars().take(SCRIPT_PREVIEW_MAX).collect();

        Self {
            execution_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            script_hash,
            script_preview,
            operation,
            test_mode,
            started: Instant::now(),
        }
    }

    /// The execution id assigned to this call.
    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// Finish the record with an outcome.
    pub fn finish(
        self,
        outcome: AuditOutcome,
        truncated: bool,
        record_count: Option<u64>,
    ) -> AuditEntry {
        AuditEntry {
            execution_id: self.execution_id,
            timestamp: self.timestamp,
            script_hash: self.script_hash,
            script_preview: self.script_preview,
            operation: self.operation,
            test_mode: self.test_mode,
            duration_ms: self.started.elapsed().as_millis() as u64,
            outcome,
            truncated,
            record_count,
        }
    }
}

/// Pluggable audit sink.
#[async_trait::async_trait]
pub trait AuditLogger: Send + Sync {
    /// Record one entry. Implementations must not panic on sink errors.
    async fn log(&self, entry: &AuditEntry);
}

/// Discards all entries.
pub struct NoopAuditLogger;

#[async_trait::async_trait]
impl AuditLogger for NoopAuditLogger {
    async fn log(&self, _entry: &AuditEntry) {}
}

/// Emits entries as structured `tracing` events.
pub struct TracingAuditLogger;

#[async_trait::async_trait]
impl AuditLogger for TracingAuditLogger {
    async fn log(&self, entry: &AuditEntry) {
        tracing::info!(
            execution_id = %entry.execution_id,
            script_hash = %entry.script_hash,
            operation = ?entry.operation,
            test_mode = entry.test_mode,
            duration_ms = entry.duration_ms,
            outcome = ?entry.outcome,
            "audit"
        );
    }
}

/// Writes newline-delimited JSON entries to any `AsyncWrite`.
pub struct JsonLinesAuditLogger<W: AsyncWrite + Unpin + Send> {
    writer: Arc<Mutex<W>>,
}

impl<W: AsyncWrite + Unpin + Send> JsonLinesAuditLogger<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
        }
    }
}

#[async_trait::async_trait]
impl<W: AsyncWrite + Unpin + Send> AuditLogger for JsonLinesAuditLogger<W> {
    async fn log(&self, entry: &AuditEntry) {
        let mut line = match serde_json::to_string(entry) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "audit entry serialization failed");
                return;
            }
        };
        line.push('\n');
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            tracing::warn!(error = %e, "audit sink write failed");
        }
    }
}
