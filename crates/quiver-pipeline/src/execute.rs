//! The execution orchestrator — screens, optionally rewrites, and runs a
//! script against the remote interpreter, then normalizes the result.
//!
//! Every failure path returns a failed [`ExecutionReport`]; nothing here
//! panics or surfaces `Err` to the caller. Screening is a hard gate: an
//! unsafe script never reaches the instance.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;

use crate::audit::{
    AuditEntryBuilder, AuditLogger, AuditOperation, AuditOutcome, NoopAuditLogger,
};
use crate::catalog::Catalog;
use crate::error::PipelineError;
use crate::lint::{SyntaxValidator, ValidationReport};
use crate::normalize::normalize;
use crate::screen::{SecurityScreener, SecurityVerdict};
use crate::wrap::{detect_write_operations, wrap_for_test_mode};
use crate::{ExecutionOptions, RemoteInterpreter};

/// The outcome of one execution request.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    /// Whether the script ran to completion on the instance.
    pub success: bool,
    /// The normalized result. Meaningful only when `success` is true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// The failure message. Meaningful only when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Ordered diagnostics: write warnings first, then interpreter logs,
    /// then truncation notices.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<String>,
    /// Locally measured elapsed time for the whole call.
    pub execution_time_ms: u64,
    /// Whether records were dropped to fit a limit.
    pub truncated: bool,
    /// Number of records returned, where meaningful.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_count: Option<u64>,
}

impl ExecutionReport {
    fn failure(error: impl Into<String>, started: Instant) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            logs: Vec::new(),
            execution_time_ms: started.elapsed().as_millis() as u64,
            truncated: false,
            record_count: None,
        }
    }
}

/// The screening → rewrite → remote call → normalize pipeline.
///
/// Holds no mutable state; one pipeline may serve concurrent calls. The
/// catalog and validator are fixed at construction — reconfiguration
/// means building a new pipeline.
pub struct ExecutionPipeline {
    screener: SecurityScreener,
    validator: SyntaxValidator,
    interpreter: Arc<dyn RemoteInterpreter>,
    audit_logger: Arc<dyn AuditLogger>,
}

impl ExecutionPipeline {
    /// Create a pipeline over the given catalog and interpreter.
    pub fn new(catalog: Catalog, interpreter: Arc<dyn RemoteInterpreter>) -> Self {
        let validator = SyntaxValidator::with_max_length(catalog.max_script_length());
        Self {
            screener: SecurityScreener::new(catalog),
            validator,
            interpreter,
            audit_logger: Arc::new(NoopAuditLogger),
        }
    }

    /// Attach an audit logger.
    pub fn with_audit_logger(mut self, logger: Arc<dyn AuditLogger>) -> Self {
        self.audit_logger = logger;
        self
    }

    /// Screen a script without executing it.
    pub fn screen(&self, script: &str) -> SecurityVerdict {
        self.screener.screen(script)
    }

    /// Lint-validate a script. Synchronous; no remote work.
    pub fn validate(&self, script: &str) -> ValidationReport {
        let report = self.validator.validate(script);
        tracing::debug!(
            valid = report.valid,
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "validate: complete"
        );
        report
    }

    /// Execute a script against the remote interpreter.
    ///
    /// Short-circuit ladder, each step returning a failed report without
    /// touching the instance: empty script, over-length script, unsafe
    /// screening verdict, un-wrappable test-mode script.
    pub async fn execute(&self, script: &str, options: ExecutionOptions) -> ExecutionReport {
        let started = Instant::now();
        let audit = AuditEntryBuilder::new(script, AuditOperation::Execute, options.test_mode);
        tracing::info!(
            execution_id = %audit.execution_id(),
            script_len = script.len(),
            test_mode = options.test_mode,
            "execute: starting"
        );

        if script.trim().is_empty() {
            return self
                .reject(audit, PipelineError::EmptyScript, started)
                .await;
        }

        let max = self.screener.catalog().max_script_length();
        if script.len() > max {
            let error = PipelineError::ScriptTooLarge {
                max,
                actual: script.len(),
            };
            return self.reject(audit, error, started).await;
        }

        let verdict = self.screener.screen(script);
        if !verdict.safe {
            let error = PipelineError::Unsafe {
                violations: verdict.violations,
            };
            return self.reject(audit, error, started).await;
        }

        // Detected against the original text, before any rewrite.
        let write_ops = detect_write_operations(script, self.screener.catalog());

        let outbound = if options.test_mode {
            match wrap_for_test_mode(script, options.max_results) {
                Ok(wrapped) => wrapped,
                Err(e) => {
                    return self.reject(audit, PipelineError::Wrap(e), started).await;
                }
            }
        } else {
            script.to_string()
        };

        let outcome = match self.interpreter.run_script(&outbound, options.timeout).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let error = PipelineError::Remote(e);
                let report = ExecutionReport::failure(error.to_string(), started);
                let entry = audit.finish(
                    AuditOutcome::Failed {
                        reason: error.to_string(),
                    },
                    false,
                    None,
                );
                self.audit_logger.log(&entry).await;
                tracing::warn!(error = %error, "execute: remote failure");
                return report;
            }
        };

        let normalized = normalize(outcome.result, options.test_mode);

        let mut logs = Vec::new();
        if options.test_mode && !write_ops.is_empty() {
            logs.push(format!(
                "Warning: this script contains write operations that will persist changes: {}",
                write_ops.join(", ")
            ));
        }
        logs.extend(outcome.logs);
        logs.extend(normalized.logs);

        let entry = audit.finish(
            AuditOutcome::Success,
            normalized.truncated,
            normalized.record_count,
        );
        self.audit_logger.log(&entry).await;

        tracing::info!(
            truncated = normalized.truncated,
            record_count = ?normalized.record_count,
            "execute: complete"
        );

        ExecutionReport {
            success: true,
            data: Some(normalized.data),
            error: None,
            logs,
            execution_time_ms: started.elapsed().as_millis() as u64,
            truncated: normalized.truncated,
            record_count: normalized.record_count,
        }
    }

    async fn reject(
        &self,
        audit: AuditEntryBuilder,
        error: PipelineError,
        started: Instant,
    ) -> ExecutionReport {
        let reason = error.to_string();
        let report = ExecutionReport::failure(reason.clone(), started);
        let entry = audit.finish(AuditOutcome::Rejected { reason }, false, None);
        self.audit_logger.log(&entry).await;
        tracing::warn!(error = %error, "execute: rejected");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RemoteOutcome, RemoteInterpreter};
    use quiver_error::RemoteError;
    use serde_json::json;
    use std::sync::Mutex;

    /// Interpreter double that records the script it was handed.
    struct RecordingInterpreter {
        result: Value,
        seen: Mutex<Vec<String>>,
    }

    impl RecordingInterpreter {
        fn returning(result: Value) -> Arc<Self> {
            Arc::new(Self {
                result,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl RemoteInterpreter for RecordingInterpreter {
        async fn run_script(
            &self,
            script: &str,
            _timeout: Option<std::time::Duration>,
        ) -> Result<RemoteOutcome, RemoteError> {
            self.seen.lock().unwrap().push(script.to_string());
            Ok(RemoteOutcome {
                result: self.result.clone(),
                logs: vec!["interpreter: ok".into()],
                execution_time_ms: 7,
            })
        }
    }

    struct FailingInterpreter;

    #[async_trait::async_trait]
    impl RemoteInterpreter for FailingInterpreter {
        async fn run_script(
            &self,
            _script: &str,
            _timeout: Option<std::time::Duration>,
        ) -> Result<RemoteOutcome, RemoteError> {
            Err(RemoteError::Execution {
                message: "ReferenceError: boom".into(),
            })
        }
    }

    fn pipeline(interpreter: Arc<dyn RemoteInterpreter>) -> ExecutionPipeline {
        ExecutionPipeline::new(Catalog::default(), interpreter)
    }

    #[tokio::test]
    async fn empty_script_fails_without_reaching_the_interpreter() {
        let interpreter = RecordingInterpreter::returning(json!([]));
        let report = pipeline(interpreter.clone())
            .execute("   ", ExecutionOptions::default())
            .await;
        assert!(!report.success);
        assert!(report.error.as_deref().unwrap().contains("empty"));
        assert!(interpreter.calls().is_empty());
    }

    #[tokio::test]
    async fn over_length_script_fails_citing_the_limit() {
        let interpreter = RecordingInterpreter::returning(json!([]));
        let report = pipeline(interpreter.clone())
            .execute(&"x".repeat(10_001), ExecutionOptions::default())
            .await;
        assert!(!report.success);
        assert!(report.error.as_deref().unwrap().contains("10000"));
        assert!(interpreter.calls().is_empty());
    }

    #[tokio::test]
    async fn unsafe_script_is_a_hard_gate() {
        let interpreter = RecordingInterpreter::returning(json!([]));
        let report = pipeline(interpreter.clone())
            .execute("eval('drop table incident')", ExecutionOptions::default())
            .await;
        assert!(!report.success);
        let error = report.error.unwrap();
        assert!(error.contains("eval") && error.contains("drop"), "{error}");
        assert!(interpreter.calls().is_empty());
    }

    #[tokio::test]
    async fn plain_execution_passes_the_script_through_verbatim() {
        let interpreter = RecordingInterpreter::returning(json!([{"number": "INC0000001"}]));
        let report = pipeline(interpreter.clone())
            .execute("record('incident').select('number')", ExecutionOptions::default())
            .await;
        assert!(report.success);
        assert_eq!(report.record_count, Some(1));
        assert!(!report.truncated);
        assert_eq!(
            interpreter.calls(),
            vec!["record('incident').select('number')".to_string()]
        );
    }

    #[tokio::test]
    async fn test_mode_rewrites_the_script() {
        let interpreter = RecordingInterpreter::returning(json!([]));
        let options = ExecutionOptions {
            test_mode: true,
            ..Default::default()
        };
        pipeline(interpreter.clone())
            .execute("record('incident').select()", options)
            .await;
        let sent = interpreter.calls();
        assert!(sent[0].contains("__testMode"));
        assert!(sent[0].contains("record('incident').select()"));
        assert!(sent[0].contains("> 100"), "default max_results is 100");
    }

    #[tokio::test]
    async fn test_mode_write_warning_is_first_in_logs() {
        let interpreter = RecordingInterpreter::returning(json!({"value": {"state": 2}}));
        let options = ExecutionOptions {
            test_mode: true,
            ..Default::default()
        };
        let report = pipeline(interpreter)
            .execute(
                "record('incident').where('active', '=', false).updateMultiple({state: 2})",
                options,
            )
            .await;
        assert!(report.success);
        assert!(
            report.logs[0].contains("persist") && report.logs[0].contains("updateMultiple"),
            "first log must be the write warning: {:?}",
            report.logs
        );
    }

    #[tokio::test]
    async fn write_warning_is_absent_outside_test_mode() {
        let interpreter = RecordingInterpreter::returning(json!(null));
        let report = pipeline(interpreter)
            .execute(
                "record('incident').insert({short_description: 'x'})",
                ExecutionOptions::default(),
            )
            .await;
        assert!(report.logs.iter().all(|l| !l.contains("persist")));
    }

    #[tokio::test]
    async fn interpreter_logs_sit_between_warning_and_truncation_notice() {
        let envelope = json!({
            "__testMode": true,
            "truncated": true,
            "totalRecords": 300,
            "data": (0..100).map(|i| json!(i)).collect::<Vec<_>>(),
        });
        let interpreter = RecordingInterpreter::returning(envelope);
        let options = ExecutionOptions {
            test_mode: true,
            ..Default::default()
        };
        let report = pipeline(interpreter)
            .execute("record('incident').deleteMultiple()", options)
            .await;
        assert!(report.success);
        assert!(report.logs[0].contains("persist"));
        assert_eq!(report.logs[1], "interpreter: ok");
        assert!(report.logs[2].contains("300"));
        assert!(report.truncated);
        assert_eq!(report.record_count, Some(100));
    }

    #[tokio::test]
    async fn unwrappable_test_script_fails_before_the_remote_call() {
        let interpreter = RecordingInterpreter::returning(json!([]));
        let options = ExecutionOptions {
            test_mode: true,
            ..Default::default()
        };
        let report = pipeline(interpreter.clone())
            .execute("var x = record('a').select(); x", options)
            .await;
        assert!(!report.success);
        assert!(report.error.as_deref().unwrap().contains("test mode"));
        assert!(interpreter.calls().is_empty());
    }

    #[tokio::test]
    async fn remote_failure_message_passes_through_verbatim() {
        let report = pipeline(Arc::new(FailingInterpreter))
            .execute("record('incident').select()", ExecutionOptions::default())
            .await;
        assert!(!report.success);
        assert!(report
            .error
            .as_deref()
            .unwrap()
            .contains("ReferenceError: boom"));
    }

    #[tokio::test]
    async fn oversized_normal_mode_array_is_truncated_at_the_ceiling() {
        let rows: Vec<Value> = (0..1500).map(|i| json!({"n": i})).collect();
        let interpreter = RecordingInterpreter::returning(Value::Array(rows));
        let report = pipeline(interpreter)
            .execute("record('incident').select()", ExecutionOptions::default())
            .await;
        assert!(report.success);
        assert!(report.truncated);
        assert_eq!(report.record_count, Some(1000));
        assert_eq!(report.data.unwrap().as_array().unwrap().len(), 1000);
        assert!(report.logs.iter().any(|l| l.contains("1500")));
    }

    #[tokio::test]
    async fn failure_reports_carry_near_zero_execution_time() {
        let interpreter = RecordingInterpreter::returning(json!([]));
        let report = pipeline(interpreter)
            .execute("", ExecutionOptions::default())
            .await;
        assert!(report.execution_time_ms < 1000);
    }
}
