//! End-to-end tests for the Quiver pipeline.
//!
//! These tests verify the screening, test-mode, and normalization
//! policies through the full execute path, not just at the unit level.
//! The remote interpreter is a configurable double — the pipeline must
//! behave identically whatever actually runs the script.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use quiver_error::RemoteError;
use quiver_pipeline::{
    Catalog, CatalogOverrides, ExecutionOptions, ExecutionPipeline, RemoteInterpreter,
    RemoteOutcome,
};
use serde_json::{json, Value};

/// Interpreter double: returns a canned result and records every script
/// and timeout it is handed.
struct ScriptedInterpreter {
    result: Value,
    calls: Mutex<Vec<(String, Option<Duration>)>>,
}

impl ScriptedInterpreter {
    fn returning(result: Value) -> Arc<Self> {
        Arc::new(Self {
            result,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn last_script(&self) -> String {
        self.calls.lock().unwrap().last().unwrap().0.clone()
    }

    fn last_timeout(&self) -> Option<Duration> {
        self.calls.lock().unwrap().last().unwrap().1
    }
}

#[async_trait::async_trait]
impl RemoteInterpreter for ScriptedInterpreter {
    async fn run_script(
        &self,
        script: &str,
        timeout: Option<Duration>,
    ) -> Result<RemoteOutcome, RemoteError> {
        self.calls
            .lock()
            .unwrap()
            .push((script.to_string(), timeout));

        // Emulate the wrapper the instance would evaluate: when the
        // pipeline sent a test-mode wrapper and the canned result is an
        // oversized array, answer with the tagged envelope.
        if script.contains("__testMode") {
            if let Value::Array(items) = &self.result {
                if let Some(limit) = extract_limit(script) {
                    if items.len() > limit {
                        return Ok(RemoteOutcome {
                            result: json!({
                                "__testMode": true,
                                "truncated": true,
                                "totalRecords": items.len(),
                                "data": items[..limit].to_vec(),
                            }),
                            logs: Vec::new(),
                            execution_time_ms: 3,
                        });
                    }
                }
            }
        }

        Ok(RemoteOutcome {
            result: self.result.clone(),
            logs: Vec::new(),
            execution_time_ms: 3,
        })
    }
}

/// Pull the `> N` limit back out of the wrapper text.
fn extract_limit(script: &str) -> Option<usize> {
    let idx = script.find("__result.length > ")?;
    let rest = &script[idx + "__result.length > ".len()..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn pipeline(interpreter: Arc<dyn RemoteInterpreter>) -> ExecutionPipeline {
    ExecutionPipeline::new(Catalog::default(), interpreter)
}

fn records(n: usize) -> Value {
    Value::Array((0..n).map(|i| json!({"number": format!("INC{i:07}")})).collect())
}

// --- Screening gates ---

#[tokio::test]
async fn blacklisted_script_never_reaches_the_interpreter() {
    let interpreter = ScriptedInterpreter::returning(json!([]));
    let p = pipeline(interpreter.clone());

    let report = p
        .execute(
            "record('incident').where('x', '=', 'y'); drop table incident",
            ExecutionOptions::default(),
        )
        .await;

    assert!(!report.success);
    assert!(report.error.unwrap().contains("drop"));
    assert_eq!(interpreter.call_count(), 0);

    let verdict = p.screen("drop table incident");
    assert!(!verdict.safe);
}

#[tokio::test]
async fn over_length_script_is_rejected_by_screen_and_execute() {
    let interpreter = ScriptedInterpreter::returning(json!([]));
    let p = pipeline(interpreter.clone());
    let script = format!("record('incident').select('{}')", "f".repeat(10_000));

    let verdict = p.screen(&script);
    assert!(!verdict.safe);
    assert!(verdict.violations[0].contains("10000"));

    let report = p.execute(&script, ExecutionOptions::default()).await;
    assert!(!report.success);
    assert_eq!(interpreter.call_count(), 0);
}

#[tokio::test]
async fn dangerous_operations_flag_but_do_not_block() {
    let interpreter = ScriptedInterpreter::returning(json!({"value": null}));
    let p = pipeline(interpreter.clone());
    let script = "record('incident').deleteMultiple()";

    let verdict = p.screen(script);
    assert!(verdict.safe);
    assert_eq!(verdict.dangerous_operations, vec!["deleteMultiple"]);

    let report = p.execute(script, ExecutionOptions::default()).await;
    assert!(report.success, "dangerous ops alone never block execution");
    assert_eq!(interpreter.call_count(), 1);
}

// --- Test-mode truncation policy ---

#[tokio::test]
async fn test_mode_truncates_oversized_results_at_max_results() {
    let interpreter = ScriptedInterpreter::returning(records(250));
    let p = pipeline(interpreter.clone());

    let report = p
        .execute(
            "record('incident').select('number')",
            ExecutionOptions {
                test_mode: true,
                ..Default::default()
            },
        )
        .await;

    assert!(report.success);
    assert!(report.truncated);
    assert_eq!(report.record_count, Some(100));
    assert_eq!(report.data.unwrap().as_array().unwrap().len(), 100);
    assert!(
        report.logs.iter().any(|l| l.contains("100") && l.contains("250")),
        "logs must cite both counts: {:?}",
        report.logs
    );
}

#[tokio::test]
async fn test_mode_passes_small_results_through() {
    let interpreter = ScriptedInterpreter::returning(records(40));
    let p = pipeline(interpreter.clone());

    let report = p
        .execute(
            "record('incident').select('number')",
            ExecutionOptions {
                test_mode: true,
                ..Default::default()
            },
        )
        .await;

    assert!(report.success);
    assert!(!report.truncated);
    assert_eq!(report.record_count, Some(40));
}

#[tokio::test]
async fn custom_max_results_is_embedded_in_the_wrapper() {
    let interpreter = ScriptedInterpreter::returning(records(30));
    let p = pipeline(interpreter.clone());

    let report = p
        .execute(
            "record('incident').select('number')",
            ExecutionOptions {
                test_mode: true,
                max_results: 10,
                ..Default::default()
            },
        )
        .await;

    assert!(report.success);
    assert!(report.truncated);
    assert_eq!(report.record_count, Some(10));
    assert!(interpreter.last_script().contains("slice(0, 10)"));
}

// --- Normal-mode ceiling ---

#[tokio::test]
async fn normal_mode_applies_the_fixed_ceiling() {
    let interpreter = ScriptedInterpreter::returning(records(1200));
    let p = pipeline(interpreter.clone());

    let report = p
        .execute("record('incident').select()", ExecutionOptions::default())
        .await;

    assert!(report.truncated);
    assert_eq!(report.record_count, Some(1000));

    let interpreter = ScriptedInterpreter::returning(records(900));
    let report = pipeline(interpreter)
        .execute("record('incident').select()", ExecutionOptions::default())
        .await;
    assert!(!report.truncated);
    assert_eq!(report.record_count, Some(900));
}

// --- Write warnings ---

#[tokio::test]
async fn write_warning_leads_the_logs_even_with_truncation() {
    let interpreter = ScriptedInterpreter::returning(records(150));
    let p = pipeline(interpreter.clone());

    let report = p
        .execute(
            "record('incident').where('active', '=', false).updateMultiple({state: 7})",
            ExecutionOptions {
                test_mode: true,
                ..Default::default()
            },
        )
        .await;

    assert!(report.success);
    assert!(
        report.logs[0].contains("persist") && report.logs[0].contains("updateMultiple"),
        "logs: {:?}",
        report.logs
    );
    assert!(report.truncated);
}

// --- Options plumbing ---

#[tokio::test]
async fn timeout_is_passed_through_to_the_interpreter() {
    let interpreter = ScriptedInterpreter::returning(json!(null));
    let p = pipeline(interpreter.clone());

    p.execute(
        "record('incident').count()",
        ExecutionOptions {
            timeout: Some(Duration::from_secs(45)),
            ..Default::default()
        },
    )
    .await;

    assert_eq!(interpreter.last_timeout(), Some(Duration::from_secs(45)));
}

// --- Catalog overrides ---

#[tokio::test]
async fn override_catalog_screens_with_replacement_patterns() {
    let catalog = Catalog::with_overrides(CatalogOverrides {
        blacklist: Some(vec![r"forbidden_call\s*\(".into()]),
        ..Default::default()
    })
    .unwrap();
    let interpreter = ScriptedInterpreter::returning(json!([]));
    let p = ExecutionPipeline::new(catalog, interpreter.clone());

    // The default blacklist no longer applies...
    let report = p
        .execute("record('x').where('note', '=', 'drop table y').select()", ExecutionOptions::default())
        .await;
    assert!(report.success);

    // ...but the replacement does.
    let report = p
        .execute("forbidden_call()", ExecutionOptions::default())
        .await;
    assert!(!report.success);
    assert_eq!(interpreter.call_count(), 1);
}

// --- Validation path (no network) ---

#[tokio::test]
async fn validate_never_calls_the_interpreter() {
    let interpreter = ScriptedInterpreter::returning(json!([]));
    let p = pipeline(interpreter.clone());

    let report = p.validate("record('incident').selectAll()");
    assert!(!report.valid);
    assert_eq!(report.errors[0].line, Some(1));
    assert_eq!(interpreter.call_count(), 0);
}

// --- Result shapes round-trip ---

#[tokio::test]
async fn report_data_survives_json_round_trips() {
    for result in [
        records(3),
        json!({"value": {"number": "INC0000001"}}),
        json!(42),
        Value::Null,
    ] {
        let interpreter = ScriptedInterpreter::returning(result);
        let report = pipeline(interpreter)
            .execute("record('incident').count()", ExecutionOptions::default())
            .await;
        assert!(report.success);
        let text = serde_json::to_string(&report).unwrap();
        let back: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(back["success"], true);
        let data = report.data.unwrap();
        assert_eq!(back.get("data").cloned().unwrap_or(Value::Null), data);
    }
}
