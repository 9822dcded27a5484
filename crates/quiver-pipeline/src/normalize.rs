//! Result normalization.
//!
//! The remote interpreter can hand back anything: record arrays, tagged
//! test-mode envelopes, optional wrappers, bare scalars, aggregate
//! objects, or nothing at all. This module reshapes that zoo into a
//! small set of predictable shapes so protocol callers never have to
//! guess. Pure function, no I/O.

use serde_json::Value;

use crate::wrap::TEST_MODE_TAG;

/// Ceiling on untagged array results outside test mode.
pub const RESULT_CEILING: usize = 1000;

/// A normalized remote result.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    /// The reshaped payload.
    pub data: Value,
    /// Whether records were dropped to fit a limit.
    pub truncated: bool,
    /// Number of records in `data`, where that is meaningful.
    pub record_count: Option<u64>,
    /// Diagnostic lines to append to the execution log.
    pub logs: Vec<String>,
}

impl Normalized {
    fn passthrough(data: Value) -> Self {
        Self {
            data,
            truncated: false,
            record_count: None,
            logs: Vec::new(),
        }
    }
}

/// Normalize a raw remote result.
///
/// The shapes are mutually exclusive and tested in priority order:
/// test-mode envelope, array, single-value wrapper, bare primitive,
/// aggregate with row count, null, passthrough.
pub fn normalize(raw: Value, test_mode: bool) -> Normalized {
    // 1. Test-mode envelope stamped by the wrapper.
    if let Value::Object(ref obj) = raw {
        if obj.get(TEST_MODE_TAG).and_then(Value::as_bool) == Some(true) {
            let truncated = obj.get("truncated").and_then(Value::as_bool).unwrap_or(false);
            let total = obj.get("totalRecords").and_then(Value::as_u64);
            let data = obj.get("data").cloned().unwrap_or(Value::Null);
            let shown = data.as_array().map(|a| a.len() as u64);
            let mut logs = Vec::new();
            if truncated {
                logs.push(format!(
                    "Test mode: showing first {} of {} records",
                    shown.unwrap_or(0),
                    total.unwrap_or(0)
                ));
            }
            return Normalized {
                data,
                truncated,
                record_count: shown,
                logs,
            };
        }
    }

    // 2. Untagged array — the normal-mode truncation policy.
    if let Value::Array(items) = raw {
        let len = items.len();
        if !test_mode && len > RESULT_CEILING {
            let kept: Vec<Value> = items.into_iter().take(RESULT_CEILING).collect();
            return Normalized {
                data: Value::Array(kept),
                truncated: true,
                record_count: Some(RESULT_CEILING as u64),
                logs: vec![format!(
                    "Result truncated: showing first {RESULT_CEILING} of {len} records"
                )],
            };
        }
        return Normalized {
            data: Value::Array(items),
            truncated: false,
            record_count: Some(len as u64),
            logs: Vec::new(),
        };
    }

    // 3. Optional-like single-value wrapper.
    if let Value::Object(ref obj) = raw {
        if let Some(value) = obj.get("value") {
            return Normalized::passthrough(value.clone());
        }
    }

    // 4. Bare primitive — wrapped so a zero count is distinguishable
    // from an absent result.
    if matches!(raw, Value::Number(_) | Value::String(_) | Value::Bool(_)) {
        let kind = match &raw {
            Value::Number(_) => "number",
            Value::String(_) => "string",
            _ => "boolean",
        };
        return Normalized::passthrough(serde_json::json!({
            "value": raw,
            "type": kind,
        }));
    }

    // 5. Aggregate object carrying a row count.
    if let Value::Object(ref obj) = raw {
        if let Some(count) = obj.get("rowCount").and_then(Value::as_u64) {
            let mut normalized = Normalized::passthrough(raw.clone());
            normalized.record_count = Some(count);
            return normalized;
        }
    }

    // 6. No result at all.
    if raw.is_null() {
        return Normalized {
            data: Value::Null,
            truncated: false,
            record_count: None,
            logs: vec!["No records found".into()],
        };
    }

    // 7. Anything else passes through unchanged.
    Normalized::passthrough(raw)
}
