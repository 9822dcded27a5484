//! Static lint validation for fluent query scripts.
//!
//! This is a deliberately shallow, pattern-driven linter — not a
//! tokenizer or AST pass. Each check is an independent table-driven rule
//! (pattern → diagnosis → line attribution) so rules can be unit-tested
//! and extended without touching the control flow. False negatives are
//! acceptable for the advisory checks; the fatal checks only fire on
//! shapes that cannot be valid in the DSL.
//!
//! No I/O, no suspension, no shared state: validation is a pure function
//! of the script text.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::catalog::DEFAULT_MAX_SCRIPT_LENGTH;

/// A fatal finding. Any error makes the script invalid.
#[derive(Debug, Clone, Serialize)]
pub struct LintError {
    /// What is wrong, including the offending name and the fix.
    pub message: String,
    /// 1-based line of the offending text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// The outcome of validating one script.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    /// `true` iff `errors` is empty. Warnings never affect validity.
    pub valid: bool,
    /// Fatal findings, in check order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<LintError>,
    /// Advisory findings.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// An entry in the undefined-method table: a wrong-but-plausible method
/// name, the correct method, and a one-line suggestion.
struct UndefinedMethod {
    wrong: &'static str,
    correct: &'static str,
    suggestion: &'static str,
}

static UNDEFINED_METHODS: &[UndefinedMethod] = &[
    UndefinedMethod {
        wrong: "selectAll",
        correct: "select",
        suggestion: "fetch matching records with .select(...fields)",
    },
    UndefinedMethod {
        wrong: "findOne",
        correct: "selectOne",
        suggestion: "fetch a single optional record with .selectOne(...fields)",
    },
    UndefinedMethod {
        wrong: "runQuery",
        correct: "select",
        suggestion: "chains execute on the terminal call; there is no runQuery()",
    },
    UndefinedMethod {
        wrong: "addQuery",
        correct: "where",
        suggestion: "add conditions with .where(field, operator, value)",
    },
    UndefinedMethod {
        wrong: "next",
        correct: "select",
        suggestion: "iterate the stream returned by .select() instead of cursor stepping",
    },
    UndefinedMethod {
        wrong: "getValue",
        correct: "select",
        suggestion: "selected fields are returned as plain properties on each record",
    },
    UndefinedMethod {
        wrong: "setValue",
        correct: "update",
        suggestion: "pass a field object to .update({field: value})",
    },
    UndefinedMethod {
        wrong: "deleteRecord",
        correct: "deleteMultiple",
        suggestion: "scope the delete with .where(...) and finish with .deleteMultiple()",
    },
];

/// Terminal operations: calls that conclude a chain and trigger remote
/// work. Longest names first so the alternation never matches a prefix.
static TERMINAL_OPERATIONS: &[&str] = &[
    "insertOrUpdate",
    "updateMultiple",
    "deleteMultiple",
    "selectOne",
    "select",
    "getBy",
    "get",
    "insert",
    "update",
    "count",
    "avg",
    "min",
    "max",
    "sum",
];

/// Chain (non-terminal) operations, for the missing-parentheses check.
static CHAIN_METHODS: &[&str] = &[
    "disableAutoSysFields",
    "disableWorkflow",
    "whereNotNull",
    "orderByDesc",
    "forceUpdate",
    "whereNull",
    "aggregate",
    "orderBy",
    "orWhere",
    "groupBy",
    "having",
    "where",
    "limit",
];

/// The comparison operator allow-list for `where`/`orWhere`/`having`.
pub static VALID_OPERATORS: &[&str] = &[
    "=",
    "!=",
    ">",
    ">=",
    "<",
    "<=",
    "IN",
    "NOT IN",
    "STARTSWITH",
    "ENDSWITH",
    "CONTAINS",
    "DOES NOT CONTAIN",
    "SAMEAS",
    "NSAMEAS",
    "GT_FIELD",
    "GT_OR_EQUALS_FIELD",
    "LT_FIELD",
    "LT_OR_EQUALS_FIELD",
    "ON",
    "NOT ON",
    "EMPTYSTRING",
    "ANYTHING",
    "INSTANCEOF",
];

/// Field modifier allow-list (`field$MODIFIER`).
static VALID_FIELD_MODIFIERS: &[&str] = &[
    "DISPLAY",
    "CURRENCY_CODE",
    "CURRENCY_DISPLAY",
    "CURRENCY_STRING",
];

fn alternation(names: &[&str]) -> String {
    names
        .iter()
        .map(|n| regex::escape(n))
        .collect::<Vec<_>>()
        .join("|")
}

static UNDEFINED_METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    let names = alternation(
        &UNDEFINED_METHODS
            .iter()
            .map(|m| m.wrong)
            .collect::<Vec<_>>(),
    );
    Regex::new(&format!(r"\b({names})\s*\(")).unwrap()
});

static TERMINAL_CHAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    let ops = alternation(TERMINAL_OPERATIONS);
    // A terminal call whose result is immediately chained into another
    // terminal call in the same statement. Shallow on purpose: arguments
    // with nested parentheses are not modeled.
    Regex::new(&format!(
        r"\.\s*({ops})\s*\(([^()]*)\)\s*\.\s*({ops})\s*\("
    ))
    .unwrap()
});

static FILTER_CLAUSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    // .where('field', 'OP', value  — captures the operator literal from
    // the second string argument. Single- and double-quoted forms are
    // matched separately because this engine has no backreferences.
    Regex::new(
        r#"\.\s*(where|orWhere|having)\s*\(\s*(?:'[^']*'|"[^"]*")\s*,\s*(?:'([^']*)'|"([^"]*)")\s*,"#,
    )
    .unwrap()
});

static FIELD_MODIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9_]\$([A-Za-z_][A-Za-z0-9_]*)").unwrap());

static KNOWN_METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    let mut names: Vec<&str> = Vec::new();
    names.extend_from_slice(CHAIN_METHODS);
    names.extend_from_slice(TERMINAL_OPERATIONS);
    names.sort_by_key(|n| std::cmp::Reverse(n.len()));
    let names = alternation(&names);
    Regex::new(&format!(r"\.\s*({names})\b")).unwrap()
});

static OPTIONAL_UNWRAP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.\s*get\s*\(\s*\)").unwrap());

static LEGACY_CURSOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bRecordCursor\b").unwrap());

/// 1-based line of a byte offset: newlines before the offset, plus one.
fn line_of(script: &str, offset: usize) -> u32 {
    script[..offset].bytes().filter(|&b| b == b'\n').count() as u32 + 1
}

/// Suggest the closest allow-listed operator, if one is within edit
/// distance 2 of the rejected literal.
fn suggest_operator(bad: &str) -> Option<&'static str> {
    let mut best: Option<(usize, &'static str)> = None;
    for &op in VALID_OPERATORS {
        let dist = strsim::levenshtein(&bad.to_uppercase(), op);
        if dist <= 2 && best.map_or(true, |(d, _)| dist < d) {
            best = Some((dist, op));
        }
    }
    best.map(|(_, op)| op)
}

/// The static lint validator.
///
/// Instances are immutable after construction. The only configurable
/// knob is the length limit, which mirrors the screener's.
#[derive(Debug, Clone)]
pub struct SyntaxValidator {
    max_script_length: usize,
}

impl Default for SyntaxValidator {
    fn default() -> Self {
        Self {
            max_script_length: DEFAULT_MAX_SCRIPT_LENGTH,
        }
    }
}

impl SyntaxValidator {
    /// Create a validator with a custom script length limit.
    pub fn with_max_length(max_script_length: usize) -> Self {
        Self { max_script_length }
    }

    /// Validate a script. Never suspends, never performs I/O.
    pub fn validate(&self, script: &str) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if script.trim().is_empty() {
            errors.push(LintError {
                message: "script is empty".into(),
                line: Some(1),
            });
            return ValidationReport {
                valid: false,
                errors,
                warnings,
            };
        }
        if script.len() > self.max_script_length {
            errors.push(LintError {
                message: format!(
                    "script exceeds maximum length of {} characters (got {})",
                    self.max_script_length,
                    script.len()
                ),
                line: Some(1),
            });
            return ValidationReport {
                valid: false,
                errors,
                warnings,
            };
        }

        type Check = fn(&str, &mut Vec<LintError>, &mut Vec<String>);
        const CHECKS: &[Check] = &[
            check_undefined_methods,
            check_terminal_chaining,
            check_operators,
            check_field_modifiers,
            check_missing_parentheses,
            check_unguarded_unwrap,
            check_legacy_cursor_api,
        ];
        for check in CHECKS {
            check(script, &mut errors, &mut warnings);
        }

        ValidationReport {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

fn check_undefined_methods(script: &str, errors: &mut Vec<LintError>, _warnings: &mut Vec<String>) {
    for cap in UNDEFINED_METHOD_RE.captures_iter(script) {
        let m = cap.get(1).expect("group 1 always participates");
        let entry = UNDEFINED_METHODS
            .iter()
            .find(|e| e.wrong == m.as_str())
            .expect("matched name comes from the table");
        errors.push(LintError {
            message: format!(
                "Undefined method '{}()'. Use '{}()' instead: {}",
                entry.wrong, entry.correct, entry.suggestion
            ),
            line: Some(line_of(script, m.start())),
        });
    }
}

fn check_terminal_chaining(script: &str, errors: &mut Vec<LintError>, _warnings: &mut Vec<String>) {
    for cap in TERMINAL_CHAIN_RE.captures_iter(script) {
        let first = cap.get(1).expect("group 1 always participates");
        let second = cap.get(3).expect("group 3 always participates");

        // A zero-argument .get() after selectOne() is the optional unwrap
        // accessor, not a second terminal.
        if second.as_str() == "get" {
            let whole = cap.get(0).expect("group 0 always participates");
            let rest = &script[whole.end()..];
            if rest.trim_start().starts_with(')') {
                continue;
            }
        }

        errors.push(LintError {
            message: format!(
                "Cannot chain '{}()' after '{}()': a statement may trigger at most one terminal operation",
                second.as_str(),
                first.as_str()
            ),
            line: Some(line_of(script, second.start())),
        });
    }
}

fn check_operators(script: &str, errors: &mut Vec<LintError>, _warnings: &mut Vec<String>) {
    for cap in FILTER_CLAUSE_RE.captures_iter(script) {
        let clause = cap.get(1).expect("group 1 always participates");
        let op = cap
            .get(2)
            .or_else(|| cap.get(3))
            .expect("one quoted operator group participates");
        if VALID_OPERATORS.contains(&op.as_str()) {
            continue;
        }
        let mut message = format!(
            "Invalid comparison operator '{}' in {}(). Valid operators: {}",
            op.as_str(),
            clause.as_str(),
            VALID_OPERATORS.join(", ")
        );
        if let Some(suggestion) = suggest_operator(op.as_str()) {
            message.push_str(&format!(". Did you mean '{suggestion}'?"));
        }
        errors.push(LintError {
            message,
            line: Some(line_of(script, clause.start())),
        });
    }
}

fn check_field_modifiers(script: &str, _errors: &mut Vec<LintError>, warnings: &mut Vec<String>) {
    for cap in FIELD_MODIFIER_RE.captures_iter(script) {
        let modifier = cap.get(1).expect("group 1 always participates");
        if VALID_FIELD_MODIFIERS.contains(&modifier.as_str()) {
            continue;
        }
        warnings.push(format!(
            "Unknown field modifier '${}' on line {} — valid modifiers: {}",
            modifier.as_str(),
            line_of(script, modifier.start()),
            VALID_FIELD_MODIFIERS
                .iter()
                .map(|m| format!("${m}"))
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
}

fn check_missing_parentheses(script: &str, _errors: &mut Vec<LintError>, warnings: &mut Vec<String>) {
    for cap in KNOWN_METHOD_RE.captures_iter(script) {
        let m = cap.get(1).expect("group 1 always participates");
        let rest = &script[m.end()..];
        if rest.trim_start().starts_with('(') {
            continue;
        }
        warnings.push(format!(
            "Method '{}' on line {} is not followed by call parentheses",
            m.as_str(),
            line_of(script, m.start())
        ));
    }
}

fn check_unguarded_unwrap(script: &str, _errors: &mut Vec<LintError>, warnings: &mut Vec<String>) {
    // Heuristic: a zero-argument .get() unwraps the optional returned by
    // selectOne(). Without a presence check or fallback anywhere in the
    // script it throws on an empty result.
    if OPTIONAL_UNWRAP_RE.is_match(script)
        && !script.contains("isPresent")
        && !script.contains("ifPresent")
        && !script.contains("orElse")
    {
        warnings.push(
            "'.get()' unwraps an optional result; guard it with .isPresent() or supply .orElse(default)"
                .into(),
        );
    }
}

fn check_legacy_cursor_api(script: &str, _errors: &mut Vec<LintError>, warnings: &mut Vec<String>) {
    if let Some(m) = LEGACY_CURSOR_RE.find(script) {
        warnings.push(format!(
            "Legacy RecordCursor API on line {} — prefer the fluent record() builder",
            line_of(script, m.start())
        ));
    }
}
