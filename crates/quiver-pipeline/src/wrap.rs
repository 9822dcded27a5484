//! Test-mode script wrapping.
//!
//! Test mode caps the number of records an exploratory run may return.
//! The cap is applied by rewriting the script: the original text is
//! embedded verbatim inside a wrapper function that measures the result
//! and, when an array exceeds the limit, returns a tagged envelope with
//! the original count and a truncated copy. Non-array results pass
//! through unchanged.
//!
//! The rewrite is text-to-text code generation, so it only accepts
//! scripts it can embed safely: a single expression with balanced
//! delimiters. Anything else is an explicit unsupported case, never a
//! silent mis-wrap.

use thiserror::Error;

use crate::catalog::Catalog;

/// The envelope tag the wrapper stamps on truncated results. The result
/// normalizer looks for this key.
pub const TEST_MODE_TAG: &str = "__testMode";

/// Maximum bracket/brace/paren nesting accepted for wrapping.
const MAX_NESTING_DEPTH: usize = 64;

/// Why a script cannot be wrapped for test mode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WrapError {
    /// The script is more than one statement.
    #[error("only single-expression scripts are supported; split multi-statement scripts or run without test mode")]
    NotAnExpression,

    /// The script starts with a declaration or control-flow keyword.
    #[error("script starts with '{keyword}', which is a statement; test mode wraps a single expression")]
    StatementKeyword {
        /// The offending leading keyword.
        keyword: String,
    },

    /// Delimiters do not balance, so embedding the text would produce
    /// garbage.
    #[error("unbalanced delimiters (depth check failed)")]
    UnbalancedDelimiters,

    /// The script nests deeper than the wrapper is willing to embed.
    #[error("nesting depth exceeds {max}")]
    NestingTooDeep {
        /// Maximum allowed nesting depth.
        max: usize,
    },
}

/// Scan delimiter nesting, ignoring quoted string contents.
///
/// Returns the maximum depth, or `None` if the delimiters never balance
/// back to zero.
fn scan_nesting(script: &str) -> Option<usize> {
    let mut depth: i64 = 0;
    let mut max_depth: i64 = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for ch in script.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => quote = Some(ch),
            '(' | '[' | '{' => {
                depth += 1;
                max_depth = max_depth.max(depth);
            }
            ')' | ']' | '}' => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            _ => {}
        }
    }
    if depth != 0 || quote.is_some() {
        return None;
    }
    Some(max_depth as usize)
}

/// Whether the script is a single expression the wrapper can embed.
fn check_expression_shaped(script: &str) -> Result<(), WrapError> {
    let trimmed = script.trim().trim_end_matches(';').trim_end();

    for keyword in ["var", "let", "const", "if", "for", "while", "function", "return"] {
        let shaped = format!("{keyword} ");
        if trimmed.starts_with(&shaped) || trimmed == keyword {
            return Err(WrapError::StatementKeyword {
                keyword: keyword.to_string(),
            });
        }
    }

    match scan_nesting(trimmed) {
        None => return Err(WrapError::UnbalancedDelimiters),
        Some(depth) if depth > MAX_NESTING_DEPTH => {
            return Err(WrapError::NestingTooDeep {
                max: MAX_NESTING_DEPTH,
            })
        }
        Some(_) => {}
    }

    // A second statement after the stripped trailing terminator means
    // this is not expression-shaped. Quoted semicolons don't count.
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for ch in trimmed.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => quote = Some(ch),
            ';' => return Err(WrapError::NotAnExpression),
            _ => {}
        }
    }

    Ok(())
}

/// Rewrite a script so an array result larger than `max_results` comes
/// back as a tagged, truncated envelope.
pub fn wrap_for_test_mode(script: &str, max_results: usize) -> Result<String, WrapError> {
    check_expression_shaped(script)?;
    let expression = script.trim().trim_end_matches(';').trim_end();

    Ok(format!(
        "(function () {{\n    \
             var __result = ({expression});\n    \
             if (Array.isArray(__result) && __result.length > {max_results}) {{\n        \
                 return {{ {TEST_MODE_TAG}: true, truncated: true, totalRecords: __result.length, data: __result.slice(0, {max_results}) }};\n    \
             }}\n    \
             return __result;\n\
         }})();"
    ))
}

/// All write-style operations the script calls, in catalog order.
///
/// Shares the catalog's operation table with the security screener, so
/// the two detectors cannot drift apart.
pub fn detect_write_operations(script: &str, catalog: &Catalog) -> Vec<&'static str> {
    catalog
        .write_operations()
        .filter(|op| op.is_match(script))
        .map(|op| op.traits.name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_a_simple_chain() {
        let wrapped = wrap_for_test_mode("record('incident').select()", 100).unwrap();
        assert!(wrapped.contains("record('incident').select()"));
        assert!(wrapped.contains(TEST_MODE_TAG));
        assert!(wrapped.contains("__result.length > 100"));
        assert!(wrapped.contains("slice(0, 100)"));
    }

    #[test]
    fn strips_a_trailing_semicolon_before_embedding() {
        let wrapped = wrap_for_test_mode("record('incident').select();", 50).unwrap();
        assert!(wrapped.contains("(record('incident').select());"));
    }

    #[test]
    fn rejects_multi_statement_scripts() {
        let err = wrap_for_test_mode(
            "record('a').select(); record('b').select()",
            100,
        )
        .unwrap_err();
        assert_eq!(err, WrapError::NotAnExpression);
    }

    #[test]
    fn rejects_declaration_scripts() {
        let err = wrap_for_test_mode("var x = record('incident').select()", 100).unwrap_err();
        assert!(matches!(err, WrapError::StatementKeyword { ref keyword } if keyword == "var"));
    }

    #[test]
    fn rejects_unbalanced_delimiters() {
        let err = wrap_for_test_mode("record('incident'.select()", 100).unwrap_err();
        assert_eq!(err, WrapError::UnbalancedDelimiters);
    }

    #[test]
    fn quoted_semicolons_and_parens_are_not_structural() {
        let wrapped =
            wrap_for_test_mode("record('incident').where('note', '=', 'a;b)c').select()", 100);
        assert!(wrapped.is_ok(), "{wrapped:?}");
    }

    #[test]
    fn rejects_excessive_nesting() {
        let script = format!("{}x{}", "(".repeat(65), ")".repeat(65));
        let err = wrap_for_test_mode(&script, 100).unwrap_err();
        assert!(matches!(err, WrapError::NestingTooDeep { max: 64 }));
    }

    #[test]
    fn detects_write_operations_from_the_shared_table() {
        let catalog = Catalog::default();
        let ops = detect_write_operations(
            "record('incident').where('active', '=', false).deleteMultiple()",
            &catalog,
        );
        assert_eq!(ops, vec!["deleteMultiple"]);

        let ops = detect_write_operations(
            "record('incident').insert({short_description: 'x'})",
            &catalog,
        );
        assert_eq!(ops, vec!["insert"]);
    }

    #[test]
    fn read_only_script_has_no_write_operations() {
        let catalog = Catalog::default();
        assert!(detect_write_operations("record('incident').select()", &catalog).is_empty());
    }

    #[test]
    fn non_persisting_dangerous_ops_are_not_writes() {
        let catalog = Catalog::default();
        let ops = detect_write_operations(
            "record('incident').forceUpdate().update({state: 2})",
            &catalog,
        );
        assert_eq!(ops, vec!["update"]);
    }
}
