//! Security screening for submitted scripts.
//!
//! The screener is the hard gate in front of the remote interpreter: a
//! script that trips the length limit or any blacklist pattern is
//! rejected outright, never "sanitized". Dangerous-operation detection is
//! deliberately separate — it reports operations a caller should confirm
//! (bulk writes, workflow suppression) without affecting the verdict.

use serde::Serialize;

use crate::catalog::Catalog;

/// The outcome of screening one script.
///
/// `safe` is true iff no length or blacklist violation occurred.
/// `dangerous_operations` is populated independently and never flips
/// `safe` on its own.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityVerdict {
    /// Whether the script may be sent to the instance.
    pub safe: bool,
    /// One entry per violated rule, in catalog order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<String>,
    /// Distinct confirmation-requiring operations found in the script.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dangerous_operations: Vec<String>,
}

/// Screens scripts against a [`Catalog`].
///
/// Pure: holds no mutable state, and a single screener may be shared
/// freely across concurrent screenings.
#[derive(Debug, Clone, Default)]
pub struct SecurityScreener {
    catalog: Catalog,
}

impl SecurityScreener {
    /// Create a screener over the given catalog.
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }

    /// The catalog this screener was built with.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Screen a script.
    ///
    /// Every blacklist pattern is tested — screening does not stop at the
    /// first hit, so a script violating three rules reports all three.
    pub fn screen(&self, script: &str) -> SecurityVerdict {
        let mut violations = Vec::new();

        let max = self.catalog.max_script_length();
        if script.len() > max {
            violations.push(format!(
                "script exceeds maximum length of {max} characters (got {})",
                script.len()
            ));
        }

        for pattern in self.catalog.blacklist() {
            if pattern.is_match(script) {
                violations.push(format!("blacklisted pattern matched: `{}`", pattern.source));
            }
        }

        // Independent of the verdict: operations the caller should confirm.
        let dangerous_operations: Vec<String> = self
            .catalog
            .dangerous_operations()
            .filter(|op| op.is_match(script))
            .map(|op| op.traits.name.to_string())
            .collect();

        if !violations.is_empty() {
            tracing::warn!(
                violations = violations.len(),
                script_len = script.len(),
                "script rejected by security screening"
            );
        }

        SecurityVerdict {
            safe: violations.is_empty(),
            violations,
            dangerous_operations,
        }
    }
}
