//! The pattern catalog: the static configuration the screener and the
//! write-operation detector share.
//!
//! A [`Catalog`] is immutable once built. Reconfiguration happens by
//! building a replacement instance from [`CatalogOverrides`], never by
//! mutating a live catalog — screeners hold their catalog by value and
//! concurrent screenings can never observe a half-updated pattern set.

use regex::{Regex, RegexBuilder};

use crate::error::PipelineError;

/// Maximum script length in characters.
pub const DEFAULT_MAX_SCRIPT_LENGTH: usize = 10_000;

/// Patterns that are banned from submitted scripts.
///
/// Each entry is a regex source; the source string itself is quoted in
/// violation messages so callers can see which rule fired. All patterns
/// are applied case-insensitively.
pub const DEFAULT_BLACKLIST: &[&str] = &[
    // Raw SQL reaching the store behind the DSL's back
    r"drop\s+table",
    r"truncate\s+table",
    r"delete\s+from",
    r"alter\s+table",
    // Dynamic code generation inside the interpreter
    r"eval\s*\(",
    r"new\s+Function",
    // Instance tampering
    r"setSystemProperty\s*\(",
    r"impersonate\s*\(",
];

/// Traits of a single DSL operation, shared by the security screener and
/// the orchestrator's write-operation detector.
///
/// One table serves both consumers so the two can never drift apart:
/// `requires_confirmation` drives the screener's dangerous-operation
/// report, `persists` drives the test-mode write warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationTraits {
    /// The method name as it appears in a chain (`.name(`).
    pub name: &'static str,
    /// Whether a caller should confirm before running this operation.
    pub requires_confirmation: bool,
    /// Whether this operation writes to the record store.
    pub persists: bool,
}

/// The operations the catalog knows about beyond plain reads.
pub const OPERATION_TABLE: &[OperationTraits] = &[
    OperationTraits {
        name: "insert",
        requires_confirmation: false,
        persists: true,
    },
    OperationTraits {
        name: "update",
        requires_confirmation: false,
        persists: true,
    },
    OperationTraits {
        name: "insertOrUpdate",
        requires_confirmation: false,
        persists: true,
    },
    OperationTraits {
        name: "updateMultiple",
        requires_confirmation: true,
        persists: true,
    },
    OperationTraits {
        name: "deleteMultiple",
        requires_confirmation: true,
        persists: true,
    },
    OperationTraits {
        name: "disableWorkflow",
        requires_confirmation: true,
        persists: false,
    },
    OperationTraits {
        name: "disableAutoSysFields",
        requires_confirmation: true,
        persists: false,
    },
    OperationTraits {
        name: "forceUpdate",
        requires_confirmation: true,
        persists: false,
    },
];

/// A compiled blacklist entry: the regex plus the source string used in
/// violation messages.
#[derive(Debug, Clone)]
pub struct BlacklistPattern {
    /// The pattern source, quoted in violation messages.
    pub source: String,
    regex: Regex,
}

impl BlacklistPattern {
    fn compile(source: &str) -> Result<Self, PipelineError> {
        let regex = RegexBuilder::new(source)
            .case_insensitive(true)
            .build()
            .map_err(|e| PipelineError::InvalidPattern {
                pattern: source.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    /// Whether the pattern matches anywhere in the script.
    pub fn is_match(&self, script: &str) -> bool {
        self.regex.is_match(script)
    }
}

/// A compiled dangerous-operation matcher: the operation name plus a
/// whitespace-tolerant, case-insensitive matcher for its call shape.
#[derive(Debug, Clone)]
pub struct OperationMatcher {
    /// The canonical operation name, reported in verdicts and warnings.
    pub traits: OperationTraits,
    regex: Regex,
}

impl OperationMatcher {
    fn compile(traits: OperationTraits) -> Self {
        // `.  deleteMultiple (` and `.DELETEMULTIPLE(` must both match.
        let source = format!(r"\.\s*{}\s*\(", regex::escape(traits.name));
        let regex = RegexBuilder::new(&source)
            .case_insensitive(true)
            .build()
            .expect("operation matcher source is static and valid");
        Self { traits, regex }
    }

    /// Whether the operation is called anywhere in the script.
    pub fn is_match(&self, script: &str) -> bool {
        self.regex.is_match(script)
    }
}

/// Overrides merged over the defaults when building a [`Catalog`].
///
/// Every field is optional; `None` keeps the default. The merge produces
/// a brand-new catalog — existing instances are never touched.
#[derive(Debug, Clone, Default)]
pub struct CatalogOverrides {
    /// Replacement blacklist pattern sources.
    pub blacklist: Option<Vec<String>>,
    /// Extra blacklist pattern sources appended to the active list.
    pub extra_blacklist: Vec<String>,
    /// Replacement maximum script length.
    pub max_script_length: Option<usize>,
}

/// The immutable pattern catalog.
#[derive(Debug, Clone)]
pub struct Catalog {
    blacklist: Vec<BlacklistPattern>,
    operations: Vec<OperationMatcher>,
    max_script_length: usize,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::with_overrides(CatalogOverrides::default())
            .expect("default catalog patterns are static and valid")
    }
}

impl Catalog {
    /// Build a catalog from the defaults with the given overrides merged
    /// field by field.
    pub fn with_overrides(overrides: CatalogOverrides) -> Result<Self, PipelineError> {
        let mut sources: Vec<String> = match overrides.blacklist {
            Some(list) => list,
            None => DEFAULT_BLACKLIST.iter().map(|s| s.to_string()).collect(),
        };
        sources.extend(overrides.extra_blacklist);

        let blacklist = sources
            .iter()
            .map(|s| BlacklistPattern::compile(s))
            .collect::<Result<Vec<_>, _>>()?;

        let operations = OPERATION_TABLE
            .iter()
            .copied()
            .map(OperationMatcher::compile)
            .collect();

        Ok(Self {
            blacklist,
            operations,
            max_script_length: overrides
                .max_script_length
                .unwrap_or(DEFAULT_MAX_SCRIPT_LENGTH),
        })
    }

    /// The compiled blacklist.
    pub fn blacklist(&self) -> &[BlacklistPattern] {
        &self.blacklist
    }

    /// All known non-read operations.
    pub fn operations(&self) -> &[OperationMatcher] {
        &self.operations
    }

    /// Operations requiring explicit caller confirmation.
    pub fn dangerous_operations(&self) -> impl Iterator<Item = &OperationMatcher> + '_ {
        self.operations
            .iter()
            .filter(|op| op.traits.requires_confirmation)
    }

    /// Operations that persist data to the store.
    pub fn write_operations(&self) -> impl Iterator<Item = &OperationMatcher> + '_ {
        self.operations.iter().filter(|op| op.traits.persists)
    }

    /// The maximum accepted script length in characters.
    pub fn max_script_length(&self) -> usize {
        self.max_script_length
    }
}
