#![warn(missing_docs)]

//! # quiver-pipeline
//!
//! Script screening, lint validation, and execution for the Quiver
//! fluent-query gateway.
//!
//! A submitted script flows through three independent stages:
//!
//! - **Security screening** ([`screen`]) — blacklist and length checks
//!   (a hard gate) plus dangerous-operation detection (informational,
//!   for caller confirmation flows).
//! - **Lint validation** ([`lint`]) — shallow, pattern-driven structural
//!   checks with line-accurate errors and advisory warnings. Never
//!   touches the network.
//! - **Execution** ([`execute`]) — the orchestrator: screen, optionally
//!   rewrite for test mode, delegate to a [`RemoteInterpreter`], and
//!   normalize whatever comes back ([`normalize`]).
//!
//! ## Concurrency model
//!
//! Everything is a pure function over its inputs except the remote call.
//! No component holds mutable state, so one pipeline instance serves
//! concurrent calls without locking. There is no retry logic anywhere:
//! every failure is terminal for its invocation and reported as data.

pub mod audit;
pub mod catalog;
pub mod error;
pub mod execute;
pub mod lint;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod normalize;
pub mod screen;
pub mod wrap;

use std::time::Duration;

use serde_json::Value;

pub use catalog::{Catalog, CatalogOverrides};
pub use error::PipelineError;
pub use execute::{ExecutionPipeline, ExecutionReport};
pub use lint::{SyntaxValidator, ValidationReport};
pub use screen::{SecurityScreener, SecurityVerdict};

use quiver_error::RemoteError;

/// Options for one execution request.
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Deadline handed through to the remote interpreter. Advisory: the
    /// pipeline does not enforce it locally.
    pub timeout: Option<Duration>,
    /// Whether to cap the result set for a safe exploratory run.
    pub test_mode: bool,
    /// Maximum records returned in test mode. Ignored otherwise.
    pub max_results: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            test_mode: false,
            max_results: 100,
        }
    }
}

/// A successful remote run.
#[derive(Debug, Clone)]
pub struct RemoteOutcome {
    /// The interpreter's raw result, before normalization.
    pub result: Value,
    /// Diagnostic lines the interpreter produced, in order.
    pub logs: Vec<String>,
    /// The interpreter's self-reported execution time.
    pub execution_time_ms: u64,
}

/// Trait for the remote script interpreter this pipeline delegates to.
///
/// Implementations hold credentials and transport state; the pipeline
/// treats the interpreter as opaque — it does not know or care how the
/// script is actually run on the instance.
#[async_trait::async_trait]
pub trait RemoteInterpreter: Send + Sync {
    /// Run a script on the instance.
    ///
    /// - `script`: the (possibly test-mode-wrapped) script text
    /// - `timeout`: advisory deadline; honoring it is the
    ///   implementation's responsibility
    async fn run_script(
        &self,
        script: &str,
        timeout: Option<Duration>,
    ) -> Result<RemoteOutcome, RemoteError>;
}
