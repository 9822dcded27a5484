#![warn(missing_docs)]

//! # quiver-server
//!
//! MCP server for the Quiver fluent-query gateway.
//!
//! Exposes exactly two tools to agents:
//! - `validate` — lint a query script locally, no remote round-trip
//! - `execute` — screen a script and run it on the instance
//!
//! The confirmation policy for dangerous operations lives here, not in
//! the pipeline: the screener only reports what it found, and this layer
//! decides that unconfirmed bulk writes are bounced back to the caller.

use std::sync::Arc;
use std::time::Duration;

use quiver_pipeline::{ExecutionOptions, ExecutionPipeline};
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{Implementation, ServerCapabilities, ServerInfo};
use rmcp::schemars::JsonSchema;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use serde::Deserialize;

/// The Quiver MCP server handler.
#[derive(Clone)]
pub struct QuiverServer {
    pipeline: Arc<ExecutionPipeline>,
    default_max_results: usize,
    tool_router: ToolRouter<Self>,
}

impl QuiverServer {
    /// Create a server over an execution pipeline.
    pub fn new(pipeline: Arc<ExecutionPipeline>) -> Self {
        Self {
            pipeline,
            default_max_results: ExecutionOptions::default().max_results,
            tool_router: Self::tool_router(),
        }
    }

    /// Override the test-mode record cap used when a call supplies none.
    pub fn with_default_max_results(mut self, max_results: usize) -> Self {
        self.default_max_results = max_results;
        self
    }
}

/// Input for the `validate` tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct ValidateInput {
    /// The fluent query script to lint, e.g.
    /// `record('incident').where('active', '=', true).select('number')`.
    pub script: String,
}

/// Input for the `execute` tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct ExecuteInput {
    /// The fluent query script to run on the instance.
    pub script: String,

    /// Cap the result set for a safe exploratory run. Defaults to false.
    #[serde(default)]
    pub test_mode: bool,

    /// Maximum records returned in test mode. Defaults to 100.
    #[serde(default)]
    pub max_results: Option<usize>,

    /// Remote call timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Acknowledge dangerous operations (bulk delete/update, workflow
    /// suppression). Without this, scripts containing them are bounced
    /// back instead of executed.
    #[serde(default)]
    pub confirm_dangerous: bool,
}

#[tool_router(router = tool_router)]
impl QuiverServer {
    /// Lint a query script without running it.
    #[tool(
        name = "validate",
        description = "Lint a fluent query script without executing it. Reports structural errors (undefined methods, chained terminal operations, invalid comparison operators) with 1-based line numbers, plus advisory warnings (unknown field modifiers, unguarded optional unwraps, legacy cursor API usage). No remote call is made.\n\nExample script: `record('incident').where('priority', '<=', 2).orderByDesc('opened_at').select('number', 'short_description')`"
    )]
    pub async fn validate(
        &self,
        Parameters(input): Parameters<ValidateInput>,
    ) -> Result<String, String> {
        tracing::info!(script_len = input.script.len(), "validate: starting");

        let report = self.pipeline.validate(&input.script);
        serde_json::to_string_pretty(&report)
            .map_err(|e| format!("report serialization failed: {e}"))
    }

    /// Screen a query script and execute it on the instance.
    #[tool(
        name = "execute",
        description = "Screen a fluent query script and execute it on the instance. Scripts matching the security blacklist or exceeding the length limit are rejected before any remote call. Scripts containing dangerous operations (deleteMultiple, updateMultiple, disableWorkflow, disableAutoSysFields, forceUpdate) require confirm_dangerous=true.\n\nSet test_mode=true for exploratory runs: results are capped at max_results (default 100) and write operations are flagged in the logs. Without test mode, array results are capped at 1000 records.\n\nReturns {success, data, error, logs, execution_time_ms, truncated, record_count}."
    )]
    pub async fn execute(
        &self,
        Parameters(input): Parameters<ExecuteInput>,
    ) -> Result<String, String> {
        tracing::info!(
            script_len = input.script.len(),
            test_mode = input.test_mode,
            "execute: starting"
        );

        if !input.confirm_dangerous {
            let verdict = self.pipeline.screen(&input.script);
            if !verdict.dangerous_operations.is_empty() {
                let answer = serde_json::json!({
                    "success": false,
                    "error": format!(
                        "script contains operations that require confirmation: {}. \
                         Re-run with confirm_dangerous=true to proceed.",
                        verdict.dangerous_operations.join(", ")
                    ),
                    "dangerous_operations": verdict.dangerous_operations,
                });
                return serde_json::to_string_pretty(&answer)
                    .map_err(|e| format!("report serialization failed: {e}"));
            }
        }

        let options = ExecutionOptions {
            test_mode: input.test_mode,
            timeout: input.timeout_secs.map(Duration::from_secs),
            max_results: input.max_results.unwrap_or(self.default_max_results),
        };

        let report = self.pipeline.execute(&input.script, options).await;
        serde_json::to_string_pretty(&report)
            .map_err(|e| format!("report serialization failed: {e}"))
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for QuiverServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Quiver fluent-query gateway. \
                 Use validate() to lint a script locally, then execute() to run it on the instance.\n\
                 \n\
                 Scripts are method chains over the record() builder:\n\
                 `record('incident').where('priority', '<=', 2).select('number')`\n\
                 \n\
                 - Chain conditions with .where/.orWhere/.whereNull/.whereNotNull, order with \
                 .orderBy/.orderByDesc, cap with .limit(n)\n\
                 - Finish with exactly one terminal call: .select(), .selectOne(), .get(key), \
                 .insert(obj), .update(obj), .updateMultiple(obj), .deleteMultiple(), .count(), \
                 or an aggregate (.avg/.min/.max/.sum)\n\
                 - .selectOne() yields an optional: guard .get() with .isPresent() or use \
                 .orElse(default)\n\
                 \n\
                 execute() screens every script first; bulk writes and workflow suppression \
                 need confirm_dangerous=true. Prefer test_mode=true while exploring — results \
                 are capped and writes are flagged in the logs."
                    .into(),
            ),
            server_info: Implementation {
                name: "quiver".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
