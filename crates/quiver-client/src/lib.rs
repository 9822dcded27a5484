#![warn(missing_docs)]

//! # quiver-client
//!
//! The remote interpreter client for the Quiver gateway.
//!
//! Provides [`HttpInterpreter`] for running scripts against an
//! instance's script endpoint over HTTPS, and [`TimeoutInterpreter`] for
//! enforcing a per-call deadline around any interpreter.

pub mod timeout;

use std::time::Duration;

use anyhow::Context;
use quiver_error::RemoteError;
use quiver_pipeline::{RemoteInterpreter, RemoteOutcome};
use serde::{Deserialize, Serialize};

pub use timeout::TimeoutInterpreter;

/// Connection settings for one instance.
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    /// Base URL of the instance, e.g. `https://dev.example.com`.
    pub url: String,
    /// Bearer token presented on every request.
    pub token: String,
    /// Timeout applied when the caller supplies none.
    pub default_timeout: Duration,
}

/// Request body for the instance's script-run endpoint.
#[derive(Debug, Serialize)]
struct RunRequest<'a> {
    script: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_ms: Option<u64>,
}

/// Response envelope from the instance's script-run endpoint.
#[derive(Debug, Deserialize)]
struct RunResponse {
    status: String,
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    logs: Vec<String>,
    #[serde(default)]
    execution_time_ms: u64,
    #[serde(default)]
    error: Option<RunError>,
}

#[derive(Debug, Deserialize)]
struct RunError {
    message: String,
}

/// A client for one instance's remote script interpreter.
pub struct HttpInterpreter {
    config: InstanceConfig,
    client: reqwest::Client,
}

impl HttpInterpreter {
    /// Create a client for the given instance.
    pub fn new(config: InstanceConfig) -> anyhow::Result<Self> {
        if config.url.starts_with("http://") {
            tracing::warn!(
                url = %config.url,
                "instance URL uses plain http; the bearer token will travel unencrypted"
            );
        }
        let client = reqwest::Client::builder()
            .build()
            .context("failed to build the HTTP client")?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/script/run", self.config.url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl RemoteInterpreter for HttpInterpreter {
    #[tracing::instrument(skip(self, script), fields(script_len = script.len()))]
    async fn run_script(
        &self,
        script: &str,
        timeout: Option<Duration>,
    ) -> Result<RemoteOutcome, RemoteError> {
        let timeout = timeout.unwrap_or(self.config.default_timeout);
        let body = RunRequest {
            script,
            timeout_ms: Some(timeout.as_millis() as u64),
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.token)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RemoteError::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                    }
                } else {
                    RemoteError::Unreachable {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(RemoteError::Auth {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(RemoteError::InvalidResponse {
                message: format!("instance answered HTTP {status}"),
            });
        }

        let envelope: RunResponse =
            response
                .json()
                .await
                .map_err(|e| RemoteError::InvalidResponse {
                    message: e.to_string(),
                })?;

        match envelope.status.as_str() {
            "success" => Ok(RemoteOutcome {
                result: envelope.result,
                logs: envelope.logs,
                execution_time_ms: envelope.execution_time_ms,
            }),
            "failure" => Err(RemoteError::Execution {
                message: envelope
                    .error
                    .map(|e| e.message)
                    .unwrap_or_else(|| "instance reported failure without a message".into()),
            }),
            other => Err(RemoteError::InvalidResponse {
                message: format!("unknown response status '{other}'"),
            }),
        }
    }
}
