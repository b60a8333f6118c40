//! HTTP tool target.
//!
//! Request: `POST {url}` with `{tool_name, arguments, correlation_id}` and an
//! optional bearer token. Response: `{result, error_code}`.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

use super::ToolOutcome;
use crate::error::{PipelineError, Result};

#[derive(Debug, Serialize)]
struct RemoteToolRequest<'a> {
    tool_name: &'a str,
    arguments: &'a Value,
    correlation_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct RemoteToolResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error_code: Option<String>,
}

/// A tool endpoint.
#[derive(Debug, Clone)]
pub struct RemoteEndpoint {
    url: String,
    client: Client,
}

impl RemoteEndpoint {
    /// Endpoint at `url`. The gateway applies the call timeout.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), client: Client::new() }
    }

    /// Endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Posts one tool call.
    ///
    /// # Errors
    /// Transport failures, non-success statuses, and unreadable bodies become
    /// `ToolExecutionFailed`. A well-formed body with an `error_code` is a
    /// normal outcome.
    pub async fn invoke(
        &self,
        tool_name: &str,
        arguments: &Value,
        correlation_id: &str,
        token: Option<&str>,
    ) -> Result<ToolOutcome> {
        let failed = |reason: String| PipelineError::ToolExecutionFailed { tool: tool_name.to_string(), reason };

        let mut request =
            self.client.post(&self.url).json(&RemoteToolRequest { tool_name, arguments, correlation_id });
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            error!(tool = %tool_name, url = %self.url, correlation_id = %correlation_id, error = %e, "Remote tool request failed");
            failed(format!("request failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(tool = %tool_name, status = %status, correlation_id = %correlation_id, "Remote tool returned error status");
            return Err(failed(format!("endpoint returned {status}: {body}")));
        }

        let body: RemoteToolResponse =
            response.json().await.map_err(|e| failed(format!("unreadable response: {e}")))?;
        Ok(ToolOutcome { payload: body.result, error_code: body.error_code })
    }
}
