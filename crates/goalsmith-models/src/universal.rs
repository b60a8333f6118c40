//! Universal OpenAI-compatible model implementation.
//!
//! This module provides an implementation of the `Model` trait for any server that implements
//! the OpenAI Chat Completions API specification: vLLM, LM Studio, LocalAI, Ollama's `/v1`
//! endpoints, and hosted gateways that front other providers with the same wire format.
//!
//! Native tool calling uses the `tools` / `tool_calls` fields of that API. Whether a given
//! model actually honours them is a property of the model, not of this client; callers pick
//! `generate_with_tools` only for models that do.
//!
//! The API key, when there is one, is resolved by the caller (see the agent's
//! `api_key_env`) and passed to `with_api_key()`; local servers use `without_auth()`.

use async_trait::async_trait;
use goalsmith_abstraction::{
    ChatMessage, Model, ModelError, ModelParameters, ModelResponse, ModelUsage,
    ToolCall, ToolSpec,
};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Universal OpenAI-compatible model implementation.
#[derive(Debug, Clone)]
pub struct UniversalModel {
    /// The model identifier (e.g., "llama-3-70b", "mistral-7b").
    model_id: String,
    /// Base URL for the API endpoint (e.g., "http://localhost:8000/v1").
    base_url: String,
    /// Optional API key (some local servers don't require auth).
    api_key: Option<String>,
    /// HTTP client for requests.
    client: Client,
}

impl UniversalModel {
    /// Creates a new `UniversalModel` with an explicit API key.
    #[must_use]
    pub fn with_api_key(model_id: String, base_url: String, api_key: String) -> Self {
        Self { model_id, base_url, api_key: Some(api_key), client: build_client() }
    }

    /// Creates a new `UniversalModel` without authentication.
    #[must_use]
    pub fn without_auth(model_id: String, base_url: String) -> Self {
        Self { model_id, base_url, api_key: None, client: build_client() }
    }

    fn to_wire_message(message: &ChatMessage) -> WireMessage {
        let tool_calls = if message.tool_calls.is_empty() {
            None
        } else {
            Some(
                message
                    .tool_calls
                    .iter()
                    .map(|call| WireToolCall {
                        id: call.id.clone(),
                        call_type: "function".to_string(),
                        function: WireFunctionCall {
                            name: call.name.clone(),
                            arguments: call.arguments.to_string(),
                        },
                    })
                    .collect(),
            )
        };
        WireMessage {
            role: message.role.to_string(),
            content: Some(message.content.clone()),
            tool_calls,
            tool_call_id: message.tool_call_id.clone(),
        }
    }

    fn to_wire_tool(spec: &ToolSpec) -> WireTool {
        WireTool {
            tool_type: "function".to_string(),
            function: WireFunction {
                name: spec.name.clone(),
                description: spec.description.clone(),
                parameters: spec.input_schema.clone(),
            },
        }
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        tools: Option<Vec<WireTool>>,
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let parameters = parameters.unwrap_or_default();

        let request_body = WireRequest {
            model: self.model_id.clone(),
            messages: messages.iter().map(Self::to_wire_message).collect(),
            temperature: parameters.temperature,
            top_p: parameters.top_p,
            max_tokens: parameters.max_tokens,
            stop: parameters.stop_sequences,
            tools,
        };

        let mut request = self.client.post(&url).json(&request_body);
        if let Some(ref api_key) = self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| {
            error!(error = %e, url = %url, "Failed to send request to OpenAI-compatible API");
            if e.is_timeout() {
                ModelError::Timeout(format!("{} did not answer: {}", url, e))
            } else {
                ModelError::RequestError(format!("Network error: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %error_text, url = %url, "OpenAI-compatible API returned error status");
            return Err(Self::map_status(status, error_text));
        }

        let body: WireResponse = response.json().await.map_err(|e| {
            ModelError::SerializationError(format!("Failed to parse chat completion: {}", e))
        })?;

        let choice = body.choices.into_iter().next().ok_or_else(|| {
            ModelError::ModelResponseError("Chat completion contained no choices".to_string())
        })?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| {
                let arguments = if call.function.arguments.trim().is_empty() {
                    Value::Object(serde_json::Map::new())
                } else {
                    serde_json::from_str(&call.function.arguments).map_err(|e| {
                        ModelError::SerializationError(format!(
                            "Tool call '{}' carried invalid JSON arguments: {}",
                            call.function.name, e
                        ))
                    })?
                };
                Ok(ToolCall { id: call.id, name: call.function.name, arguments })
            })
            .collect::<Result<Vec<_>, ModelError>>()?;

        Ok(ModelResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            model_id: body.model.or_else(|| Some(self.model_id.clone())),
            usage: body.usage.map(|u| ModelUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }

    fn map_status(status: StatusCode, error_text: String) -> ModelError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ModelError::UnsupportedModelProvider(
                format!("Authentication failed ({}): {}", status, error_text),
            ),
            StatusCode::TOO_MANY_REQUESTS => {
                ModelError::QuotaExceeded { provider: "universal".to_string(), message: Some(error_text) }
            }
            s if s.is_server_error() => {
                ModelError::RequestError(format!("Server error ({}): {}", status, error_text))
            }
            _ => ModelError::ModelResponseError(format!("API error ({}): {}", status, error_text)),
        }
    }
}

fn build_client() -> Client {
    Client::builder().timeout(DEFAULT_TIMEOUT).build().unwrap_or_else(|_| Client::new())
}

#[async_trait]
impl Model for UniversalModel {
    async fn generate_chat_completion(
        &self,
        messages: &[ChatMessage],
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError> {
        debug!(
            model_id = %self.model_id,
            message_count = messages.len(),
            parameters = ?parameters,
            "UniversalModel generating chat completion"
        );
        self.send(messages, None, parameters).await
    }

    async fn generate_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError> {
        debug!(
            model_id = %self.model_id,
            message_count = messages.len(),
            tool_count = tools.len(),
            "UniversalModel generating chat completion with tools"
        );
        let wire_tools = (!tools.is_empty()).then(|| tools.iter().map(Self::to_wire_tool).collect());
        self.send(messages, wire_tools, parameters).await
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// OpenAI-compatible chat completion request.
#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: WireFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}
