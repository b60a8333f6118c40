//! Model implementations for Goalsmith.
//!
//! This crate provides concrete implementations of the `Model` trait.
//!
//! # Supported Providers
//!
//! - **Mock**: scripted responses for tests, demos, and offline runs
//! - **Universal**: any OpenAI-compatible chat completions server (vLLM, LM Studio,
//!   hosted gateways), with native tool calling when the server supports it

pub mod capabilities;
pub mod factory;
pub mod universal;

use async_trait::async_trait;
use goalsmith_abstraction::{
    ChatMessage, Model, ModelError, ModelParameters, ModelResponse, ModelUsage, ToolSpec,
};
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

pub use capabilities::{ModelCapabilities, capabilities_for};
pub use factory::{ModelConfig, ModelFactory, ModelType};
pub use universal::UniversalModel;

/// One request observed by a [`MockModel`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    /// Messages exactly as the model received them.
    pub messages: Vec<ChatMessage>,
    /// Native tool definitions, empty for plain chat completions.
    pub tools: Vec<ToolSpec>,
}

/// A script entry: either bare reply text or a full response object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScriptEntry {
    Text(String),
    Response(ModelResponse),
}

/// A mock implementation of the `Model` trait for testing and demonstration.
///
/// Replies are taken from a script in order. Once the script runs dry the
/// model falls back to echoing a summary of the conversation.
#[derive(Debug, Default)]
pub struct MockModel {
    id: String,
    native_tools: bool,
    script: Mutex<VecDeque<Result<ModelResponse, ModelError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockModel {
    /// Creates a new `MockModel` with the given ID and an empty script.
    #[must_use]
    pub fn new(id: String) -> Self {
        Self { id, ..Self::default() }
    }

    /// Replaces the script with the given replies.
    #[must_use]
    pub fn with_script(self, replies: Vec<Result<ModelResponse, ModelError>>) -> Self {
        *self.script.lock().unwrap_or_else(PoisonError::into_inner) = replies.into();
        self
    }

    /// Enables or disables native tool calling.
    #[must_use]
    pub fn with_native_tools(mut self, enabled: bool) -> Self {
        self.native_tools = enabled;
        self
    }

    /// Loads a script from a JSON file holding an array of strings or response objects.
    ///
    /// # Errors
    /// Returns a `ModelError` if the file cannot be read or parsed.
    pub fn from_script_file(id: String, path: &Path) -> Result<Self, ModelError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ModelError::Other(format!("Failed to read mock script {}: {}", path.display(), e))
        })?;
        let entries: Vec<ScriptEntry> = serde_json::from_str(&raw)
            .map_err(|e| ModelError::SerializationError(format!("Invalid mock script: {}", e)))?;
        let replies = entries
            .into_iter()
            .map(|entry| match entry {
                ScriptEntry::Text(text) => Ok(ModelResponse::text(text)),
                ScriptEntry::Response(response) => Ok(response),
            })
            .collect();
        Ok(Self::new(id).with_native_tools(true).with_script(replies))
    }

    /// Returns every request seen so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of scripted replies not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn respond(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ModelResponse, ModelError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedRequest { messages: messages.to_vec(), tools: tools.to_vec() });

        let scripted = self.script.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        let mut response = match scripted {
            Some(reply) => reply?,
            None => {
                let mut summary = String::from("Conversation Summary:\n");
                for message in messages {
                    summary.push_str(&format!("  {}: {}\n", message.role, message.content));
                }
                ModelResponse::text(format!("Mock chat response from {}\n{summary}", self.id))
            }
        };

        let prompt_tokens = messages.iter().map(|m| count_tokens(&m.content)).sum::<u32>();
        let completion_tokens = count_tokens(&response.content);
        response.model_id.get_or_insert_with(|| self.id.clone());
        response.usage.get_or_insert(ModelUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        });
        Ok(response)
    }
}

#[async_trait]
impl Model for MockModel {
    async fn generate_chat_completion(
        &self,
        messages: &[ChatMessage],
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError> {
        debug!(
            model_id = %self.id,
            message_count = messages.len(),
            parameters = ?parameters,
            "MockModel generating chat completion"
        );
        self.respond(messages, &[])
    }

    async fn generate_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError> {
        if !self.native_tools {
            return Err(ModelError::UnsupportedCapability {
                capability: "tool_calling".to_string(),
                model: self.id.clone(),
            });
        }
        debug!(
            model_id = %self.id,
            message_count = messages.len(),
            tool_count = tools.len(),
            parameters = ?parameters,
            "MockModel generating chat completion with tools"
        );
        self.respond(messages, tools)
    }

    fn model_id(&self) -> &str {
        &self.id
    }
}

/// Count tokens in a string (simplified: word count).
#[allow(clippy::cast_possible_truncation)]
fn count_tokens(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}
