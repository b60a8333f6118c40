// Tool-calling strategies
//
// Native: tool specs go to `Model::generate_with_tools` and calls come back
// structured. Prompted: the catalogue is written into the instructions, the
// model answers with `<tool_request>` blocks, and tool results are replayed as
// user turns. Both produce the same `AssistantMessage`.

use async_trait::async_trait;
use goalsmith_abstraction::{ChatMessage, MessageRole, Model, ModelError, ModelParameters, ModelResponse, ToolCall, ToolSpec};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};

use super::AssistantMessage;

static TOOL_REQUEST_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<tool_request>\s*(.*?)\s*</tool_request>").expect("tool request regex should be valid")
});

/// Prefix of a replayed tool result in the prompted path.
pub const TOOL_RESULT_PREFIX: &str = "TOOL_RESULT";

/// How tool calls travel between the adapter and the model.
#[async_trait]
pub trait ToolCallingStrategy: Send + Sync + std::fmt::Debug {
    /// Strategy name for logs.
    fn name(&self) -> &'static str;

    /// Instruction text describing the tools, when the model needs it in the prompt.
    fn catalogue(&self, tools: &[ToolSpec]) -> Option<String>;

    /// Converts a stored turn into what the model is shown.
    fn render_turn(&self, turn: &ChatMessage) -> ChatMessage;

    /// Sends the rendered messages.
    async fn request(
        &self,
        model: &dyn Model,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        parameters: ModelParameters,
    ) -> Result<ModelResponse, ModelError>;

    /// Turns a raw response into an assistant message. New call ids start at `next_call_index`.
    fn extract(&self, response: ModelResponse, next_call_index: usize) -> Result<AssistantMessage, String>;
}

/// Selects the strategy for a model with or without native tool calling.
pub fn for_capability(supports_tool_calling: bool) -> Box<dyn ToolCallingStrategy> {
    if supports_tool_calling { Box::new(NativeToolCalling) } else { Box::new(PromptedToolCalling) }
}

/// Tool calling through the model's own API.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeToolCalling;

#[async_trait]
impl ToolCallingStrategy for NativeToolCalling {
    fn name(&self) -> &'static str {
        "native"
    }

    fn catalogue(&self, _tools: &[ToolSpec]) -> Option<String> {
        None
    }

    fn render_turn(&self, turn: &ChatMessage) -> ChatMessage {
        turn.clone()
    }

    async fn request(
        &self,
        model: &dyn Model,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        parameters: ModelParameters,
    ) -> Result<ModelResponse, ModelError> {
        if tools.is_empty() {
            model.generate_chat_completion(messages, Some(parameters)).await
        } else {
            model.generate_with_tools(messages, tools, Some(parameters)).await
        }
    }

    fn extract(&self, response: ModelResponse, next_call_index: usize) -> Result<AssistantMessage, String> {
        let tool_calls = response
            .tool_calls
            .into_iter()
            .enumerate()
            .map(|(i, call)| ToolCall {
                id: if call.id.is_empty() { format!("call_{}", next_call_index + i) } else { call.id },
                arguments: if call.arguments.is_null() { json!({}) } else { call.arguments },
                ..call
            })
            .collect();
        Ok(AssistantMessage { content: response.content, tool_calls })
    }
}

#[derive(Debug, Deserialize)]
struct ToolRequestBlock {
    tool: String,
    #[serde(default)]
    arguments: Value,
}

/// Tool calling emulated through the prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptedToolCalling;

impl PromptedToolCalling {
    fn request_block(call: &ToolCall) -> String {
        format!(
            "<tool_request>{}</tool_request>",
            json!({ "tool": call.name, "arguments": call.arguments })
        )
    }
}

#[async_trait]
impl ToolCallingStrategy for PromptedToolCalling {
    fn name(&self) -> &'static str {
        "prompted"
    }

    fn catalogue(&self, tools: &[ToolSpec]) -> Option<String> {
        if tools.is_empty() {
            return None;
        }
        let mut text = String::from(
            "TOOLS:\n\
            You may call the tools listed below. To call one, reply with one block per call and nothing else:\n\
            <tool_request>{\"tool\": \"<tool name>\", \"arguments\": {\"<name>\": \"<value>\"}}</tool_request>\n\
            Each result comes back in a user message starting with TOOL_RESULT. \
            When you have what you need, reply with the final answer instead of a tool request.\n\n\
            Available tools:\n",
        );
        for tool in tools {
            text.push_str(&format!(
                "- {}: {}\n  arguments schema: {}\n",
                tool.name,
                tool.description,
                serde_json::to_string(&tool.input_schema).unwrap_or_default()
            ));
        }
        Some(text)
    }

    fn render_turn(&self, turn: &ChatMessage) -> ChatMessage {
        match turn.role {
            MessageRole::Tool => ChatMessage::user(format!(
                "{TOOL_RESULT_PREFIX}[{} {}]: {}",
                turn.name.as_deref().unwrap_or("tool"),
                turn.tool_call_id.as_deref().unwrap_or("-"),
                turn.content
            )),
            MessageRole::Assistant if !turn.tool_calls.is_empty() => {
                let blocks: Vec<String> = turn.tool_calls.iter().map(Self::request_block).collect();
                let content = if turn.content.is_empty() {
                    blocks.join("\n")
                } else {
                    format!("{}\n{}", turn.content, blocks.join("\n"))
                };
                ChatMessage::assistant(content)
            }
            _ => turn.clone(),
        }
    }

    async fn request(
        &self,
        model: &dyn Model,
        messages: &[ChatMessage],
        _tools: &[ToolSpec],
        parameters: ModelParameters,
    ) -> Result<ModelResponse, ModelError> {
        model.generate_chat_completion(messages, Some(parameters)).await
    }

    fn extract(&self, response: ModelResponse, next_call_index: usize) -> Result<AssistantMessage, String> {
        let mut tool_calls = Vec::new();
        for (i, capture) in TOOL_REQUEST_REGEX.captures_iter(&response.content).enumerate() {
            let body = capture.get(1).map_or("", |m| m.as_str());
            let block: ToolRequestBlock =
                serde_json::from_str(body).map_err(|e| format!("unreadable tool request: {e}"))?;
            tool_calls.push(ToolCall {
                id: format!("call_{}", next_call_index + i),
                name: block.tool,
                arguments: if block.arguments.is_null() { json!({}) } else { block.arguments },
            });
        }
        let content = TOOL_REQUEST_REGEX.replace_all(&response.content, "").trim().to_string();
        Ok(AssistantMessage { content, tool_calls })
    }
}
