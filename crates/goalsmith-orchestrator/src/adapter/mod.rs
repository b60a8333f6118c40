// Model adapter
//
// Hides what a model can and cannot do natively. Two strategies are picked
// once at construction from the agent's capability flags: where instructions
// go, and how tool calls travel. After that every invocation looks the same to
// the runtime: a conversation goes in, an `AssistantMessage` comes out.

pub mod json;
pub mod placement;
pub mod tool_calling;

use goalsmith_abstraction::{ChatMessage, Model, ModelError, ModelParameters, ToolCall, ToolSpec};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{AgentConfig, AgentRole};
use crate::error::{PipelineError, Result};

pub use placement::InstructionPlacement;
pub use tool_calling::{NativeToolCalling, PromptedToolCalling, ToolCallingStrategy};

/// What the model said, normalized across strategies.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssistantMessage {
    /// Text content, with any emulated tool request blocks removed.
    pub content: String,
    /// Tool calls requested in this turn.
    pub tool_calls: Vec<ToolCall>,
}

impl AssistantMessage {
    /// Whether the model asked for tools.
    pub fn requests_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// The turns of one agent invocation, plus the instructions they run under.
///
/// Owned by the invocation that created it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversation {
    instructions: String,
    turns: Vec<ChatMessage>,
}

impl Conversation {
    /// Empty conversation under `instructions`.
    pub fn new(instructions: impl Into<String>) -> Self {
        Self { instructions: instructions.into(), turns: Vec::new() }
    }

    /// Adds the opening user turn.
    #[must_use]
    pub fn with_user(mut self, content: impl Into<String>) -> Self {
        self.push_user(content);
        self
    }

    /// Appends a user turn.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(ChatMessage::user(content));
    }

    /// Appends the model's reply.
    pub fn push_assistant(&mut self, message: &AssistantMessage) {
        self.turns.push(ChatMessage::assistant_with_tool_calls(message.content.clone(), message.tool_calls.clone()));
    }

    /// Appends the result of `call`.
    pub fn push_tool_result(&mut self, call: &ToolCall, content: impl Into<String>) {
        self.turns.push(ChatMessage::tool_result(call, content));
    }

    /// Agent instructions.
    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    /// Turns so far, in order.
    pub fn turns(&self) -> &[ChatMessage] {
        &self.turns
    }

    /// Tool calls requested so far.
    pub fn tool_call_count(&self) -> usize {
        self.turns.iter().map(|t| t.tool_calls.len()).sum()
    }
}

/// Uniform invocation interface over one model.
pub struct ModelAdapter {
    model: Arc<dyn Model>,
    role: AgentRole,
    parameters: ModelParameters,
    placement: InstructionPlacement,
    tool_calling: Box<dyn ToolCallingStrategy>,
    max_repair_attempts: u32,
}

impl std::fmt::Debug for ModelAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelAdapter")
            .field("model_id", &self.model.model_id())
            .field("role", &self.role)
            .field("placement", &self.placement)
            .field("tool_calling", &self.tool_calling.name())
            .field("max_repair_attempts", &self.max_repair_attempts)
            .finish_non_exhaustive()
    }
}

impl ModelAdapter {
    /// Binds `model` to the strategies `config`'s capability flags call for.
    pub fn new(model: Arc<dyn Model>, config: &AgentConfig) -> Self {
        let capabilities = config.capabilities();
        let adapter = Self {
            model,
            role: config.role,
            parameters: config.model_parameters(),
            placement: InstructionPlacement::for_capability(capabilities.supports_system_prompt),
            tool_calling: tool_calling::for_capability(capabilities.supports_tool_calling),
            max_repair_attempts: config.max_repair_attempts,
        };
        debug!(
            role = %adapter.role,
            model_id = %adapter.model.model_id(),
            placement = ?adapter.placement,
            tool_calling = adapter.tool_calling.name(),
            "Model adapter ready"
        );
        adapter
    }

    /// Identifier of the bound model.
    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    /// Where instructions are placed.
    pub const fn placement(&self) -> InstructionPlacement {
        self.placement
    }

    /// Name of the tool-calling strategy in use.
    pub fn tool_calling(&self) -> &'static str {
        self.tool_calling.name()
    }

    /// Messages exactly as the model will receive them.
    pub fn render(&self, conversation: &Conversation, tools: &[ToolSpec]) -> Vec<ChatMessage> {
        let instructions = match self.tool_calling.catalogue(tools) {
            Some(catalogue) if conversation.instructions().is_empty() => catalogue,
            Some(catalogue) => format!("{}\n\n{catalogue}", conversation.instructions()),
            None => conversation.instructions().to_string(),
        };
        let turns = conversation.turns().iter().map(|t| self.tool_calling.render_turn(t)).collect();
        self.placement.render(&instructions, turns)
    }

    /// Sends the conversation and normalizes the reply.
    ///
    /// An emulated tool request that cannot be read is sent back with a repair
    /// prompt, at most `max_repair_attempts` times; those exchanges are
    /// appended to `conversation`.
    ///
    /// # Errors
    /// `ModelUnavailable` when the provider fails, `MalformedResponse` when an
    /// emulated tool request is still unreadable after the repairs, `Config`
    /// when the model refuses a capability its configuration claims.
    pub async fn invoke(&self, conversation: &mut Conversation, tools: &[ToolSpec]) -> Result<AssistantMessage> {
        let mut repairs = 0;
        loop {
            let messages = self.render(conversation, tools);
            debug!(
                role = %self.role,
                model_id = %self.model.model_id(),
                message_count = messages.len(),
                tool_count = tools.len(),
                "Invoking model"
            );

            let response = self
                .tool_calling
                .request(self.model.as_ref(), &messages, tools, self.parameters.clone())
                .await
                .map_err(|e| self.map_model_error(e))?;
            let raw = response.content.clone();

            let reason = match self.tool_calling.extract(response, conversation.tool_call_count()) {
                Ok(message) => return Ok(message),
                Err(reason) => reason,
            };
            if repairs >= self.max_repair_attempts {
                warn!(role = %self.role, repairs, reason = %reason, "Tool request still unreadable after repairs");
                return Err(PipelineError::MalformedResponse { role: self.role.to_string(), reason });
            }
            repairs += 1;
            warn!(role = %self.role, repair = repairs, reason = %reason, "Tool request unreadable, asking again");
            conversation.push_assistant(&AssistantMessage { content: raw, tool_calls: Vec::new() });
            conversation.push_user(tool_request_repair_prompt(&reason));
        }
    }

    /// Parses the final reply with `parse`, re-prompting for strict JSON on failure.
    ///
    /// The reply and every repair exchange are appended to `conversation`.
    ///
    /// # Errors
    /// `MalformedResponse` once `max_repair_attempts` re-prompts have failed,
    /// or any error from the repair invocations themselves.
    pub async fn finalize<T, F>(
        &self,
        conversation: &mut Conversation,
        reply: AssistantMessage,
        tools: &[ToolSpec],
        parse: F,
    ) -> Result<T>
    where
        F: Fn(&Value) -> std::result::Result<T, String> + Send + Sync,
        T: Send,
    {
        let mut reply = reply;
        let mut repairs = 0;
        loop {
            let parsed = if reply.requests_tools() {
                Err("expected the final JSON answer, got a tool request".to_string())
            } else {
                json::extract_json(&reply.content).and_then(|value| parse(&value))
            };
            conversation.push_assistant(&reply);

            let reason = match parsed {
                Ok(output) => return Ok(output),
                Err(reason) => reason,
            };
            if repairs >= self.max_repair_attempts {
                warn!(role = %self.role, repairs, reason = %reason, "Output still malformed after repairs");
                return Err(PipelineError::MalformedResponse { role: self.role.to_string(), reason });
            }
            repairs += 1;
            warn!(role = %self.role, repair = repairs, reason = %reason, "Output malformed, asking for strict JSON");
            conversation.push_user(repair_prompt(&reason));
            reply = self.invoke(conversation, tools).await?;
        }
    }

    fn map_model_error(&self, err: ModelError) -> PipelineError {
        warn!(role = %self.role, model_id = %self.model.model_id(), error = %err, "Model call failed");
        match err {
            ModelError::UnsupportedCapability { capability, model } => PipelineError::Config {
                reason: format!("model '{model}' does not support {capability} but is configured to use it"),
            },
            ModelError::SerializationError(reason) => {
                PipelineError::MalformedResponse { role: self.role.to_string(), reason }
            }
            other => PipelineError::ModelUnavailable { reason: other.to_string() },
        }
    }
}

fn tool_request_repair_prompt(reason: &str) -> String {
    format!(
        "Your tool request could not be read ({reason}). Send it again as one block of strict JSON: \
        <tool_request>{{\"tool\": \"<name>\", \"arguments\": {{...}}}}</tool_request>, or give your final answer."
    )
}

fn repair_prompt(reason: &str) -> String {
    format!(
        "Your previous reply could not be used ({reason}). Reformat it as strict JSON: reply with ONLY the JSON \
        object from the output contract, with no prose, no code fences, and no trailing commas."
    )
}
