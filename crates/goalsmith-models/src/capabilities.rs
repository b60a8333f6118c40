//! Known capability gaps of hosted models.
//!
//! Most chat models accept a system slot and native tool definitions. The
//! ones listed here do not, and the orchestrator has to compensate.

use serde::{Deserialize, Serialize};

/// What a model can accept natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCapabilities {
    /// Whether a dedicated system message is honoured.
    pub supports_system_prompt: bool,
    /// Whether tool definitions can be passed and tool calls returned natively.
    pub supports_tool_calling: bool,
}

impl Default for ModelCapabilities {
    fn default() -> Self {
        Self { supports_system_prompt: true, supports_tool_calling: true }
    }
}

const NO_SYSTEM_PROMPT: &[&str] = &["mistral.mistral-7b-instruct-v0:2"];

const NO_TOOL_CALLING: &[&str] = &["mistral.mistral-7b-instruct-v0:2", "meta.llama3-70b-instruct-v1:0"];

/// Looks up the capabilities of `model_id`.
///
/// Unlisted models are assumed to support both features.
#[must_use]
pub fn capabilities_for(model_id: &str) -> ModelCapabilities {
    ModelCapabilities {
        supports_system_prompt: !NO_SYSTEM_PROMPT.contains(&model_id),
        supports_tool_calling: !NO_TOOL_CALLING.contains(&model_id),
    }
}
