// Tool abstractions for the agents
//
// A tool is described once at startup (name, argument schema, output shape,
// target) and from then on only read. Agents reach tools exclusively through
// the `ToolGateway`, which enforces each caller's permitted list.

pub mod builtin;
pub mod credentials;
pub mod gateway;
pub mod remote;
pub mod schema;
pub mod terminology;

use async_trait::async_trait;
use goalsmith_abstraction::ToolSpec;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::AgentConfig;
use crate::error::Result;

pub use credentials::{CredentialProvider, EnvCredentialProvider, StaticCredentialProvider};
pub use gateway::{ToolGateway, ToolRegistry};
pub use remote::RemoteEndpoint;

/// Tool parameters schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolParameters {
    /// Type (always "object" for function parameters)
    #[serde(rename = "type")]
    pub param_type: String,
    /// Property definitions
    pub properties: BTreeMap<String, ToolPropertySchema>,
    /// Required property names
    pub required: Vec<String>,
}

impl ToolParameters {
    /// Create a new tool parameters schema
    pub fn new() -> Self {
        Self { param_type: "object".to_string(), properties: BTreeMap::new(), required: Vec::new() }
    }

    /// Add a property to the schema
    #[must_use]
    pub fn add_property(
        mut self,
        name: impl Into<String>,
        property_type: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        let name = name.into();
        self.properties.insert(
            name.clone(),
            ToolPropertySchema { property_type: property_type.into(), description: description.into() },
        );
        if required {
            self.required.push(name);
        }
        self
    }

    /// JSON schema handed to models. Undeclared keys are not allowed.
    pub fn to_json_schema(&self) -> Value {
        json!({
            "type": self.param_type,
            "properties": self.properties,
            "required": self.required,
            "additionalProperties": false,
        })
    }
}

impl Default for ToolParameters {
    fn default() -> Self {
        Self::new()
    }
}

/// Tool property schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPropertySchema {
    /// Property type
    #[serde(rename = "type")]
    pub property_type: String,
    /// Property description
    pub description: String,
}

/// Arguments passed to tool handler
#[derive(Debug, Clone)]
pub struct ToolArguments {
    /// Validated arguments object
    pub args: Value,
}

impl ToolArguments {
    /// Create new tool arguments
    pub fn new(args: Value) -> Self {
        Self { args }
    }

    /// Get argument as string
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.args.get(key)?.as_str().map(str::to_string)
    }

    /// Get argument as u64
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.args.get(key)?.as_u64()
    }
}

/// What a tool call returns to the model.
///
/// Tool-level failures (a note that does not exist, an unknown term) are data:
/// they carry an `error_code` and go back to the model like any other result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// Result body.
    #[serde(rename = "result")]
    pub payload: Value,
    /// Set when the tool could not do what was asked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl ToolOutcome {
    /// A successful result.
    pub fn ok(payload: Value) -> Self {
        Self { payload, error_code: None }
    }

    /// A tool-level failure reported back to the model.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { payload: json!({ "error": message.into() }), error_code: Some(code.into()) }
    }

    /// Whether the tool reported a failure.
    pub fn is_error(&self) -> bool {
        self.error_code.is_some()
    }

    /// Serialized form placed in the conversation.
    pub fn to_content(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.payload.to_string())
    }
}

/// Per-call context handed to tool targets.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Run correlation id.
    pub correlation_id: String,
    /// Credential resolved for this call, if the tool needs one.
    pub credential: Option<String>,
}

/// Handler for tool execution
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool with validated arguments
    async fn execute(&self, args: &ToolArguments, context: &ToolContext) -> Result<ToolOutcome>;
}

/// Where a tool runs.
#[derive(Clone)]
pub enum ToolTarget {
    /// In process.
    Local(Arc<dyn ToolHandler>),
    /// Behind an HTTP endpoint.
    Remote(RemoteEndpoint),
}

/// Tool definition registered with the gateway
#[derive(Clone)]
pub struct ToolDescriptor {
    /// Tool name (used in calls)
    pub name: String,
    /// Tool description shown to the model
    pub description: String,
    /// Argument schema
    pub input: ToolParameters,
    /// Shape of the result payload, for documentation
    pub output_schema: Value,
    /// Where the tool runs
    pub target: ToolTarget,
    /// Credential key resolved before each call
    pub credential_key: Option<String>,
}

impl ToolDescriptor {
    /// Describes an in-process tool.
    pub fn local(
        name: impl Into<String>,
        description: impl Into<String>,
        input: ToolParameters,
        output_schema: Value,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input,
            output_schema,
            target: ToolTarget::Local(handler),
            credential_key: None,
        }
    }

    /// Describes a tool served over HTTP.
    pub fn remote(
        name: impl Into<String>,
        description: impl Into<String>,
        input: ToolParameters,
        endpoint: RemoteEndpoint,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input,
            output_schema: json!({ "type": "object" }),
            target: ToolTarget::Remote(endpoint),
            credential_key: None,
        }
    }

    /// Requires `key` to be resolved through the credential provider before each call.
    #[must_use]
    pub fn with_credential(mut self, key: impl Into<String>) -> Self {
        self.credential_key = Some(key.into());
        self
    }

    /// Definition handed to models.
    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input.to_json_schema(),
        }
    }

    /// Whether the tool runs in process.
    pub fn is_local(&self) -> bool {
        matches!(self.target, ToolTarget::Local(_))
    }
}

// Implement Debug manually since Arc<dyn ToolHandler> doesn't implement Debug
impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let target = match &self.target {
            ToolTarget::Local(_) => "<local>".to_string(),
            ToolTarget::Remote(endpoint) => endpoint.url().to_string(),
        };
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input", &self.input)
            .field("target", &target)
            .field("credential_key", &self.credential_key)
            .finish()
    }
}

/// Anyone allowed to call tools through the gateway.
pub trait ToolCaller: Send + Sync {
    /// Name used in logs and errors.
    fn caller_name(&self) -> &str;

    /// Whether `tool` is on the caller's permitted list.
    fn permits(&self, tool: &str) -> bool;
}

impl ToolCaller for AgentConfig {
    fn caller_name(&self) -> &str {
        self.role.as_str()
    }

    fn permits(&self, tool: &str) -> bool {
        Self::permits(self, tool)
    }
}

/// The orchestrator itself, when it resolves note references.
#[derive(Debug, Clone, Copy)]
pub struct IntakeCaller<'a> {
    tools: &'a [String],
}

impl<'a> IntakeCaller<'a> {
    /// Caller allowed exactly `tools`.
    pub const fn new(tools: &'a [String]) -> Self {
        Self { tools }
    }
}

impl ToolCaller for IntakeCaller<'_> {
    fn caller_name(&self) -> &str {
        "orchestrator"
    }

    fn permits(&self, tool: &str) -> bool {
        self.tools.iter().any(|t| t == tool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_parameters_builder() {
        let params = ToolParameters::new()
            .add_property("term", "string", "Term to look up", true)
            .add_property("limit", "integer", "Max results", false);

        assert_eq!(params.properties.len(), 2);
        assert_eq!(params.required, vec!["term".to_string()]);

        let schema = params.to_json_schema();
        assert_eq!(schema["properties"]["term"]["type"], "string");
        assert_eq!(schema["additionalProperties"], false);
    }

    #[test]
    fn test_tool_arguments_getters() {
        let args = ToolArguments::new(json!({"term": "anxiety", "goal_count": 3}));
        assert_eq!(args.get_string("term"), Some("anxiety".to_string()));
        assert_eq!(args.get_u64("goal_count"), Some(3));
        assert_eq!(args.get_string("missing"), None);
    }

    #[test]
    fn test_outcome_content_uses_result_key() {
        let content = ToolOutcome::error("note_not_found", "no such note").to_content();
        let value: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["error_code"], "note_not_found");
        assert_eq!(value["result"]["error"], "no such note");

        let content = ToolOutcome::ok(json!({"a": 1})).to_content();
        assert_eq!(content, r#"{"result":{"a":1}}"#);
    }

    #[test]
    fn test_agent_config_is_a_caller() {
        let judge = AgentConfig::judge().with_permitted_tools(["build_eval_plan"]);
        let caller: &dyn ToolCaller = &judge;
        assert_eq!(caller.caller_name(), "judge");
        assert!(caller.permits("build_eval_plan"));
        assert!(!caller.permits("fetch_note"));

        let intake = vec!["fetch_note".to_string()];
        assert!(IntakeCaller::new(&intake).permits("fetch_note"));
    }
}
