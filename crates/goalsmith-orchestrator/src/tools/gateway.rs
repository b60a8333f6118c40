//! Tool registry and the gateway every agent calls tools through.
//!
//! The registry is filled once at startup and shared read-only behind an
//! `Arc`. The gateway enforces, in order: the caller's permitted list, the
//! registry lookup, argument validation, credential resolution, and the
//! per-call timeout. A call that fails the permission check touches nothing.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::builtin::{NoteStore, builtin_tools};
use super::{
    CredentialProvider, RemoteEndpoint, ToolArguments, ToolCaller, ToolContext, ToolDescriptor, ToolOutcome,
    ToolParameters, ToolTarget, schema,
};
use crate::config::GoalsmithConfig;
use crate::error::{PipelineError, Result};

/// All registered tools, keyed by name.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolDescriptor>,
}

impl ToolRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry a configuration describes: built-ins plus remote tools.
    ///
    /// # Errors
    /// Returns `PipelineError::Config` if two tools share a name.
    pub fn from_config(config: &GoalsmithConfig, store: NoteStore) -> Result<Self> {
        let store = match &config.tools.notes_dir {
            Some(dir) => store.with_notes_dir(dir.clone()),
            None => store,
        };

        let mut registry = Self::new();
        for descriptor in builtin_tools(Arc::new(store), &config.scoring) {
            registry.register(descriptor)?;
        }
        for remote in &config.tools.remote {
            let input = remote.parameters.iter().fold(ToolParameters::new(), |params, p| {
                params.add_property(&p.name, &p.param_type, &p.description, p.required)
            });
            let credential = remote.credential_env.clone().unwrap_or_else(|| config.tools.credential_env.clone());
            registry.register(
                ToolDescriptor::remote(&remote.name, &remote.description, input, RemoteEndpoint::new(&remote.endpoint))
                    .with_credential(credential),
            )?;
        }
        Ok(registry)
    }

    /// Adds a tool.
    ///
    /// # Errors
    /// Returns `PipelineError::Config` if the name is taken.
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<()> {
        if self.tools.contains_key(&descriptor.name) {
            return Err(PipelineError::Config { reason: format!("tool '{}' is registered twice", descriptor.name) });
        }
        self.tools.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Looks up a tool.
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    /// Every tool, sorted by name.
    pub fn descriptors(&self) -> Vec<&ToolDescriptor> {
        let mut tools: Vec<_> = self.tools.values().collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// The tools `caller` may use, sorted by name.
    pub fn descriptors_for(&self, caller: &dyn ToolCaller) -> Vec<&ToolDescriptor> {
        self.descriptors().into_iter().filter(|d| caller.permits(&d.name)).collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Uniform entry point for tool calls.
#[derive(Clone)]
pub struct ToolGateway {
    registry: Arc<ToolRegistry>,
    credentials: Arc<dyn CredentialProvider>,
    call_timeout: Duration,
}

impl std::fmt::Debug for ToolGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolGateway")
            .field("tools", &self.registry.len())
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl ToolGateway {
    /// Creates a gateway over a finished registry.
    pub fn new(registry: Arc<ToolRegistry>, credentials: Arc<dyn CredentialProvider>, call_timeout: Duration) -> Self {
        Self { registry, credentials, call_timeout }
    }

    /// The registry behind this gateway.
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Per-call timeout.
    pub const fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Calls `tool_name` on behalf of `caller`.
    ///
    /// # Errors
    /// - `ToolNotPermitted` if the caller may not use the tool, or it is not registered
    /// - `ToolInputInvalid` if the arguments do not match the tool's schema
    /// - `CredentialUnavailable` if the tool's credential cannot be resolved
    /// - `ToolTimeout` if the target does not answer in time
    /// - `ToolExecutionFailed` if the target itself fails
    pub async fn call(
        &self,
        caller: &dyn ToolCaller,
        tool_name: &str,
        args: &Value,
        correlation_id: &str,
    ) -> Result<ToolOutcome> {
        if !caller.permits(tool_name) {
            warn!(correlation_id = %correlation_id, caller = %caller.caller_name(), tool = %tool_name, "Tool call not permitted");
            return Err(PipelineError::ToolNotPermitted {
                tool: tool_name.to_string(),
                caller: caller.caller_name().to_string(),
            });
        }

        let Some(descriptor) = self.registry.get(tool_name) else {
            warn!(correlation_id = %correlation_id, caller = %caller.caller_name(), tool = %tool_name, "Permitted tool is not registered");
            return Err(PipelineError::ToolNotPermitted {
                tool: tool_name.to_string(),
                caller: caller.caller_name().to_string(),
            });
        };

        schema::validate(args, &descriptor.input).map_err(|reason| {
            warn!(correlation_id = %correlation_id, tool = %tool_name, reason = %reason, "Tool input rejected");
            PipelineError::ToolInputInvalid { tool: tool_name.to_string(), reason }
        })?;

        let credential = match &descriptor.credential_key {
            Some(key) => Some(self.credentials.resolve(key).await?),
            None => None,
        };
        let context = ToolContext { correlation_id: correlation_id.to_string(), credential };

        debug!(correlation_id = %correlation_id, caller = %caller.caller_name(), tool = %tool_name, "Tool call started");
        let started = Instant::now();
        let execution = async {
            match &descriptor.target {
                ToolTarget::Local(handler) => handler.execute(&ToolArguments::new(args.clone()), &context).await,
                ToolTarget::Remote(endpoint) => {
                    endpoint.invoke(tool_name, args, correlation_id, context.credential.as_deref()).await
                }
            }
        };

        let result = match timeout(self.call_timeout, execution).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::ToolTimeout {
                tool: tool_name.to_string(),
                timeout_ms: u64::try_from(self.call_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        };
        let duration_ms = started.elapsed().as_millis();

        match &result {
            Ok(outcome) => info!(
                correlation_id = %correlation_id,
                caller = %caller.caller_name(),
                tool = %tool_name,
                duration_ms,
                error_code = outcome.error_code.as_deref().unwrap_or("none"),
                "Tool call finished"
            ),
            Err(e) => warn!(
                correlation_id = %correlation_id,
                caller = %caller.caller_name(),
                tool = %tool_name,
                duration_ms,
                error_code = e.code(),
                error = %e,
                "Tool call failed"
            ),
        }
        result
    }
}
