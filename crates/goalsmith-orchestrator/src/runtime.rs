// Agent runtime
//
// Runs one agent invocation as a bounded loop:
// Idle -> Prompting -> (ToolCallRequested -> ToolExecuting -> Prompting)* -> Completed | Failed.
// Each runtime owns its adapter. The gateway and config are shared read-only.

use goalsmith_abstraction::{Model, ToolSpec};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::adapter::{Conversation, ModelAdapter};
use crate::config::{AgentConfig, AgentRole};
use crate::error::{PipelineError, Result};
use crate::events::{EventSink, RuntimeEvent};
use crate::lifecycle::RuntimeState;
use crate::tools::ToolGateway;

/// Counters for one invocation, filled in whether or not it succeeds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InvocationStats {
    /// Tool calls dispatched through the gateway.
    pub tool_calls: u32,
    /// Rounds in which the model asked for tools.
    pub tool_rounds: u32,
}

/// One agent: its config, its own adapter, and the shared gateway.
#[derive(Debug)]
pub struct AgentRuntime {
    config: Arc<AgentConfig>,
    adapter: ModelAdapter,
    gateway: ToolGateway,
    events: EventSink,
}

struct StateTracker<'a> {
    state: RuntimeState,
    role: AgentRole,
    correlation_id: &'a str,
    events: &'a EventSink,
}

impl StateTracker<'_> {
    fn advance(&mut self, to: RuntimeState) {
        let valid = self.state.can_transition_to(to);
        if !valid {
            error!(correlation_id = %self.correlation_id, role = %self.role, from = %self.state, to = %to, "Invalid runtime transition");
        }
        debug_assert!(valid, "invalid runtime transition {} -> {}", self.state, to);
        self.events.emit(RuntimeEvent::StateChanged {
            correlation_id: self.correlation_id.to_string(),
            role: self.role,
            from: self.state,
            to,
        });
        self.state = to;
    }
}

impl AgentRuntime {
    /// Creates a runtime with a fresh adapter over `model`.
    pub fn new(config: Arc<AgentConfig>, model: Arc<dyn Model>, gateway: ToolGateway, events: EventSink) -> Self {
        let adapter = ModelAdapter::new(model, &config);
        Self { config, adapter, gateway, events }
    }

    /// Role this runtime plays.
    pub fn role(&self) -> AgentRole {
        self.config.role
    }

    /// Configuration in use.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Tools this agent is offered, i.e. its permitted and registered tools.
    pub fn tool_specs(&self) -> Vec<ToolSpec> {
        self.gateway.registry().descriptors_for(self.config.as_ref()).into_iter().map(|d| d.spec()).collect()
    }

    /// Runs one invocation: `input` is the opening user turn, `parse` the role's output parser.
    ///
    /// Counters are added to `stats` even when the invocation fails.
    ///
    /// # Errors
    /// `ToolLoopExceeded` past `max_tool_rounds`, `Cancelled` when `cancel`
    /// fires, and any adapter or gateway error.
    pub async fn run<T, F>(
        &self,
        instructions: &str,
        input: String,
        correlation_id: &str,
        cancel: &CancellationToken,
        stats: &mut InvocationStats,
        parse: F,
    ) -> Result<T>
    where
        F: Fn(&Value) -> std::result::Result<T, String> + Send + Sync,
        T: Send,
    {
        let mut tracker =
            StateTracker { state: RuntimeState::Idle, role: self.config.role, correlation_id, events: &self.events };
        let started = Instant::now();

        let result = self.drive(&mut tracker, instructions, input, cancel, stats, parse).await;

        let elapsed_ms = started.elapsed().as_millis();
        match &result {
            Ok(_) => {
                tracker.advance(RuntimeState::Completed);
                info!(
                    correlation_id = %correlation_id,
                    role = %self.config.role,
                    tool_calls = stats.tool_calls,
                    elapsed_ms,
                    "Agent invocation completed"
                );
            }
            Err(e) => {
                tracker.advance(RuntimeState::Failed);
                info!(
                    correlation_id = %correlation_id,
                    role = %self.config.role,
                    error_code = e.code(),
                    error = %e,
                    elapsed_ms,
                    "Agent invocation failed"
                );
            }
        }
        result
    }

    async fn drive<T, F>(
        &self,
        tracker: &mut StateTracker<'_>,
        instructions: &str,
        input: String,
        cancel: &CancellationToken,
        stats: &mut InvocationStats,
        parse: F,
    ) -> Result<T>
    where
        F: Fn(&Value) -> std::result::Result<T, String> + Send + Sync,
        T: Send,
    {
        let tools = self.tool_specs();
        let mut conversation = Conversation::new(instructions).with_user(input);
        let mut rounds = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            tracker.advance(RuntimeState::Prompting);

            let reply = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(PipelineError::Cancelled),
                reply = self.adapter.invoke(&mut conversation, &tools) => reply?,
            };

            if !reply.requests_tools() {
                return tokio::select! {
                    biased;
                    () = cancel.cancelled() => Err(PipelineError::Cancelled),
                    output = self.adapter.finalize(&mut conversation, reply, &tools, &parse) => output,
                };
            }

            tracker.advance(RuntimeState::ToolCallRequested);
            if rounds >= self.config.max_tool_rounds {
                return Err(PipelineError::ToolLoopExceeded { limit: self.config.max_tool_rounds });
            }
            rounds += 1;
            stats.tool_rounds += 1;
            conversation.push_assistant(&reply);

            tracker.advance(RuntimeState::ToolExecuting);
            for call in &reply.tool_calls {
                if cancel.is_cancelled() {
                    return Err(PipelineError::Cancelled);
                }
                self.events.emit(RuntimeEvent::ToolCallStarted {
                    correlation_id: tracker.correlation_id.to_string(),
                    role: self.config.role,
                    tool_name: call.name.clone(),
                });
                let started = Instant::now();
                stats.tool_calls += 1;

                let result = tokio::select! {
                    biased;
                    () = cancel.cancelled() => Err(PipelineError::Cancelled),
                    result = self.gateway.call(self.config.as_ref(), &call.name, &call.arguments, tracker.correlation_id) => result,
                };

                self.events.emit(RuntimeEvent::ToolCallFinished {
                    correlation_id: tracker.correlation_id.to_string(),
                    role: self.config.role,
                    tool_name: call.name.clone(),
                    duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    error_code: match &result {
                        Ok(outcome) => outcome.error_code.clone(),
                        Err(e) => Some(e.code().to_string()),
                    },
                });

                let outcome = result?;
                conversation.push_tool_result(call, outcome.to_content());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GoalsmithConfig;
    use crate::domain::ClinicalNote;
    use crate::tools::builtin::NoteStore;
    use crate::tools::{StaticCredentialProvider, ToolRegistry};
    use goalsmith_abstraction::{ModelResponse, ToolCall};
    use goalsmith_models::MockModel;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::broadcast;

    fn gateway() -> ToolGateway {
        let store = NoteStore::new().with_note(ClinicalNote::new("n1", "Walks daily").with_tags(["obesity"]));
        let registry = ToolRegistry::from_config(&GoalsmithConfig::default(), store).unwrap();
        ToolGateway::new(Arc::new(registry), Arc::new(StaticCredentialProvider::new()), Duration::from_secs(2))
    }

    fn tool_reply(name: &str, arguments: Value) -> ModelResponse {
        ModelResponse {
            tool_calls: vec![ToolCall { id: String::new(), name: name.into(), arguments }],
            ..ModelResponse::text("")
        }
    }

    fn parse_ok(value: &Value) -> std::result::Result<String, String> {
        value["ok"].as_str().map(str::to_string).ok_or_else(|| "missing ok".to_string())
    }

    #[tokio::test]
    async fn test_tool_round_then_completion() {
        let model = Arc::new(MockModel::new("m".into()).with_native_tools(true).with_script(vec![
            Ok(tool_reply("fetch_note", json!({"data_source": "n1"}))),
            Ok(ModelResponse::text(r#"{"ok": "done"}"#)),
        ]));
        let (tx, mut rx) = broadcast::channel(64);
        let runtime =
            AgentRuntime::new(Arc::new(AgentConfig::generator()), model.clone(), gateway(), EventSink::with_sender(tx));

        let mut stats = InvocationStats::default();
        let output = runtime
            .run("Instructions", "Go".into(), "run-1", &CancellationToken::new(), &mut stats, parse_ok)
            .await
            .unwrap();

        assert_eq!(output, "done");
        assert_eq!(stats, InvocationStats { tool_calls: 1, tool_rounds: 1 });

        let second = &model.requests()[1];
        let tool_turn = second.messages.last().unwrap();
        assert_eq!(tool_turn.tool_call_id.as_deref(), Some("call_0"));
        assert!(tool_turn.content.contains("Walks daily"));

        let mut states = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let RuntimeEvent::StateChanged { to, .. } = event {
                states.push(to);
            }
        }
        assert_eq!(
            states,
            vec![
                RuntimeState::Prompting,
                RuntimeState::ToolCallRequested,
                RuntimeState::ToolExecuting,
                RuntimeState::Prompting,
                RuntimeState::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn test_tool_loop_bound() {
        let replies = (0..5).map(|_| Ok(tool_reply("terminology_lookup", json!({"term": "gad"})))).collect();
        let model = Arc::new(MockModel::new("m".into()).with_native_tools(true).with_script(replies));
        let config = AgentConfig::generator().with_max_tool_rounds(2);
        let runtime = AgentRuntime::new(Arc::new(config), model.clone(), gateway(), EventSink::new());

        let mut stats = InvocationStats::default();
        let err = runtime
            .run("i", "u".into(), "run-2", &CancellationToken::new(), &mut stats, parse_ok)
            .await
            .unwrap_err();

        assert_eq!(err, PipelineError::ToolLoopExceeded { limit: 2 });
        assert_eq!(model.requests().len(), 3);
        assert_eq!(stats.tool_calls, 2);
    }

    #[tokio::test]
    async fn test_not_permitted_tool_fails_invocation() {
        let model = Arc::new(
            MockModel::new("m".into())
                .with_native_tools(true)
                .with_script(vec![Ok(tool_reply("build_eval_plan", json!({"goal_count": 1})))]),
        );
        let runtime = AgentRuntime::new(Arc::new(AgentConfig::generator()), model, gateway(), EventSink::new());

        let mut stats = InvocationStats::default();
        let err = runtime
            .run("i", "u".into(), "run-3", &CancellationToken::new(), &mut stats, parse_ok)
            .await
            .unwrap_err();
        assert_eq!(err, PipelineError::ToolNotPermitted { tool: "build_eval_plan".into(), caller: "generator".into() });
    }

    #[tokio::test]
    async fn test_cancelled_before_prompting() {
        let model = Arc::new(MockModel::new("m".into()));
        let runtime = AgentRuntime::new(Arc::new(AgentConfig::judge()), model.clone(), gateway(), EventSink::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut stats = InvocationStats::default();
        let err = runtime.run("i", "u".into(), "run-4", &cancel, &mut stats, parse_ok).await.unwrap_err();
        assert_eq!(err, PipelineError::Cancelled);
        assert!(model.requests().is_empty());
    }

    #[test]
    fn test_tool_specs_follow_permissions() {
        let model = Arc::new(MockModel::new("m".into()));
        let runtime = AgentRuntime::new(Arc::new(AgentConfig::judge()), model, gateway(), EventSink::new());
        let names: Vec<String> = runtime.tool_specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["build_eval_plan", "fetch_note", "terminology_lookup"]);
    }
}
