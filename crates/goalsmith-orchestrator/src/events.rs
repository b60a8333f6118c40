//! Runtime event model for streaming run progress to clients.
//!
//! Every event carries the run's correlation id. Events are always logged
//! through `tracing`; a broadcast sender can be attached to stream them as well.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::config::AgentRole;
use crate::error::Stage;
use crate::lifecycle::RuntimeState;

/// A unique identifier for correlating events within a run.
pub type CorrelationId = String;

/// Events emitted while a run executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    /// An agent runtime changed state.
    StateChanged {
        correlation_id: CorrelationId,
        role: AgentRole,
        from: RuntimeState,
        to: RuntimeState,
    },

    /// A tool call is about to execute.
    ToolCallStarted {
        correlation_id: CorrelationId,
        role: AgentRole,
        tool_name: String,
    },

    /// A tool call finished, successfully or not.
    ToolCallFinished {
        correlation_id: CorrelationId,
        role: AgentRole,
        tool_name: String,
        duration_ms: u64,
        error_code: Option<String>,
    },

    /// A stage attempt failed and will be retried.
    StageRetry {
        correlation_id: CorrelationId,
        stage: Stage,
        attempt: u32,
        error: String,
    },

    /// The run finished.
    RunFinished {
        correlation_id: CorrelationId,
        succeeded: bool,
    },
}

impl RuntimeEvent {
    /// Correlation id of the run this event belongs to.
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        match self {
            Self::StateChanged { correlation_id, .. }
            | Self::ToolCallStarted { correlation_id, .. }
            | Self::ToolCallFinished { correlation_id, .. }
            | Self::StageRetry { correlation_id, .. }
            | Self::RunFinished { correlation_id, .. } => correlation_id,
        }
    }
}

/// Where runtime events go.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    event_tx: Option<broadcast::Sender<RuntimeEvent>>,
}

impl EventSink {
    /// A sink that only logs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that logs and broadcasts.
    #[must_use]
    pub const fn with_sender(event_tx: broadcast::Sender<RuntimeEvent>) -> Self {
        Self { event_tx: Some(event_tx) }
    }

    /// Logs the event and forwards it to subscribers, if any.
    pub fn emit(&self, event: RuntimeEvent) {
        match &event {
            RuntimeEvent::StageRetry { correlation_id, stage, attempt, error } => {
                warn!(correlation_id = %correlation_id, stage = %stage, attempt, error = %error, "Stage attempt failed, retrying");
            }
            other => {
                debug!(correlation_id = %other.correlation_id(), event = ?other, "Runtime event");
            }
        }
        if let Some(ref tx) = self.event_tx {
            // No subscribers is fine.
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = RuntimeEvent::StateChanged {
            correlation_id: "run-1".into(),
            role: AgentRole::Judge,
            from: RuntimeState::Idle,
            to: RuntimeState::Prompting,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "state_changed");
        assert_eq!(json["role"], "judge");
        assert_eq!(json["to"], "prompting");
    }

    #[tokio::test]
    async fn test_sink_broadcasts() {
        let (tx, mut rx) = broadcast::channel(4);
        let sink = EventSink::with_sender(tx);
        sink.emit(RuntimeEvent::RunFinished { correlation_id: "run-2".into(), succeeded: true });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.correlation_id(), "run-2");
    }

    #[test]
    fn test_sink_without_sender_does_not_fail() {
        EventSink::new().emit(RuntimeEvent::RunFinished { correlation_id: "x".into(), succeeded: false });
    }
}
