//! Routing of agent control events.
//!
//! Conversation turns go to the transcript, function calls to the executor
//! with exactly one response per resolvable call, errors to the log.
//! Nothing here ends the session.

use std::sync::Arc;

use annie_types::Severity;
use annie_voice::{AgentEvent, FunctionCallRequest, FunctionCallResponse, EMERGENCY_FUNCTION};
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;

use crate::functions::{FunctionExecutor, FunctionInvocation};
use crate::lifecycle::LifecycleRecorder;

const DEFAULT_EMERGENCY_REASON: &str = "Emergency detected during call";

/// Routes agent text events for one session and answers function calls on
/// the control queue.
pub struct EventDispatcher {
    recorder: Arc<LifecycleRecorder>,
    executor: FunctionExecutor,
    /// Control messages bound for the agent, sent by the upstream sender.
    control_tx: mpsc::Sender<String>,
}

impl EventDispatcher {
    pub fn new(
        recorder: Arc<LifecycleRecorder>,
        executor: FunctionExecutor,
        control_tx: mpsc::Sender<String>,
    ) -> Self {
        Self {
            recorder,
            executor,
            control_tx,
        }
    }

    /// Handles one text message from the agent.
    pub async fn dispatch(&self, text: &str) {
        match AgentEvent::parse(text) {
            AgentEvent::ConversationText { role, content } => {
                tracing::debug!(role = %role, chars = content.len(), "conversation text");
                self.recorder.append_transcript(&role, &content).await;
            }
            AgentEvent::FunctionCallRequest(requests) => {
                for request in requests {
                    self.handle_function_call(request).await;
                }
            }
            AgentEvent::Error { code, description } => {
                tracing::error!(code = ?code, description = %description, "agent reported error");
            }
            AgentEvent::History => tracing::trace!("agent history event"),
            AgentEvent::Other { event_type } => {
                tracing::debug!(event_type = %event_type, "unhandled agent event");
            }
            AgentEvent::Unparsed => {
                tracing::warn!(bytes = text.len(), "agent sent non-JSON text frame");
            }
        }
    }

    async fn handle_function_call(&self, request: FunctionCallRequest) {
        let Some(name) = request.name else {
            tracing::warn!(id = ?request.id, "function call without a name ignored");
            return;
        };
        let id = request.id;
        if id.is_none() {
            tracing::warn!(function = %name, "function call without an id, replying with null id");
        }

        let invocation = normalize(&name, &request.input);
        tracing::info!(function = %name, id = ?id, "executing agent function call");
        let outcome = self.executor.execute(invocation).await;

        let output = serde_json::to_value(&outcome)
            .unwrap_or_else(|e| json!({ "error": e.to_string() }));
        let message = FunctionCallResponse::new(id.clone(), output)
            .to_json()
            .unwrap_or_else(|e| {
                json!({
                    "type": "FunctionCallResponse",
                    "function_call_id": id,
                    "output": { "error": e.to_string() }
                })
                .to_string()
            });

        if self.control_tx.send(message).await.is_err() {
            tracing::warn!(function = %name, "agent sender closed before function response");
        }
    }
}

/// Maps a named call and its arguments onto an executor invocation.
pub fn normalize(name: &str, input: &Map<String, Value>) -> FunctionInvocation {
    if name != EMERGENCY_FUNCTION {
        return FunctionInvocation::Unknown {
            name: name.to_string(),
        };
    }

    let severity = match input.get("severity").and_then(Value::as_str) {
        None => Severity::default(),
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(severity = raw, "unrecognized severity, using default");
            Severity::default()
        }),
    };
    let reason = input
        .get("reason")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_EMERGENCY_REASON)
        .to_string();

    FunctionInvocation::DetectEmergency { severity, reason }
}
