//! Control events received from the agent, and the one reply the bridge
//! sends back.
//!
//! Agent events arrive as JSON text frames tagged by `type`. Function-call
//! requests come in two shapes: a flat one with the request fields at the
//! top level, and a nested one carrying a `functions` array whose entries
//! hold `arguments` either as an object or as a JSON-encoded string. Both
//! are normalized here so callers only ever see [`FunctionCallRequest`].

use serde::Serialize;
use serde_json::{Map, Value};

/// A text event received from the agent.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// One conversational turn, from either side.
    ConversationText { role: String, content: String },
    /// One or more functions the agent wants executed.
    FunctionCallRequest(Vec<FunctionCallRequest>),
    Error {
        code: Option<String>,
        description: String,
    },
    History,
    /// A recognized JSON event the bridge does not act on.
    Other { event_type: String },
    /// Text that is not a JSON object.
    Unparsed,
}

/// A single normalized function invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCallRequest {
    /// Call-scoped request identifier echoed in the response.
    pub id: Option<String>,
    pub name: Option<String>,
    /// Arguments as a JSON object; empty when absent or unparseable.
    pub input: Map<String, Value>,
}

impl AgentEvent {
    pub fn parse(text: &str) -> Self {
        let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(text) else {
            return Self::Unparsed;
        };

        let event_type = obj.get("type").and_then(Value::as_str).unwrap_or_default();
        match event_type {
            "ConversationText" => Self::ConversationText {
                role: str_field(&obj, &["role"]).unwrap_or_else(|| "unknown".to_string()),
                content: str_field(&obj, &["content", "text"]).unwrap_or_default(),
            },
            "FunctionCallRequest" => Self::FunctionCallRequest(function_requests(&obj)),
            "Error" => Self::Error {
                code: obj.get("code").and_then(scalar_string),
                description: str_field(&obj, &["description", "message"])
                    .unwrap_or_else(|| "Unknown error".to_string()),
            },
            "History" => Self::History,
            other => Self::Other {
                event_type: other.to_string(),
            },
        }
    }
}

fn str_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.trim().is_empty())
}

fn arguments(value: Option<&Value>) -> Map<String, Value> {
    match value {
        Some(Value::Object(map)) => map.clone(),
        Some(Value::String(raw)) if !raw.trim().is_empty() => {
            match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => map,
                _ => {
                    tracing::warn!(arguments = %raw, "function arguments are not a JSON object");
                    Map::new()
                }
            }
        }
        _ => Map::new(),
    }
}

fn function_requests(obj: &Map<String, Value>) -> Vec<FunctionCallRequest> {
    if let Some(Value::Array(entries)) = obj.get("functions") {
        return entries
            .iter()
            .filter_map(Value::as_object)
            .map(|entry| FunctionCallRequest {
                id: non_empty(
                    entry
                        .get("id")
                        .or_else(|| entry.get("call_id"))
                        .and_then(scalar_string),
                ),
                name: non_empty(str_field(entry, &["name", "function_name"])),
                input: arguments(entry.get("arguments").or_else(|| entry.get("input"))),
            })
            .collect();
    }

    vec![FunctionCallRequest {
        id: non_empty(
            obj.get("function_call_id")
                .or_else(|| obj.get("id"))
                .and_then(scalar_string),
        ),
        name: non_empty(str_field(obj, &["function_name", "name"])),
        input: arguments(obj.get("input").or_else(|| obj.get("arguments"))),
    }]
}

/// Reply to a single function call, keyed by the request identifier.
///
/// A request that arrived without an identifier is still answered; the
/// identifier then serializes as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionCallResponse {
    #[serde(rename = "type")]
    kind: &'static str,
    pub function_call_id: Option<String>,
    pub output: Value,
}

impl FunctionCallResponse {
    pub fn new(function_call_id: Option<String>, output: Value) -> Self {
        Self {
            kind: "FunctionCallResponse",
            function_call_id,
            output,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn conversation_text_reads_content_or_text() {
        assert_eq!(
            AgentEvent::parse(r#"{"type":"ConversationText","role":"assistant","content":"Hello"}"#),
            AgentEvent::ConversationText {
                role: "assistant".to_string(),
                content: "Hello".to_string()
            }
        );
        assert_eq!(
            AgentEvent::parse(r#"{"type":"ConversationText","text":"Hi"}"#),
            AgentEvent::ConversationText {
                role: "unknown".to_string(),
                content: "Hi".to_string()
            }
        );
    }

    #[test]
    fn flat_function_request() {
        let event = AgentEvent::parse(
            r#"{"type":"FunctionCallRequest","function_call_id":"fc-1",
                "function_name":"detect_emergency",
                "input":{"severity":"critical","reason":"my chest hurts"}}"#,
        );
        let AgentEvent::FunctionCallRequest(requests) = event else {
            panic!("expected function call request");
        };
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].id.as_deref(), Some("fc-1"));
        assert_eq!(requests[0].name.as_deref(), Some("detect_emergency"));
        assert_eq!(requests[0].input["severity"], "critical");
    }

    #[test]
    fn nested_function_request_with_string_arguments() {
        let event = AgentEvent::parse(
            &json!({
                "type": "FunctionCallRequest",
                "functions": [
                    {
                        "id": "a",
                        "name": "detect_emergency",
                        "arguments": "{\"severity\":\"high\",\"reason\":\"dizzy\"}",
                        "client_side": true
                    },
                    {
                        "id": "b",
                        "name": "detect_emergency",
                        "arguments": {"severity": "medium"}
                    }
                ]
            })
            .to_string(),
        );
        let AgentEvent::FunctionCallRequest(requests) = event else {
            panic!("expected function call request");
        };
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].id.as_deref(), Some("a"));
        assert_eq!(requests[0].input["reason"], "dizzy");
        assert_eq!(requests[1].id.as_deref(), Some("b"));
        assert_eq!(requests[1].input["severity"], "medium");
    }

    #[test]
    fn malformed_arguments_become_empty() {
        let event = AgentEvent::parse(
            r#"{"type":"FunctionCallRequest","functions":[{"id":"x","name":"detect_emergency","arguments":"not json"}]}"#,
        );
        let AgentEvent::FunctionCallRequest(requests) = event else {
            panic!("expected function call request");
        };
        assert!(requests[0].input.is_empty());
    }

    #[test]
    fn missing_name_is_preserved_as_none() {
        let event = AgentEvent::parse(r#"{"type":"FunctionCallRequest","function_call_id":"z"}"#);
        let AgentEvent::FunctionCallRequest(requests) = event else {
            panic!("expected function call request");
        };
        assert_eq!(requests[0].name, None);
        assert_eq!(requests[0].id.as_deref(), Some("z"));
    }

    #[test]
    fn error_and_other_events() {
        assert_eq!(
            AgentEvent::parse(r#"{"type":"Error","code":"UNPARSABLE","description":"bad"}"#),
            AgentEvent::Error {
                code: Some("UNPARSABLE".to_string()),
                description: "bad".to_string()
            }
        );
        assert_eq!(AgentEvent::parse(r#"{"type":"History"}"#), AgentEvent::History);
        assert_eq!(
            AgentEvent::parse(r#"{"type":"UserStartedSpeaking"}"#),
            AgentEvent::Other {
                event_type: "UserStartedSpeaking".to_string()
            }
        );
        assert_eq!(AgentEvent::parse("[1,2]"), AgentEvent::Unparsed);
        assert_eq!(AgentEvent::parse("nope"), AgentEvent::Unparsed);
    }

    #[test]
    fn response_wire_shape() {
        let response =
            FunctionCallResponse::new(Some("fc-1".to_string()), json!({"success": true}));
        let value: Value = serde_json::from_str(&response.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "FunctionCallResponse",
                "function_call_id": "fc-1",
                "output": {"success": true}
            })
        );
    }

    #[test]
    fn response_without_id_serializes_null() {
        let response = FunctionCallResponse::new(None, json!({"success": false}));
        let value: Value = serde_json::from_str(&response.to_json().unwrap()).unwrap();
        assert_eq!(value["function_call_id"], Value::Null);
        assert_eq!(value["output"]["success"], false);
    }
}
