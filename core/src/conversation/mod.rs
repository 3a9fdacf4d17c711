use crate::tools::{ToolCall, ToolResponse, ToolSchema};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub mod openrouter;
pub mod scripted;

pub use openrouter::OpenRouterSession;
pub use scripted::{ScriptStep, ScriptedSession, SessionRecorder};

/// The multi-turn exchange with a language model.
///
/// `send` is the only suspending operation the assistant performs against the
/// model; the session keeps whatever history its provider needs.
#[async_trait]
pub trait ConversationSession: Send {
    /// Attach or replace the tool schemas offered with the next request
    fn set_tools(&mut self, tools: &[ToolSchema]);

    /// Submit a request and wait for the model's answer
    async fn send(&mut self, request: PendingRequest) -> Result<ModelResponse, SessionError>;

    /// Get session information
    fn info(&self) -> SessionInfo;
}

/// The one request in flight during a turn
#[derive(Debug, Clone, PartialEq)]
pub enum PendingRequest {
    /// Text authored by the user, possibly prefixed with selection context
    Prompt(String),
    /// Results for every call the model made in the previous round, in call order
    ToolResults(Vec<ToolResponse>),
}

/// What the model answered
#[derive(Debug, Clone, PartialEq)]
pub enum ModelResponse {
    FinalText { text: String },
    ToolCalls { calls: Vec<ToolCall> },
}

impl ModelResponse {
    pub fn text(text: impl Into<String>) -> Self {
        ModelResponse::FinalText { text: text.into() }
    }

    /// Decode a provider answer made of optional text and an optional raw tool-call payload.
    ///
    /// A payload that is missing, not an array, or empty means the answer is final.
    /// Each entry may use the OpenAI shape (`{"id", "function": {"name", "arguments"}}`)
    /// or the flat shape (`{"name", "args"}`); string arguments are parsed as JSON.
    pub fn from_parts(text: Option<String>, tool_calls: Option<&Value>) -> Result<Self, SessionError> {
        let raw_calls = match tool_calls.and_then(Value::as_array) {
            Some(calls) if !calls.is_empty() => calls,
            _ => {
                return Ok(ModelResponse::FinalText {
                    text: text.unwrap_or_default(),
                })
            }
        };

        let calls = raw_calls
            .iter()
            .map(decode_tool_call)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ModelResponse::ToolCalls { calls })
    }
}

fn decode_tool_call(raw: &Value) -> Result<ToolCall, SessionError> {
    let function = raw.get("function").unwrap_or(raw);

    let name = function
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| SessionError::Processing(format!("tool call without a name: {}", raw)))?;

    let arguments = match function.get("arguments").or_else(|| function.get("args")) {
        Some(Value::String(encoded)) if encoded.trim().is_empty() => Value::Object(Default::default()),
        Some(Value::String(encoded)) => serde_json::from_str(encoded)
            .map_err(|e| SessionError::Processing(format!("invalid tool args for {}: {}", name, e)))?,
        Some(value) => value.clone(),
        None => Value::Object(Default::default()),
    };

    let call = match raw.get("id").and_then(Value::as_str) {
        Some(id) => ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        },
        None => ToolCall::new(name, arguments),
    };
    Ok(call)
}

/// Information about a session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub name: String,
    pub description: String,
    pub model: Option<String>,
}

/// Errors that can occur during session operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Session configuration error: {0}")]
    Configuration(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Session unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_parts_without_tool_calls_is_final() {
        let response = ModelResponse::from_parts(Some("All matched.".to_string()), None).unwrap();
        assert_eq!(response, ModelResponse::text("All matched."));
    }

    #[test]
    fn test_from_parts_non_array_payload_is_final() {
        let payload = json!({ "name": "match_columns" });
        let response = ModelResponse::from_parts(None, Some(&payload)).unwrap();
        assert_eq!(response, ModelResponse::text(""));

        let response = ModelResponse::from_parts(Some("ok".to_string()), Some(&Value::Null)).unwrap();
        assert_eq!(response, ModelResponse::text("ok"));
    }

    #[test]
    fn test_from_parts_empty_array_is_final() {
        let payload = json!([]);
        let response = ModelResponse::from_parts(Some("done".to_string()), Some(&payload)).unwrap();
        assert_eq!(response, ModelResponse::text("done"));
    }

    #[test]
    fn test_from_parts_openai_shape() {
        let payload = json!([{
            "id": "call_1",
            "type": "function",
            "function": { "name": "match_columns", "arguments": "{\"final_name\":\"email\"}" }
        }]);

        let response = ModelResponse::from_parts(None, Some(&payload)).unwrap();
        assert_eq!(
            response,
            ModelResponse::ToolCalls {
                calls: vec![ToolCall {
                    id: "call_1".to_string(),
                    name: "match_columns".to_string(),
                    arguments: json!({ "final_name": "email" }),
                }]
            }
        );
    }

    #[test]
    fn test_from_parts_flat_shape_generates_ids() {
        let payload = json!([
            { "name": "review_column_cards", "args": { "status": "pending" } },
            { "name": "generate_sql" }
        ]);

        let ModelResponse::ToolCalls { calls } = ModelResponse::from_parts(None, Some(&payload)).unwrap() else {
            panic!("Expected tool calls");
        };
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "review_column_cards");
        assert_eq!(calls[0].arguments, json!({ "status": "pending" }));
        assert_eq!(calls[1].arguments, json!({}));
        assert!(!calls[0].id.is_empty());
        assert_ne!(calls[0].id, calls[1].id);
    }

    #[test]
    fn test_from_parts_rejects_nameless_or_garbled_calls() {
        let nameless = json!([{ "args": {} }]);
        assert!(matches!(
            ModelResponse::from_parts(None, Some(&nameless)),
            Err(SessionError::Processing(_))
        ));

        let garbled = json!([{ "id": "c", "function": { "name": "match_columns", "arguments": "{oops" } }]);
        assert!(matches!(
            ModelResponse::from_parts(None, Some(&garbled)),
            Err(SessionError::Processing(_))
        ));
    }
}
