//! Chat-completions session with provider fallback
//!
//! Talks to OpenAI-compatible endpoints (OpenRouter first, then any fallback
//! provider from the configuration). Retryable failures (connection errors,
//! HTTP 429 and 5xx) are retried on the same provider according to the
//! transport settings before the next provider is tried.

use crate::config::{AiSettings, Config, ProviderConfig};
use crate::conversation::{ConversationSession, ModelResponse, PendingRequest, SessionError, SessionInfo};
use crate::tools::ToolSchema;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

pub struct OpenRouterSession {
    info: SessionInfo,
    providers: Vec<ProviderConfig>,
    settings: AiSettings,
    client: reqwest::Client,
    history: Vec<Value>,
    tools: Vec<Value>,
}

/// Outcome of a single HTTP attempt against one provider
enum Attempt {
    Retry(String),
    GiveUp(String),
}

impl OpenRouterSession {
    pub fn new(providers: Vec<ProviderConfig>, settings: AiSettings) -> Result<Self, SessionError> {
        let Some(primary) = providers.first() else {
            return Err(SessionError::Configuration(
                "Missing OPENROUTER_API_KEY".to_string(),
            ));
        };

        Ok(Self {
            info: SessionInfo {
                name: "OpenRouter Session".to_string(),
                description: "Chat completions with tool calling and provider fallback".to_string(),
                model: Some(primary.model.clone()),
            },
            providers,
            settings,
            client: reqwest::Client::new(),
            history: vec![json!({
                "role": "system",
                "content": Self::system_prompt()
            })],
            tools: Vec::new(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, SessionError> {
        Self::new(config.providers.clone(), config.settings)
    }

    fn system_prompt() -> &'static str {
        include_str!("../prompts/system_prompt.md")
    }

    /// Messages exchanged so far, in wire format
    pub fn history(&self) -> &[Value] {
        &self.history
    }

    fn push_request(&mut self, request: PendingRequest) {
        match request {
            PendingRequest::Prompt(text) => {
                self.history.push(json!({ "role": "user", "content": text }));
            }
            PendingRequest::ToolResults(responses) => {
                for response in responses {
                    self.history.push(json!({
                        "role": "tool",
                        "tool_call_id": response.call.id,
                        "name": response.call.name,
                        "content": response.result.output.to_string()
                    }));
                }
            }
        }
    }

    /// Drop everything from the most recent user prompt onwards
    fn rewind_failed_turn(&mut self) {
        if let Some(start) = self.history.iter().rposition(|m| m["role"] == "user") {
            self.history.truncate(start);
        }
    }

    /// A turn that failed while its tools ran leaves tool calls without results,
    /// and a cancelled turn can leave a prompt or tool results with no reply.
    /// Providers reject both; drop that turn before starting a new one.
    fn repair_unfinished_turn(&mut self) {
        let unfinished = self
            .history
            .last()
            .map(|m| match m["role"].as_str() {
                Some("user") | Some("tool") => true,
                Some("assistant") => m.get("tool_calls").is_some_and(|c| !c.is_null()),
                _ => false,
            })
            .unwrap_or(false);
        if unfinished {
            debug!("dropping unfinished turn from history");
            self.rewind_failed_turn();
        }
    }

    async fn complete(&mut self) -> Result<ModelResponse, SessionError> {
        let mut body = json!({
            "model": self.providers[0].model, // Replaced per provider in http_post
            "messages": self.history,
        });
        if !self.tools.is_empty() {
            body["tools"] = Value::Array(self.tools.clone());
            body["tool_choice"] = json!("auto");
        }

        let resp = self.http_post(&body).await?;

        let Some(choice) = resp.choices.into_iter().next() else {
            return Err(SessionError::Processing("no choices".to_string()));
        };
        let Some(message) = choice.message else {
            return Err(SessionError::Processing("choice without message".to_string()));
        };

        let response = ModelResponse::from_parts(message.content.clone(), message.tool_calls.as_ref())?;

        // Record the assistant turn with normalized call ids so tool results line up
        match &response {
            ModelResponse::ToolCalls { calls } => {
                let tool_calls: Vec<Value> = calls
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": call.arguments.to_string()
                            }
                        })
                    })
                    .collect();
                self.history.push(json!({
                    "role": "assistant",
                    "content": message.content,
                    "tool_calls": tool_calls
                }));
            }
            ModelResponse::FinalText { text } => {
                self.history.push(json!({ "role": "assistant", "content": text }));
            }
        }

        Ok(response)
    }

    async fn http_post(&self, body: &Value) -> Result<ChatCompletionResponse, SessionError> {
        let mut last_error = None;

        // Try each provider until one succeeds
        for (i, config) in self.providers.iter().enumerate() {
            let mut request_body = body.clone();
            request_body["model"] = json!(config.model);

            let mut retries = 0u32;
            loop {
                match self.post_once(config, &request_body).await {
                    Ok(parsed) => {
                        if i > 0 {
                            warn!("Using {} after {} failed provider(s)", config.name, i);
                        }
                        return Ok(parsed);
                    }
                    Err(Attempt::Retry(message)) if self.settings.allows_retry(retries) => {
                        retries += 1;
                        warn!(
                            "{}, retrying in {}s (attempt {})",
                            message,
                            self.settings.api_call_delay.as_secs(),
                            retries
                        );
                        tokio::time::sleep(self.settings.api_call_delay).await;
                    }
                    Err(Attempt::Retry(message)) | Err(Attempt::GiveUp(message)) => {
                        warn!("{}, trying next provider...", message);
                        last_error = Some(message);
                        break;
                    }
                }
            }
        }

        // All providers failed
        Err(SessionError::Network(
            last_error.unwrap_or_else(|| "All model providers failed".to_string()),
        ))
    }

    async fn post_once(&self, config: &ProviderConfig, body: &Value) -> Result<ChatCompletionResponse, Attempt> {
        let resp = self
            .client
            .post(&config.base_url)
            .bearer_auth(&config.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| Attempt::Retry(format!("{} request error: {}", config.name, e)))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = format!("{} HTTP {}: {}", config.name, status, text);
            return Err(if status.as_u16() == 429 || status.is_server_error() {
                Attempt::Retry(message)
            } else {
                Attempt::GiveUp(message)
            });
        }

        resp.json::<ChatCompletionResponse>()
            .await
            .map_err(|e| Attempt::GiveUp(format!("{} decode error: {}", config.name, e)))
    }
}

#[async_trait]
impl ConversationSession for OpenRouterSession {
    fn set_tools(&mut self, tools: &[ToolSchema]) {
        self.tools = tools
            .iter()
            .map(|spec| {
                json!({
                    "type": "function",
                    "function": {
                        "name": spec.name,
                        "description": spec.description,
                        "parameters": spec.parameters,
                    }
                })
            })
            .collect();
    }

    async fn send(&mut self, request: PendingRequest) -> Result<ModelResponse, SessionError> {
        if matches!(request, PendingRequest::Prompt(_)) {
            self.repair_unfinished_turn();
        }
        self.push_request(request);

        debug!(messages = self.history.len(), "sending chat completion request");
        let result = self.complete().await;
        if result.is_err() {
            self.rewind_failed_turn();
        }
        result
    }

    fn info(&self) -> SessionInfo {
        self.info.clone()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
    // Kept raw: a payload that is not an array means "no tool calls"
    #[serde(default)]
    tool_calls: Option<Value>,
}
