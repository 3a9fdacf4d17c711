pub mod assistant;
pub mod config;
pub mod context;
pub mod conversation;
pub mod events;
pub mod tools;
pub mod transcript;

// Re-export main types for convenience
pub use assistant::{Assistant, PanelSnapshot, RejectReason, TurnError, TurnOutcome, TurnPhase, APOLOGY};
pub use config::{AiSettings, Config, ConfigError, ProviderConfig};
pub use context::{augment, SelectedMatch};
pub use conversation::{
    ConversationSession, ModelResponse, OpenRouterSession, PendingRequest, ScriptedSession, SessionError, SessionInfo,
};
pub use events::{AppEvent, EventBus, EventSender};
pub use tools::{CommandInvoker, EchoInvoker, ToolError, ToolInvoker, ToolRegistry};
pub use transcript::{ChatMessage, MessageRole, Transcript};
