//! The assistant panel: turns one user prompt into a chain of model
//! round-trips and tool invocations, ending in a final reply.
//!
//! A turn moves between two states, waiting on the model and waiting on
//! tools, until the model answers with text or something fails. Only one
//! turn runs at a time; prompts submitted meanwhile are rejected.

use crate::context::{augment, SelectedMatch};
use crate::conversation::{ConversationSession, ModelResponse, PendingRequest, SessionError, SessionInfo};
use crate::events::{EventSendError, EventSender};
use crate::tools::{ToolError, ToolInvoker, ToolRegistry, ToolResponse};
use crate::transcript::{ChatMessage, Transcript};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, error, info};

/// Shown when a turn fails for any reason
pub const APOLOGY: &str = "Sorry, I ran into an issue. Please try again.";

/// Progress line appended before each tool invocation
pub fn tool_announcement(name: &str) -> String {
    format!("Running command: `{}`...", name)
}

/// Where the assistant is within a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    AwaitingModel,
    AwaitingTools,
}

/// Why a submission was ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    EmptyPrompt,
    Busy,
    NoSession,
}

/// How a call to [`Assistant::submit_prompt`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Nothing happened: no message was appended and the model was not called
    Rejected(RejectReason),
    /// The model's final reply was appended
    Completed,
    /// The apology was appended
    Failed,
}

/// Anything that collapses a turn
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TurnError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// Read-only view for the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub struct PanelSnapshot {
    pub messages: Vec<ChatMessage>,
    pub busy: bool,
    pub phase: TurnPhase,
    pub last_tool_used: Option<String>,
}

struct PanelState {
    transcript: Transcript,
    phase: TurnPhase,
    last_tool_used: Option<String>,
    // Taken out for the duration of a turn
    session: Option<Box<dyn ConversationSession>>,
}

pub struct Assistant {
    state: Mutex<PanelState>,
    invoker: Arc<dyn ToolInvoker>,
    registry: &'static ToolRegistry,
    events: Option<EventSender>,
}

impl Assistant {
    /// Create an assistant talking to `session` and running tools through `invoker`
    pub fn new(session: Box<dyn ConversationSession>, invoker: Arc<dyn ToolInvoker>) -> Self {
        let assistant = Self::without_session(invoker);
        assistant.lock_state().session = Some(session);
        assistant
    }

    /// Create an assistant that rejects prompts until a session is attached
    pub fn without_session(invoker: Arc<dyn ToolInvoker>) -> Self {
        Self {
            state: Mutex::new(PanelState {
                transcript: Transcript::new(),
                phase: TurnPhase::Idle,
                last_tool_used: None,
                session: None,
            }),
            invoker,
            registry: ToolRegistry::global(),
            events: None,
        }
    }

    pub fn with_events(mut self, sender: EventSender) -> Self {
        self.events = Some(sender);
        self
    }

    /// Attach or replace the session. While a turn is running the session is
    /// in use, so the new one is handed back.
    pub fn set_session(
        &self,
        session: Box<dyn ConversationSession>,
    ) -> Result<(), Box<dyn ConversationSession>> {
        let mut state = self.lock_state();
        if state.phase != TurnPhase::Idle {
            return Err(session);
        }
        state.session = Some(session);
        Ok(())
    }

    /// Information about the attached session, when one is attached and idle
    pub fn session_info(&self) -> Option<SessionInfo> {
        self.lock_state().session.as_ref().map(|s| s.info())
    }

    pub fn is_busy(&self) -> bool {
        self.lock_state().phase != TurnPhase::Idle
    }

    pub fn snapshot(&self) -> PanelSnapshot {
        let state = self.lock_state();
        PanelSnapshot {
            messages: state.transcript.messages().to_vec(),
            busy: state.phase != TurnPhase::Idle,
            phase: state.phase,
            last_tool_used: state.last_tool_used.clone(),
        }
    }

    /// Empty the transcript. Refused (returns false) while a turn is running.
    pub fn clear(&self) -> bool {
        let mut state = self.lock_state();
        if state.phase != TurnPhase::Idle {
            return false;
        }
        state.transcript.clear();
        state.last_tool_used = None;
        drop(state);
        self.notify(|events| events.send_cleared());
        true
    }

    /// Run one turn for `prompt`.
    ///
    /// The transcript shows the prompt as typed; the model receives it with
    /// the selection summary in front. Every accepted turn ends with exactly
    /// one final assistant message or the apology, and the assistant is idle
    /// again when this returns.
    pub async fn submit_prompt(&self, prompt: &str, selection: &[SelectedMatch]) -> TurnOutcome {
        let mut turn = match self.begin_turn(prompt) {
            Ok(turn) => turn,
            Err(reason) => {
                debug!(?reason, "prompt rejected");
                return TurnOutcome::Rejected(reason);
            }
        };

        let request = PendingRequest::Prompt(augment(prompt, selection));
        let outcome = match self.run_turn(&mut turn, request).await {
            Ok(text) => {
                self.append(ChatMessage::assistant(text));
                TurnOutcome::Completed
            }
            Err(e) => {
                error!("Chat error: {}", e);
                self.append(ChatMessage::assistant(APOLOGY));
                TurnOutcome::Failed
            }
        };

        drop(turn);
        outcome
    }

    fn begin_turn(&self, prompt: &str) -> Result<TurnGuard<'_>, RejectReason> {
        if prompt.trim().is_empty() {
            return Err(RejectReason::EmptyPrompt);
        }

        let mut state = self.lock_state();
        if state.phase != TurnPhase::Idle {
            return Err(RejectReason::Busy);
        }
        let session = state.session.take().ok_or(RejectReason::NoSession)?;

        let message = ChatMessage::user(prompt);
        state.transcript.push(message.clone());
        state.phase = TurnPhase::AwaitingModel;
        drop(state);

        self.notify(|events| events.send_message(message));
        self.notify(|events| events.send_busy(true));

        Ok(TurnGuard {
            assistant: self,
            session: Some(session),
        })
    }

    async fn run_turn(&self, turn: &mut TurnGuard<'_>, mut request: PendingRequest) -> Result<String, TurnError> {
        let mut round_trips = 0usize;

        loop {
            round_trips += 1;
            let session = turn.session()?;

            session.set_tools(self.registry.schemas());
            self.set_phase(TurnPhase::AwaitingModel);
            debug!(round_trips, "sending request to model");

            match session.send(request).await? {
                ModelResponse::ToolCalls { calls } if !calls.is_empty() => {
                    self.set_phase(TurnPhase::AwaitingTools);

                    // One at a time, in the order the model asked
                    let mut responses = Vec::with_capacity(calls.len());
                    for call in calls {
                        self.announce_tool(&call.name);
                        info!(tool = %call.name, "invoking tool");
                        let result = self.invoker.invoke(&call.name, call.arguments.clone()).await?;
                        responses.push(ToolResponse { call, result });
                    }
                    request = PendingRequest::ToolResults(responses);
                }
                ModelResponse::ToolCalls { .. } => return Ok(String::new()),
                ModelResponse::FinalText { text } => return Ok(text),
            }
        }
    }

    fn announce_tool(&self, name: &str) {
        let message = ChatMessage::assistant(tool_announcement(name));

        let mut state = self.lock_state();
        state.transcript.push(message.clone());
        state.last_tool_used = Some(name.to_string());
        drop(state);

        self.notify(|events| events.send_message(message));
        self.notify(|events| events.send_tool_used(name.to_string()));
    }

    fn append(&self, message: ChatMessage) {
        self.lock_state().transcript.push(message.clone());
        self.notify(|events| events.send_message(message));
    }

    fn set_phase(&self, phase: TurnPhase) {
        self.lock_state().phase = phase;
    }

    fn notify(&self, send: impl FnOnce(&EventSender) -> Result<(), EventSendError>) {
        if let Some(events) = &self.events {
            // Nobody listening is fine
            let _ = send(events);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, PanelState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Holds the session while a turn runs and puts everything back to idle when
/// dropped, whether the turn finished, failed, or its future was cancelled.
struct TurnGuard<'a> {
    assistant: &'a Assistant,
    session: Option<Box<dyn ConversationSession>>,
}

impl TurnGuard<'_> {
    fn session(&mut self) -> Result<&mut (dyn ConversationSession + 'static), SessionError> {
        self.session
            .as_deref_mut()
            .ok_or_else(|| SessionError::Unavailable("session already released".to_string()))
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.assistant.lock_state();
        if let Some(session) = self.session.take() {
            state.session = Some(session);
        }
        state.phase = TurnPhase::Idle;
        drop(state);

        self.assistant.notify(|events| events.send_busy(false));
    }
}
