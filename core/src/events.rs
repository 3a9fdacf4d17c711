use crate::transcript::ChatMessage;
use tokio::sync::mpsc;

/// Changes the presentation layer observes while a turn runs
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// A message was appended to the transcript
    MessageAppended(ChatMessage),

    /// The assistant went busy (true) or idle (false)
    BusyChanged(bool),

    /// The assistant is about to invoke this tool
    ToolUsed(String),

    /// The transcript was emptied
    Cleared,
}

/// Event bus for communication between components
#[derive(Debug)]
pub struct EventBus {
    sender: mpsc::UnboundedSender<AppEvent>,
    receiver: mpsc::UnboundedReceiver<AppEvent>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self { sender, receiver }
    }

    /// Get a sender handle for the event bus
    pub fn sender(&self) -> EventSender {
        EventSender {
            inner: self.sender.clone(),
        }
    }

    /// Get the receiver (should only be used by the main event loop)
    pub fn into_receiver(self) -> mpsc::UnboundedReceiver<AppEvent> {
        self.receiver
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for sending events to the event bus
#[derive(Debug, Clone)]
pub struct EventSender {
    inner: mpsc::UnboundedSender<AppEvent>,
}

impl EventSender {
    /// Send an event to the bus
    pub fn send(&self, event: AppEvent) -> Result<(), EventSendError> {
        self.inner
            .send(event)
            .map_err(|_| EventSendError::ChannelClosed)
    }

    pub fn send_message(&self, message: ChatMessage) -> Result<(), EventSendError> {
        self.send(AppEvent::MessageAppended(message))
    }

    pub fn send_busy(&self, busy: bool) -> Result<(), EventSendError> {
        self.send(AppEvent::BusyChanged(busy))
    }

    pub fn send_tool_used(&self, name: String) -> Result<(), EventSendError> {
        self.send(AppEvent::ToolUsed(name))
    }

    pub fn send_cleared(&self) -> Result<(), EventSendError> {
        self.send(AppEvent::Cleared)
    }
}

/// Errors that can occur when sending events
#[derive(Debug, thiserror::Error)]
pub enum EventSendError {
    #[error("Event channel is closed")]
    ChannelClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus() {
        let bus = EventBus::new();
        let sender = bus.sender();
        let mut receiver = bus.into_receiver();

        sender.send_message(ChatMessage::user("test message")).unwrap();
        sender.send_busy(true).unwrap();

        match receiver.recv().await.unwrap() {
            AppEvent::MessageAppended(msg) => assert_eq!(msg.content, "test message"),
            other => panic!("Expected MessageAppended event, got {:?}", other),
        }
        assert_eq!(receiver.recv().await, Some(AppEvent::BusyChanged(true)));

        sender.send_cleared().unwrap();
        assert_eq!(receiver.recv().await, Some(AppEvent::Cleared));
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped() {
        let bus = EventBus::new();
        let sender = bus.sender();
        drop(bus);

        assert!(matches!(
            sender.send_tool_used("match_columns".to_string()),
            Err(EventSendError::ChannelClosed)
        ));
    }
}
