//! Event-driven message transport
//!
//! The client never blocks on the socket. A transport delivers its lifecycle
//! and inbound messages as [`TransportEvent`]s that the client drains once per tick.

use std::collections::VecDeque;

use crate::error::BridgeError;

/// Something that happened on the connection since the last poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    /// The peer closed the connection
    Closed,
    Error(String),
}

/// A bidirectional text-message channel to VTube Studio
pub trait Transport {
    /// Begin connecting. Completion is reported later as [`TransportEvent::Opened`].
    fn open(&mut self) -> Result<(), BridgeError>;

    /// Queue one text message for sending
    fn send(&mut self, text: String) -> Result<(), BridgeError>;

    /// Take every event that arrived since the last poll
    fn poll_events(&mut self) -> Vec<TransportEvent>;

    /// Close the connection. Events still queued from it are discarded.
    fn close(&mut self);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self) -> Result<(), BridgeError> {
        (**self).open()
    }

    fn send(&mut self, text: String) -> Result<(), BridgeError> {
        (**self).send(text)
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        (**self).poll_events()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// In-process transport that records what was sent and replays scripted events
///
/// Used for offline replay and tests.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    open: bool,
    refuse_open: bool,
    sent: Vec<String>,
    inbox: VecDeque<TransportEvent>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose `open` always fails
    pub fn refusing() -> Self {
        Self {
            refuse_open: true,
            ..Self::default()
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn push_event(&mut self, event: TransportEvent) {
        self.inbox.push_back(event);
    }

    pub fn push_message(&mut self, text: impl Into<String>) {
        self.push_event(TransportEvent::Message(text.into()));
    }

    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    pub fn take_sent(&mut self) -> Vec<String> {
        std::mem::take(&mut self.sent)
    }
}

impl Transport for MemoryTransport {
    fn open(&mut self) -> Result<(), BridgeError> {
        if self.refuse_open {
            return Err(BridgeError::Transport("connection refused".to_string()));
        }
        self.inbox.clear();
        self.open = true;
        self.inbox.push_back(TransportEvent::Opened);
        Ok(())
    }

    fn send(&mut self, text: String) -> Result<(), BridgeError> {
        if !self.open {
            return Err(BridgeError::Transport("connection is not open".to_string()));
        }
        self.sent.push(text);
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        self.inbox.drain(..).collect()
    }

    fn close(&mut self) {
        self.open = false;
        self.inbox.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_is_reported_on_poll() {
        let mut transport = MemoryTransport::new();
        assert!(transport.poll_events().is_empty());
        transport.open().unwrap();
        assert_eq!(transport.poll_events(), vec![TransportEvent::Opened]);
        assert!(transport.poll_events().is_empty());
    }

    #[test]
    fn test_send_requires_open() {
        let mut transport = MemoryTransport::new();
        assert!(transport.send("x".to_string()).is_err());
        transport.open().unwrap();
        transport.send("x".to_string()).unwrap();
        assert_eq!(transport.take_sent(), vec!["x".to_string()]);
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_close_discards_queued_events() {
        let mut transport = MemoryTransport::new();
        transport.open().unwrap();
        transport.push_message("late");
        transport.close();
        assert!(transport.poll_events().is_empty());
        assert!(!transport.is_open());
    }

    #[test]
    fn test_refusing_transport() {
        let mut transport = MemoryTransport::refusing();
        assert!(matches!(transport.open(), Err(BridgeError::Transport(_))));
    }
}
