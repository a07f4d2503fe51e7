//! Outgoing messages
//!
//! Handlers queue text for actors here; the host drains the queue and delivers
//! it over whatever transport it owns.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// Presentation hint for a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Info,
    Success,
    Error,
    Warning,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MessageKind::Info => "info",
            MessageKind::Success => "success",
            MessageKind::Error => "error",
            MessageKind::Warning => "warning",
        })
    }
}

/// A queued message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Send to one actor
    Send {
        target: String,
        kind: MessageKind,
        text: String,
    },
    /// Send to every connected actor
    Broadcast { kind: MessageKind, text: String },
}

impl Delivery {
    pub fn kind(&self) -> MessageKind {
        match self {
            Delivery::Send { kind, .. } | Delivery::Broadcast { kind, .. } => *kind,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Delivery::Send { text, .. } | Delivery::Broadcast { text, .. } => text,
        }
    }

    /// Whether `actor` should receive this message
    pub fn is_for(&self, actor: &str) -> bool {
        match self {
            Delivery::Send { target, .. } => target == actor,
            Delivery::Broadcast { .. } => true,
        }
    }
}

/// Queue shared by every actor of a host
#[derive(Debug, Default)]
pub struct MessageQueue {
    messages: Mutex<Vec<Delivery>>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap in Arc for sharing
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn send(&self, target: &str, kind: MessageKind, text: impl Into<String>) {
        self.messages.lock().push(Delivery::Send {
            target: target.to_string(),
            kind,
            text: text.into(),
        });
    }

    pub fn broadcast(&self, kind: MessageKind, text: impl Into<String>) {
        self.messages.lock().push(Delivery::Broadcast {
            kind,
            text: text.into(),
        });
    }

    /// Drain all messages from the queue
    pub fn drain(&self) -> Vec<Delivery> {
        std::mem::take(&mut *self.messages.lock())
    }

    /// Drain only what `actor` would receive, leaving the rest queued
    pub fn drain_for(&self, actor: &str) -> Vec<Delivery> {
        let mut messages = self.messages.lock();
        let (mine, rest): (Vec<_>, Vec<_>) =
            std::mem::take(&mut *messages).into_iter().partition(|m| m.is_for(actor));
        *messages = rest;
        mine
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_queue() {
        let queue = MessageQueue::new();

        queue.send("alice", MessageKind::Success, "Hello!");
        queue.broadcast(MessageKind::Info, "Server restarting.");
        assert_eq!(queue.len(), 2);

        let messages = queue.drain();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text(), "Hello!");
        assert_eq!(messages[0].kind(), MessageKind::Success);
        assert!(messages[1].is_for("anyone"));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_for_keeps_other_targets() {
        let queue = MessageQueue::new();
        queue.send("alice", MessageKind::Info, "a");
        queue.send("bob", MessageKind::Info, "b");
        queue.broadcast(MessageKind::Warning, "all");

        let alice: Vec<String> = queue
            .drain_for("alice")
            .iter()
            .map(|m| m.text().to_string())
            .collect();
        assert_eq!(alice, vec!["a", "all"]);

        let rest = queue.drain();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].text(), "b");
    }
}
