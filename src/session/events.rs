//! Session lifecycle notifications for the host

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events published by the session subsystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A new session was created
    Created {
        session_id: String,
    },

    /// An empty session was handed out again
    Reused {
        session_id: String,
    },

    /// A message was appended to a session's log
    MessageAppended {
        session_id: String,
        message_id: String,
    },

    Activated {
        session_id: String,
    },

    Deactivated {
        session_id: String,
    },

    /// Title generation finished; `title` is `None` when it failed
    Titled {
        session_id: String,
        title: Option<String>,
    },

    Deleted {
        session_id: String,
    },
}

/// Optional sink for session events. Sending never fails the caller.
#[derive(Debug, Clone, Default)]
pub struct EventSender {
    tx: Option<mpsc::UnboundedSender<SessionEvent>>,
}

impl EventSender {
    pub fn new(tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Create a sender along with the receiving end for the host
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
