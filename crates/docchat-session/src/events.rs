//! Session event types

use docchat_wire::{ChatMessage, ExecResult};
use serde::{Deserialize, Serialize};

use crate::citations::ParsedAnswer;

/// Events emitted while a question is being answered
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A request was sent for this user message
    RequestStart { request_id: u64, message: ChatMessage },

    /// The first assistant content arrived; the loading indicator can go
    FirstContent { request_id: u64 },

    /// The in-progress tool/assistant pair changed
    MessageUpdate {
        request_id: u64,
        tool: Option<ChatMessage>,
        assistant: Option<ChatMessage>,
    },

    /// Tool execution diagnostics arrived
    ExecResults {
        request_id: u64,
        results: Vec<ExecResult>,
    },

    /// The stream completed and these messages were appended
    MessageEnd {
        request_id: u64,
        messages: Vec<ChatMessage>,
    },

    /// Display-ready answer with resolved citations
    AnswerReady {
        request_id: u64,
        answer: ParsedAnswer,
    },

    /// The request failed; the error message was appended
    Error { request_id: u64, message: ChatMessage },

    /// The request was cancelled by the user
    Cancelled { request_id: u64 },

    /// The request finished, whatever the outcome
    RequestEnd { request_id: u64 },
}

impl SessionEvent {
    /// Check if this is a terminal event for its request
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::RequestEnd { .. })
    }

    /// The request this event belongs to
    pub fn request_id(&self) -> u64 {
        match self {
            SessionEvent::RequestStart { request_id, .. }
            | SessionEvent::FirstContent { request_id }
            | SessionEvent::MessageUpdate { request_id, .. }
            | SessionEvent::ExecResults { request_id, .. }
            | SessionEvent::MessageEnd { request_id, .. }
            | SessionEvent::AnswerReady { request_id, .. }
            | SessionEvent::Error { request_id, .. }
            | SessionEvent::Cancelled { request_id }
            | SessionEvent::RequestEnd { request_id } => *request_id,
        }
    }
}
