//! Conversation state: messages, backend conversation id, streaming status.

use docchat_wire::{ChatMessage, ConversationRequest, ExecResult, Role, now_rfc3339};

use crate::citations::{ParsedAnswer, parse_message_answer};

/// Longest title derived from the first question, in characters
const TITLE_MAX_CHARS: usize = 50;

/// One conversation with the backend
#[derive(Debug, Clone)]
pub struct Conversation {
    /// Client-side id
    pub id: String,
    /// Id assigned by the history endpoint, once known
    pub remote_id: Option<String>,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    /// Creation time
    pub date: String,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            remote_id: None,
            title: String::new(),
            messages: Vec::new(),
            date: now_rfc3339(),
        }
    }

    /// Append a message; the first user message names the conversation
    pub fn push(&mut self, message: ChatMessage) {
        if self.title.is_empty() && message.role == Role::User {
            self.title = title_from(&message.text());
        }
        self.messages.push(message);
    }

    /// Adopt the conversation id assigned by the backend
    pub fn adopt_remote_id(&mut self, id: &str) {
        if self.remote_id.as_deref() != Some(id) {
            tracing::debug!(conversation_id = %id, "Adopted backend conversation id");
            self.remote_id = Some(id.to_string());
        }
    }

    /// The request body for sending this conversation
    pub fn request(&self) -> ConversationRequest {
        ConversationRequest::new(self.remote_id.clone(), &self.messages)
    }

    /// The most recent assistant answer, parsed for display
    pub fn latest_answer(&self) -> Option<ParsedAnswer> {
        let index = self
            .messages
            .iter()
            .rposition(|m| m.role == Role::Assistant)?;
        parse_message_answer(&self.messages, index)
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

fn title_from(question: &str) -> String {
    let question = question.trim();
    if question.chars().count() <= TITLE_MAX_CHARS {
        return question.to_string();
    }
    let mut title: String = question.chars().take(TITLE_MAX_CHARS).collect();
    title.truncate(title.trim_end().len());
    title.push_str("...");
    title
}

/// Session state shared between the session handle and running requests
#[derive(Debug, Default)]
pub struct SessionState {
    pub conversation: Conversation,
    /// A request is in flight
    pub is_loading: bool,
    /// No assistant content has arrived yet for the request in flight
    pub show_loading_message: bool,
    /// In-progress tool message of the current stream
    pub streaming_tool: Option<ChatMessage>,
    /// In-progress assistant message of the current stream
    pub streaming_assistant: Option<ChatMessage>,
    /// Latest exec results, kept outside the message list
    pub exec_results: Option<Vec<ExecResult>>,
    /// Last completed answer
    pub last_answer: Option<ParsedAnswer>,
}

impl SessionState {
    /// Drop the in-progress snapshot
    pub fn clear_streaming(&mut self) {
        self.streaming_tool = None;
        self.streaming_assistant = None;
    }
}
