//! Chat session: sends questions, drives the response stream and keeps the
//! conversation up to date.

use std::sync::Arc;

use docchat_wire::{ChatBackend, ChatMessage, ConversationRequest, ExecResult, Feedback, Role};
use futures::StreamExt;
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::{
    citations::ParsedAnswer,
    conversation::{Conversation, SessionState},
    error::{Error, Result},
    events::SessionEvent,
    reconciler::{ReconcileEvent, StreamReconciler},
    registry::RequestRegistry,
    sanitize::{NETWORK_ERROR_MESSAGE, sanitize_error_message},
};

/// How a question ended
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The stream completed; `messages` were appended to the conversation
    Answered {
        messages: Vec<ChatMessage>,
        answer: Option<ParsedAnswer>,
    },
    /// The request failed and this error message was appended
    Failed(ChatMessage),
    /// The user stopped the request, or a new conversation replaced it
    Cancelled,
}

/// What a running request is bound to
struct RequestScope {
    id: u64,
    token: CancellationToken,
    /// Client-side id of the conversation the question was asked in
    conversation_id: String,
}

/// A chat session against one backend.
///
/// Cloning is cheap and clones share the same conversation, so one clone can
/// call [`ChatSession::stop_generating`] while another is inside
/// [`ChatSession::ask`].
#[derive(Clone)]
pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    state: Arc<Mutex<SessionState>>,
    event_tx: broadcast::Sender<SessionEvent>,
    requests: RequestRegistry,
}

impl ChatSession {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            backend,
            state: Arc::new(Mutex::new(SessionState::default())),
            event_tx,
            requests: RequestRegistry::new(),
        }
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Snapshot of the current conversation
    pub fn conversation(&self) -> Conversation {
        self.state.lock().conversation.clone()
    }

    /// Whether a request is in flight
    pub fn is_loading(&self) -> bool {
        self.state.lock().is_loading
    }

    /// Whether the in-flight request has not produced assistant content yet
    pub fn show_loading_message(&self) -> bool {
        self.state.lock().show_loading_message
    }

    /// Latest exec results
    pub fn exec_results(&self) -> Option<Vec<ExecResult>> {
        self.state.lock().exec_results.clone()
    }

    /// The in-progress tool/assistant pair of the current stream
    pub fn streaming(&self) -> (Option<ChatMessage>, Option<ChatMessage>) {
        let state = self.state.lock();
        (state.streaming_tool.clone(), state.streaming_assistant.clone())
    }

    /// Last completed answer
    pub fn last_answer(&self) -> Option<ParsedAnswer> {
        self.state.lock().last_answer.clone()
    }

    /// The registry of in-flight requests
    pub fn requests(&self) -> &RequestRegistry {
        &self.requests
    }

    /// Stop every in-flight request. Returns how many were stopped.
    pub fn stop_generating(&self) -> usize {
        self.requests.stop_all()
    }

    /// Wait until no request is in flight
    pub async fn wait_for_idle(&self) {
        self.requests.wait_for_idle().await
    }

    /// Stop anything running and start an empty conversation
    pub fn new_conversation(&self) {
        self.stop_generating();
        let mut state = self.state.lock();
        *state = SessionState::default();
        tracing::debug!(conversation_id = %state.conversation.id, "Started new conversation");
    }

    /// Rate an assistant message of the current conversation.
    ///
    /// The rating is kept on the message and, when the conversation is stored
    /// by the history endpoint, sent to the backend.
    pub async fn send_feedback(&self, message_id: &str, feedback: Feedback) -> Result<()> {
        let stored = {
            let mut state = self.state.lock();
            let conversation = &mut state.conversation;
            let message = conversation
                .messages
                .iter_mut()
                .find(|m| m.id == message_id && m.role == Role::Assistant)
                .ok_or_else(|| Error::UnknownMessage(message_id.to_string()))?;
            message.feedback = Some(feedback.clone());
            conversation.remote_id.is_some()
        };

        if stored {
            self.backend.send_feedback(message_id, &feedback).await?;
        }
        tracing::debug!(message_id, feedback = feedback.as_str(), "Recorded feedback");
        Ok(())
    }

    /// Ask a question and wait for the answer.
    ///
    /// Backend failures are not returned as `Err`: they end up in the
    /// conversation as an error message and come back as [`Outcome::Failed`].
    pub async fn ask(&self, question: &str) -> Result<Outcome> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::EmptyQuestion);
        }

        let message = ChatMessage::user(question);

        // Registered under the state lock, so a concurrent new_conversation
        // either cancels this request or runs before the question is added
        let (guard, scope, request) = {
            let mut state = self.state.lock();
            let guard = self.requests.register();
            state.conversation.push(message.clone());
            state.is_loading = true;
            state.show_loading_message = true;
            state.clear_streaming();
            let scope = RequestScope {
                id: guard.id(),
                token: guard.token().clone(),
                conversation_id: state.conversation.id.clone(),
            };
            (guard, scope, state.conversation.request())
        };
        let request_id = scope.id;
        self.emit(SessionEvent::RequestStart {
            request_id,
            message,
        });

        let outcome = match self.drive(&scope, &request).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_aborted() => self.cancelled(&scope),
            Err(e) => self.fail(&scope, &e),
        };

        {
            let mut state = self.state.lock();
            // Other requests may still be streaming into the same conversation
            if self.requests.active_count() <= 1 {
                state.is_loading = false;
                state.show_loading_message = false;
            }
        }
        self.emit(SessionEvent::RequestEnd { request_id });
        drop(guard);

        Ok(outcome)
    }

    /// Lock the state for a request that may still write to it.
    ///
    /// Fails with [`docchat_wire::Error::Aborted`] once the request is
    /// cancelled or its conversation has been replaced.
    fn live_state(&self, scope: &RequestScope) -> Result<MutexGuard<'_, SessionState>> {
        let state = self.state.lock();
        if scope.token.is_cancelled() || state.conversation.id != scope.conversation_id {
            return Err(docchat_wire::Error::Aborted.into());
        }
        Ok(state)
    }

    /// Run one request to completion
    async fn drive(&self, scope: &RequestScope, request: &ConversationRequest) -> Result<Outcome> {
        let request_id = scope.id;
        let token = &scope.token;

        let mut frames = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(docchat_wire::Error::Aborted.into()),
            result = self.backend.stream(request) => result?,
        };

        let mut reconciler = StreamReconciler::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(docchat_wire::Error::Aborted.into()),
                next = frames.next() => next,
            };
            let Some(frame) = next else { break };
            let frame = frame?;

            let events = reconciler.apply(&frame);
            {
                let mut state = self.live_state(scope)?;
                if let Some(id) = frame.conversation_id() {
                    state.conversation.adopt_remote_id(id);
                }
                for event in &events {
                    record(&mut state, event);
                }
            }
            for event in events {
                self.emit(session_event(request_id, event));
            }
        }

        let messages = reconciler.finish();
        let (answer, history) = {
            let mut state = self.live_state(scope)?;
            for message in &messages {
                state.conversation.push(message.clone());
            }
            state.clear_streaming();

            let answer = messages
                .iter()
                .any(|m| m.role == Role::Assistant)
                .then(|| state.conversation.latest_answer())
                .flatten();
            if answer.is_some() {
                state.last_answer = answer.clone();
            }
            let history = (answer.is_some() && state.conversation.remote_id.is_some())
                .then(|| state.conversation.request());
            (answer, history)
        };

        tracing::debug!(request_id, messages = messages.len(), "Stream complete");
        self.emit(SessionEvent::MessageEnd {
            request_id,
            messages: messages.clone(),
        });
        if let Some(answer) = &answer {
            self.emit(SessionEvent::AnswerReady {
                request_id,
                answer: answer.clone(),
            });
        }

        // The answer stands even if the backend fails to store it
        if let Some(history) = history {
            if let Err(e) = self.backend.update_history(&history).await {
                tracing::warn!(request_id, error = %e, "Failed to store answer in history");
            }
        }

        Ok(Outcome::Answered { messages, answer })
    }

    fn cancelled(&self, scope: &RequestScope) -> Outcome {
        tracing::info!(request_id = scope.id, "Request cancelled");
        self.emit(SessionEvent::Cancelled {
            request_id: scope.id,
        });
        Outcome::Cancelled
    }

    /// Record a failed request as an error message in the conversation
    fn fail(&self, scope: &RequestScope, error: &Error) -> Outcome {
        let message = ChatMessage::error(error_text(error));
        match self.live_state(scope) {
            Ok(mut state) => {
                state.clear_streaming();
                state.conversation.push(message.clone());
            }
            // Stopped while failing: report the stop, not the failure
            Err(_) => return self.cancelled(scope),
        }
        self.emit(SessionEvent::Error {
            request_id: scope.id,
            message: message.clone(),
        });
        Outcome::Failed(message)
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }
}

/// Apply a reconcile event to the session state
fn record(state: &mut SessionState, event: &ReconcileEvent) {
    match event {
        ReconcileEvent::FirstContent => state.show_loading_message = false,
        ReconcileEvent::ExecResults(results) => state.exec_results = Some(results.clone()),
        ReconcileEvent::Update { tool, assistant } => {
            state.streaming_tool = tool.clone();
            state.streaming_assistant = assistant.clone();
        }
    }
}

fn session_event(request_id: u64, event: ReconcileEvent) -> SessionEvent {
    match event {
        ReconcileEvent::FirstContent => SessionEvent::FirstContent { request_id },
        ReconcileEvent::ExecResults(results) => SessionEvent::ExecResults {
            request_id,
            results,
        },
        ReconcileEvent::Update { tool, assistant } => SessionEvent::MessageUpdate {
            request_id,
            tool,
            assistant,
        },
    }
}

/// Text shown to the user for a failed request
fn error_text(error: &Error) -> String {
    match error {
        Error::Wire(docchat_wire::Error::Api { message, .. })
        | Error::Wire(docchat_wire::Error::Backend(message)) => {
            tracing::warn!(error = %error, "Backend reported an error");
            sanitize_error_message(message)
        }
        other if other.is_transport() => {
            tracing::error!(error = %other, "Request to backend failed");
            NETWORK_ERROR_MESSAGE.to_string()
        }
        other => {
            tracing::error!(error = %other, "Unreadable response from backend");
            NETWORK_ERROR_MESSAGE.to_string()
        }
    }
}
