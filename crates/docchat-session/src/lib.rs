//! docchat-session: Conversation runtime for the docchat backend
//!
//! This crate turns the backend's result frames into conversation state:
//! the stream reconciler folds streamed deltas into messages, the citation
//! extractor prepares finished answers for display, and `ChatSession` ties
//! both to a `ChatBackend` with cancellable requests.

pub mod citations;
pub mod conversation;
pub mod error;
pub mod events;
pub mod reconciler;
pub mod registry;
pub mod sanitize;
pub mod session;
pub mod theme;

pub use citations::{ParsedAnswer, intents, parse_answer, parse_message_answer, parse_tool_context};
pub use conversation::{Conversation, SessionState};
pub use error::{Error, Result};
pub use events::SessionEvent;
pub use reconciler::{ReconcileEvent, StreamReconciler, reconcile_frames};
pub use registry::{RequestGuard, RequestRegistry};
pub use sanitize::{NETWORK_ERROR_MESSAGE, sanitize_error_message};
pub use session::{ChatSession, Outcome};
pub use theme::{Theme, ThemeStore};
