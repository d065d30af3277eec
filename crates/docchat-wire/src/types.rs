//! Core types exchanged with the chat backend

use serde::{Deserialize, Deserializer, Serialize};

/// Message roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
    Error,
}

impl Role {
    /// Get the role as it appears on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
            Role::Error => "error",
        }
    }

    /// Parse a wire role, returning `None` for roles this client does not model
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "tool" => Some(Role::Tool),
            "error" => Some(Role::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message content: plain text or a structured JSON payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Structured(serde_json::Value),
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl MessageContent {
    /// Get text if this is text content
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Structured(_) => None,
        }
    }

    /// Render the content as a string; structured content is serialized as JSON
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Structured(value) => value.to_string(),
        }
    }

    /// Check whether the content carries nothing
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Structured(value) => value.is_null(),
        }
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// User feedback attached to an assistant answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Feedback {
    Neutral,
    Positive,
    Negative,
    MissingCitation,
    WrongCitation,
    OutOfScope,
    InaccurateOrIrrelevant,
    OtherUnhelpful,
    HateSpeech,
    Violent,
    Sexual,
    Manipulative,
    OtherHarmful,
    /// A value this client does not know, kept verbatim
    Other(String),
}

impl Feedback {
    /// Get the wire value
    pub fn as_str(&self) -> &str {
        match self {
            Feedback::Neutral => "neutral",
            Feedback::Positive => "positive",
            Feedback::Negative => "negative",
            Feedback::MissingCitation => "missing_citation",
            Feedback::WrongCitation => "wrong_citation",
            Feedback::OutOfScope => "out_of_scope",
            Feedback::InaccurateOrIrrelevant => "inaccurate_or_irrelevant",
            Feedback::OtherUnhelpful => "other_unhelpful",
            Feedback::HateSpeech => "hate_speech",
            Feedback::Violent => "violent",
            Feedback::Sexual => "sexual",
            Feedback::Manipulative => "manipulative",
            Feedback::OtherHarmful => "other_harmful",
            Feedback::Other(value) => value,
        }
    }

    /// Whether this feedback counts as a thumbs-down
    pub fn is_negative(&self) -> bool {
        !matches!(self, Feedback::Neutral | Feedback::Positive | Feedback::Other(_))
    }
}

impl From<String> for Feedback {
    fn from(value: String) -> Self {
        match value.as_str() {
            "neutral" => Feedback::Neutral,
            "positive" => Feedback::Positive,
            "negative" => Feedback::Negative,
            "missing_citation" => Feedback::MissingCitation,
            "wrong_citation" => Feedback::WrongCitation,
            "out_of_scope" => Feedback::OutOfScope,
            "inaccurate_or_irrelevant" => Feedback::InaccurateOrIrrelevant,
            "other_unhelpful" => Feedback::OtherUnhelpful,
            "hate_speech" => Feedback::HateSpeech,
            "violent" => Feedback::Violent,
            "sexual" => Feedback::Sexual,
            "manipulative" => Feedback::Manipulative,
            "other_harmful" => Feedback::OtherHarmful,
            _ => Feedback::Other(value),
        }
    }
}

impl From<Feedback> for String {
    fn from(feedback: Feedback) -> Self {
        feedback.as_str().to_string()
    }
}

/// A message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub content: MessageContent,
    #[serde(default)]
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
    /// Serialized tool context attached to the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl ChatMessage {
    /// Create a message with a client-generated id and the current timestamp
    pub fn new(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            date: now_rfc3339(),
            feedback: None,
            context: None,
        }
    }

    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text.into())
    }

    /// Create an error message shown in-line in the conversation
    pub fn error(text: impl Into<String>) -> Self {
        Self::new(Role::Error, text.into())
    }

    /// Create a tool message carrying serialized context
    pub fn tool(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::Tool, content)
    }

    /// Get the content rendered as text
    pub fn text(&self) -> String {
        self.content.to_text()
    }
}

/// Current UTC time as an RFC 3339 string
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// A source document referenced by an answer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Citation {
    /// Original 1-based document index, as a string
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    /// Display-sequential index
    pub reindex_id: Option<String>,
    pub title: Option<String>,
    pub filepath: Option<String>,
    pub url: Option<String>,
    #[serde(deserialize_with = "lenient_opt_string")]
    pub chunk_id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub content: String,
    pub full_content: Option<String>,
    pub highlight_text: Option<String>,
    pub context_before: Option<String>,
    pub context_after: Option<String>,
    /// Position among citations sharing the same filepath, starting at 1
    pub part_index: Option<u32>,
    #[serde(deserialize_with = "lenient_u32")]
    pub page: Option<u32>,
    pub metadata: Option<serde_json::Value>,
}

/// Scalars as text; null and structured values count as missing
fn scalar_text(value: Option<serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Accept ids sent as strings, numbers or null
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(scalar_text(value).unwrap_or_default())
}

fn lenient_opt_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(scalar_text(value))
}

/// Accept page numbers sent either as numbers or numeric strings
fn lenient_u32<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Context carried by a tool message: the citations and search intent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolContext {
    pub citations: Vec<Citation>,
    pub intent: Option<serde_json::Value>,
}

/// Diagnostic payload describing one tool execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecResult {
    pub intent: String,
    pub search_query: Option<String>,
    pub search_result: Option<serde_json::Value>,
    pub code_generated: Option<String>,
    pub code_exec_result: Option<serde_json::Value>,
}

/// Wrapper for the `all_exec_results` payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecResults {
    pub all_exec_results: Vec<ExecResult>,
}

/// A message as it appears inside a streamed result frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WireMessage {
    pub role: String,
    pub content: Option<MessageContent>,
    pub id: Option<String>,
    pub date: Option<String>,
    pub context: Option<serde_json::Value>,
}

impl WireMessage {
    /// Parse the role, if it is one this client models
    pub fn role(&self) -> Option<Role> {
        Role::parse(&self.role)
    }

    /// Get the context as a string; object contexts are serialized
    pub fn context_string(&self) -> Option<String> {
        match &self.context {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        }
    }
}

/// One choice in a result frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Choice {
    pub messages: Vec<WireMessage>,
}

/// One complete JSON object of the response stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultFrame {
    pub id: Option<String>,
    pub model: Option<String>,
    pub created: Option<i64>,
    pub object: Option<String>,
    pub choices: Vec<Choice>,
    pub history_metadata: Option<serde_json::Value>,
    #[serde(rename = "apim-request-id")]
    pub apim_request_id: Option<String>,
    pub error: Option<serde_json::Value>,
}

impl ResultFrame {
    /// Messages of the first choice
    pub fn messages(&self) -> &[WireMessage] {
        self.choices
            .first()
            .map(|c| c.messages.as_slice())
            .unwrap_or(&[])
    }

    /// Get the error message if the frame reports one
    pub fn error_message(&self) -> Option<String> {
        match self.error.as_ref()? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(obj) => Some(
                obj.get("message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| serde_json::Value::Object(obj.clone()).to_string()),
            ),
            other => Some(other.to_string()),
        }
    }

    /// Conversation id assigned by the history endpoint, if any
    pub fn conversation_id(&self) -> Option<&str> {
        self.history_metadata
            .as_ref()?
            .get("conversation_id")?
            .as_str()
    }
}

/// Body of a conversation request
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversationRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl ConversationRequest {
    /// Build a request from conversation messages, leaving out error messages
    pub fn new(conversation_id: Option<String>, messages: &[ChatMessage]) -> Self {
        Self {
            messages: messages
                .iter()
                .filter(|m| m.role != Role::Error)
                .cloned()
                .collect(),
            conversation_id,
        }
    }
}

/// UI settings exposed by the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiSettings {
    pub title: Option<String>,
    pub chat_title: Option<String>,
    pub chat_description: Option<String>,
    pub show_share_button: bool,
    pub show_chat_history_button: bool,
}

/// Settings returned by `GET /frontend_settings`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontendSettings {
    pub auth_enabled: bool,
    pub feedback_enabled: bool,
    pub ui: UiSettings,
    pub sanitize_answer: bool,
    pub oyd_enabled: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_wire_names() {
        for role in [Role::User, Role::Assistant, Role::Tool, Role::Error] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("function"), None);
    }

    #[test]
    fn test_untagged_content_prefers_text() {
        let msg: WireMessage =
            serde_json::from_str(r#"{"role":"assistant","content":"Hi"}"#).unwrap();
        assert_eq!(msg.content, Some(MessageContent::Text("Hi".into())));

        let msg: WireMessage =
            serde_json::from_str(r#"{"role":"tool","content":{"citations":[]}}"#).unwrap();
        assert!(matches!(msg.content, Some(MessageContent::Structured(_))));
    }

    #[test]
    fn test_null_content_is_none() {
        let msg: WireMessage =
            serde_json::from_str(r#"{"role":"assistant","content":null}"#).unwrap();
        assert!(msg.content.is_none());
    }

    #[test]
    fn test_context_object_is_serialized() {
        let msg: WireMessage = serde_json::from_str(
            r#"{"role":"assistant","content":"","context":{"citations":[]}}"#,
        )
        .unwrap();
        assert_eq!(msg.context_string().as_deref(), Some(r#"{"citations":[]}"#));
    }

    #[test]
    fn test_feedback_known_and_unknown_values() {
        let f: Feedback = serde_json::from_str(r#""missing_citation""#).unwrap();
        assert_eq!(f, Feedback::MissingCitation);
        assert!(f.is_negative());

        let f: Feedback = serde_json::from_str(r#""wrong_citation,out_of_scope""#).unwrap();
        assert_eq!(f, Feedback::Other("wrong_citation,out_of_scope".into()));
        assert_eq!(serde_json::to_string(&f).unwrap(), r#""wrong_citation,out_of_scope""#);
    }

    #[test]
    fn test_citation_page_accepts_string_or_number() {
        let c: Citation = serde_json::from_str(r#"{"content":"x","page":"12"}"#).unwrap();
        assert_eq!(c.page, Some(12));
        let c: Citation = serde_json::from_str(r#"{"content":"x","page":3}"#).unwrap();
        assert_eq!(c.page, Some(3));
        let c: Citation = serde_json::from_str(r#"{"content":"x","page":"n/a"}"#).unwrap();
        assert_eq!(c.page, None);
    }

    #[test]
    fn test_citation_ids_tolerate_null_and_numbers() {
        let context: ToolContext = serde_json::from_str(
            r#"{"citations":[{"content":"a","id":null},{"content":"b"},{"content":"c","id":7,"chunk_id":3}]}"#,
        )
        .unwrap();
        assert_eq!(context.citations.len(), 3);
        assert_eq!(context.citations[0].id, "");
        assert_eq!(context.citations[1].content, "b");
        assert_eq!(context.citations[2].id, "7");
        assert_eq!(context.citations[2].chunk_id.as_deref(), Some("3"));

        let context: ToolContext =
            serde_json::from_str(r#"{"citations":[{"content":null,"chunk_id":{"n":1}}]}"#).unwrap();
        assert_eq!(context.citations[0].content, "");
        assert_eq!(context.citations[0].chunk_id, None);
    }

    #[test]
    fn test_frame_error_message_variants() {
        let frame: ResultFrame = serde_json::from_str(r#"{"error":"boom"}"#).unwrap();
        assert_eq!(frame.error_message().as_deref(), Some("boom"));

        let frame: ResultFrame =
            serde_json::from_str(r#"{"error":{"message":"nested","code":400}}"#).unwrap();
        assert_eq!(frame.error_message().as_deref(), Some("nested"));

        let frame: ResultFrame = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert_eq!(frame.error_message(), None);
    }

    #[test]
    fn test_frame_conversation_id_from_history_metadata() {
        let frame: ResultFrame = serde_json::from_str(
            r#"{"history_metadata":{"conversation_id":"c-1","title":"Valves"}}"#,
        )
        .unwrap();
        assert_eq!(frame.conversation_id(), Some("c-1"));
    }

    #[test]
    fn test_request_excludes_error_messages() {
        let messages = vec![
            ChatMessage::user("first"),
            ChatMessage::error("it broke"),
            ChatMessage::user("second"),
        ];
        let request = ConversationRequest::new(None, &messages);
        assert_eq!(request.messages.len(), 2);
        assert!(request.messages.iter().all(|m| m.role == Role::User));

        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("conversation_id").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn test_client_generated_ids_are_unique() {
        let a = ChatMessage::user("a");
        let b = ChatMessage::user("a");
        assert_ne!(a.id, b.id);
        assert!(!a.date.is_empty());
    }
}
