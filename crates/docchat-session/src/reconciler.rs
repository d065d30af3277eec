//! Folding streamed result frames into conversation messages
//!
//! Assistant content arrives as deltas that are concatenated into one running
//! message. Tool messages (retrieval context) replace each other. At the end of
//! the stream the tool message, if any, is emitted before the assistant message.

use docchat_wire::{
    ChatMessage, ExecResult, ExecResults, MessageContent, ResultFrame, Role, WireMessage,
    now_rfc3339,
};

/// What changed after applying a frame
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileEvent {
    /// First assistant message of the stream
    FirstContent,
    /// Exec results were parsed out of a message
    ExecResults(Vec<ExecResult>),
    /// Snapshot of the in-progress pair
    Update {
        tool: Option<ChatMessage>,
        assistant: Option<ChatMessage>,
    },
}

/// Builds the final tool/assistant pair from streamed frames
#[derive(Debug, Default)]
pub struct StreamReconciler {
    assistant: Option<ChatMessage>,
    assistant_text: String,
    tool: Option<ChatMessage>,
    exec_results: Option<Vec<ExecResult>>,
    exec_context: Option<String>,
    first_content_seen: bool,
}

impl StreamReconciler {
    /// Create a new reconciler
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one result frame
    pub fn apply(&mut self, frame: &ResultFrame) -> Vec<ReconcileEvent> {
        let messages = frame.messages();
        let mut events = Vec::new();
        if messages.is_empty() {
            return events;
        }

        let date = now_rfc3339();

        if !self.first_content_seen && messages.iter().any(|m| m.role() == Some(Role::Assistant))
        {
            self.first_content_seen = true;
            events.push(ReconcileEvent::FirstContent);
        }

        for message in messages {
            let id = frame
                .id
                .clone()
                .or_else(|| message.id.clone())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            self.fold(message, id, &date, &mut events);
        }

        events
    }

    fn fold(
        &mut self,
        message: &WireMessage,
        id: String,
        date: &str,
        events: &mut Vec<ReconcileEvent>,
    ) {
        let Some(role) = message.role() else {
            tracing::warn!(role = %message.role, "Ignoring streamed message with unknown role");
            return;
        };
        let content = message.content.clone().unwrap_or_default();

        if let Some(results) = parse_exec_results(&content) {
            self.exec_context = serde_json::to_string(&ExecResults {
                all_exec_results: results.clone(),
            })
            .ok();
            if let Some(assistant) = self.assistant.as_mut() {
                assistant.context = self.exec_context.clone();
            }
            self.exec_results = Some(results.clone());
            events.push(ReconcileEvent::ExecResults(results));

            if role == Role::Tool {
                self.tool = Some(stamped(Role::Tool, id, content, date, message));
            }
            events.push(self.snapshot());
            return;
        }

        match role {
            Role::Assistant => {
                self.assistant_text.push_str(&content.to_text());

                let mut assistant = self.assistant.take().unwrap_or_else(|| ChatMessage {
                    id: id.clone(),
                    role: Role::Assistant,
                    content: MessageContent::default(),
                    date: date.to_string(),
                    feedback: None,
                    context: self.exec_context.clone(),
                });
                assistant.id = id;
                assistant.date = date.to_string();
                if let Some(context) = message.context_string() {
                    assistant.context = Some(context.clone());
                    self.tool = Some(ChatMessage::tool(context));
                }
                assistant.content = MessageContent::Text(self.assistant_text.clone());
                self.assistant = Some(assistant);
            }
            Role::Tool => {
                self.tool = Some(stamped(Role::Tool, id, content, date, message));
            }
            Role::User | Role::Error => {
                tracing::debug!(%role, "Ignoring unexpected message role mid-stream");
                return;
            }
        }

        events.push(self.snapshot());
    }

    fn snapshot(&self) -> ReconcileEvent {
        ReconcileEvent::Update {
            tool: self.tool.clone(),
            assistant: self.assistant.clone(),
        }
    }

    /// Whether any assistant content has arrived
    pub fn has_content(&self) -> bool {
        self.first_content_seen
    }

    /// The in-progress assistant message
    pub fn assistant(&self) -> Option<&ChatMessage> {
        self.assistant.as_ref()
    }

    /// The pending tool message
    pub fn tool(&self) -> Option<&ChatMessage> {
        self.tool.as_ref()
    }

    /// Exec results seen so far
    pub fn exec_results(&self) -> Option<&[ExecResult]> {
        self.exec_results.as_deref()
    }

    /// Finalize the stream: the tool message (if any) then the assistant message
    pub fn finish(self) -> Vec<ChatMessage> {
        self.tool.into_iter().chain(self.assistant).collect()
    }
}

fn stamped(
    role: Role,
    id: String,
    content: MessageContent,
    date: &str,
    message: &WireMessage,
) -> ChatMessage {
    ChatMessage {
        id,
        role,
        content,
        date: date.to_string(),
        feedback: None,
        context: message.context_string(),
    }
}

/// Recognize an embedded `all_exec_results` payload
fn parse_exec_results(content: &MessageContent) -> Option<Vec<ExecResult>> {
    let text = content.as_text()?;
    if !text.contains("all_exec_results") {
        return None;
    }
    match serde_json::from_str::<ExecResults>(text) {
        Ok(parsed) => Some(parsed.all_exec_results),
        Err(e) => {
            tracing::warn!(error = %e, "Content mentions all_exec_results but does not parse");
            None
        }
    }
}

/// Run frames through a fresh reconciler and return the final messages
pub fn reconcile_frames<'a>(frames: impl IntoIterator<Item = &'a ResultFrame>) -> Vec<ChatMessage> {
    let mut reconciler = StreamReconciler::new();
    for frame in frames {
        reconciler.apply(frame);
    }
    reconciler.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use docchat_wire::FrameDecoder;

    fn frame(json: &str) -> ResultFrame {
        serde_json::from_str(json).unwrap()
    }

    fn decode(chunks: &[&[u8]]) -> Vec<ResultFrame> {
        let mut decoder = FrameDecoder::new();
        chunks
            .iter()
            .flat_map(|c| decoder.push(c))
            .map(|r| r.unwrap())
            .collect()
    }

    /// Everything but the timestamps, which differ between runs
    fn shape(messages: &[ChatMessage]) -> Vec<(Role, String, String)> {
        messages
            .iter()
            .map(|m| (m.role, m.id.clone(), m.text()))
            .collect()
    }

    const STREAM: &str = concat!(
        r#"{"id":"r1","choices":[{"messages":[{"role":"tool","content":"{\"citations\":[{\"content\":\"Valves need grease.\",\"filepath\":\"a.pdf\"}],\"intent\":\"[\\\"valves\\\"]\"}"}]}]}"#,
        "\n{}\n",
        r#"{"id":"r1","choices":[{"messages":[{"role":"assistant","content":"Valves require "}]}]}"#,
        "\n",
        r#"{"id":"r1","choices":[{"messages":[{"role":"assistant","content":"maintenance [doc1]."}]}]}"#,
        "\n"
    );

    #[test]
    fn test_two_frame_split_reassembles_assistant() {
        let frames = decode(&[
            br#"{"choices":[{"mess"#,
            br#"ages":[{"role":"assistant","content":"Hi"}]}],"id":"abc"}"#,
        ]);
        let messages = reconcile_frames(&frames);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::Assistant);
        assert_eq!(messages[0].id, "abc");
        assert_eq!(messages[0].text(), "Hi");
    }

    #[test]
    fn test_assistant_content_is_concatenated_and_tool_comes_first() {
        let frames = decode(&[STREAM.as_bytes()]);
        let messages = reconcile_frames(&frames);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::Tool);
        assert!(messages[0].text().contains("Valves need grease."));
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].text(), "Valves require maintenance [doc1].");
        assert_eq!(messages[1].id, "r1");
    }

    #[test]
    fn test_split_invariance_of_final_messages() {
        let bytes = STREAM.as_bytes();
        let expected = shape(&reconcile_frames(&decode(&[bytes])));

        for split in 1..bytes.len() {
            let frames = decode(&[&bytes[..split], &bytes[split..]]);
            let got = shape(&reconcile_frames(&frames));
            assert_eq!(got, expected, "split at byte {}", split);
        }

        for size in [1, 2, 3, 7, 64] {
            let chunks: Vec<&[u8]> = bytes.chunks(size).collect();
            let got = shape(&reconcile_frames(&decode(&chunks)));
            assert_eq!(got, expected, "chunk size {}", size);
        }
    }

    #[test]
    fn test_first_content_signalled_once() {
        let mut reconciler = StreamReconciler::new();
        let tool = frame(r#"{"id":"r","choices":[{"messages":[{"role":"tool","content":"{}"}]}]}"#);
        let a = frame(r#"{"id":"r","choices":[{"messages":[{"role":"assistant","content":"a"}]}]}"#);

        let events = reconciler.apply(&tool);
        assert!(!events.contains(&ReconcileEvent::FirstContent));
        assert!(!reconciler.has_content());

        let events = reconciler.apply(&a);
        assert_eq!(events[0], ReconcileEvent::FirstContent);

        let events = reconciler.apply(&a);
        assert!(!events.contains(&ReconcileEvent::FirstContent));
        assert_eq!(reconciler.assistant().unwrap().text(), "aa");
    }

    #[test]
    fn test_assistant_context_spins_off_tool_message() {
        let mut reconciler = StreamReconciler::new();
        reconciler.apply(&frame(
            r#"{"id":"r","choices":[{"messages":[{"role":"assistant","content":"","context":{"citations":[]}}]}]}"#,
        ));
        reconciler.apply(&frame(
            r#"{"id":"r","choices":[{"messages":[{"role":"assistant","content":"done"}]}]}"#,
        ));

        let messages = reconciler.finish();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::Tool);
        assert_eq!(messages[0].text(), r#"{"citations":[]}"#);
        assert_ne!(messages[0].id, "r");
        assert_eq!(messages[1].context.as_deref(), Some(r#"{"citations":[]}"#));
        assert_eq!(messages[1].text(), "done");
    }

    #[test]
    fn test_later_tool_message_replaces_earlier() {
        let frames = vec![
            frame(r#"{"id":"r","choices":[{"messages":[{"role":"tool","content":"first"}]}]}"#),
            frame(r#"{"id":"r","choices":[{"messages":[{"role":"tool","content":"second"}]}]}"#),
        ];
        let messages = reconcile_frames(&frames);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text(), "second");
    }

    #[test]
    fn test_exec_results_go_to_side_channel() {
        let mut reconciler = StreamReconciler::new();
        let events = reconciler.apply(&frame(
            r#"{"id":"r","choices":[{"messages":[{"role":"tool","content":"{\"all_exec_results\":[{\"intent\":\"count orders\",\"search_query\":\"orders\",\"code_generated\":\"SELECT COUNT(*) FROM orders\",\"code_exec_result\":\"42\"}]}"}]}]}"#,
        ));
        assert!(matches!(&events[0], ReconcileEvent::ExecResults(r) if r[0].intent == "count orders"));

        reconciler.apply(&frame(
            r#"{"id":"r","choices":[{"messages":[{"role":"assistant","content":"There are 42 orders."}]}]}"#,
        ));

        let results = reconciler.exec_results().unwrap();
        assert_eq!(results[0].code_generated.as_deref(), Some("SELECT COUNT(*) FROM orders"));

        let messages = reconciler.finish();
        let assistant = messages.iter().find(|m| m.role == Role::Assistant).unwrap();
        assert_eq!(assistant.text(), "There are 42 orders.");
        assert!(assistant.context.as_deref().unwrap().contains("all_exec_results"));
    }

    #[test]
    fn test_assistant_exec_results_are_not_concatenated() {
        let frames = vec![
            frame(r#"{"id":"r","choices":[{"messages":[{"role":"assistant","content":"Answer. "}]}]}"#),
            frame(
                r#"{"id":"r","choices":[{"messages":[{"role":"assistant","content":"{\"all_exec_results\":[]}"}]}]}"#,
            ),
        ];
        let messages = reconcile_frames(&frames);
        assert_eq!(messages[0].text(), "Answer. ");
    }

    #[test]
    fn test_unparseable_exec_results_fall_back_to_text() {
        let frames = vec![frame(
            r#"{"id":"r","choices":[{"messages":[{"role":"assistant","content":"see all_exec_results above"}]}]}"#,
        )];
        let messages = reconcile_frames(&frames);
        assert_eq!(messages[0].text(), "see all_exec_results above");
    }

    #[test]
    fn test_unknown_and_user_roles_are_ignored() {
        let frames = vec![frame(
            r#"{"id":"r","choices":[{"messages":[{"role":"function","content":"x"},{"role":"user","content":"y"}]}]}"#,
        )];
        assert!(reconcile_frames(&frames).is_empty());
    }

    #[test]
    fn test_frame_without_id_keeps_message_id() {
        let frames = vec![frame(
            r#"{"choices":[{"messages":[{"role":"assistant","content":"x","id":"m-7"}]}]}"#,
        )];
        assert_eq!(reconcile_frames(&frames)[0].id, "m-7");
    }
}
