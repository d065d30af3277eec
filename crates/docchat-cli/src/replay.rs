//! Offline playback of a captured response body

use std::path::Path;

use async_trait::async_trait;
use docchat_wire::client::frames_from_chunks;
use docchat_wire::{ChatBackend, ConversationRequest, FrameStream};

/// A backend that answers every request with the same captured NDJSON body
pub struct ReplayBackend {
    body: Vec<u8>,
    chunk_size: Option<usize>,
}

impl ReplayBackend {
    pub fn new(body: Vec<u8>, chunk_size: Option<usize>) -> Self {
        Self { body, chunk_size }
    }

    /// Read a captured body from disk
    pub fn from_file(path: &Path, chunk_size: Option<usize>) -> std::io::Result<Self> {
        Ok(Self::new(std::fs::read(path)?, chunk_size))
    }
}

#[async_trait]
impl ChatBackend for ReplayBackend {
    async fn stream(&self, request: &ConversationRequest) -> docchat_wire::Result<FrameStream> {
        tracing::debug!(
            messages = request.messages.len(),
            bytes = self.body.len(),
            chunk_size = ?self.chunk_size,
            "Replaying captured response"
        );
        Ok(frames_from_chunks(split_chunks(&self.body, self.chunk_size)))
    }
}

/// Split `body` into pieces of `size` bytes; the whole body when unset
pub fn split_chunks(body: &[u8], size: Option<usize>) -> Vec<Vec<u8>> {
    match size {
        Some(size) if size > 0 => body.chunks(size).map(<[u8]>::to_vec).collect(),
        _ => vec![body.to_vec()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docchat_session::{ChatSession, Outcome};
    use std::sync::Arc;

    const BODY: &str = concat!(
        "{}\n",
        r#"{"id":"x1","choices":[{"messages":[{"role":"tool","content":"{\"citations\":[{\"content\":\"Ünïcödé content about pumps.\",\"title\":\"Pumps\",\"filepath\":\"pumps.md\"}]}"}]}]}"#,
        "\n",
        r#"{"id":"x1","choices":[{"messages":[{"role":"assistant","content":"Pumps need priming [doc1]"}]}]}"#,
        "\n",
        r#"{"id":"x1","choices":[{"messages":[{"role":"assistant","content":" before use."}]}]}"#,
        "\n",
    );

    #[test]
    fn test_split_chunks() {
        assert_eq!(split_chunks(b"abcde", Some(2)), vec![b"ab".to_vec(), b"cd".to_vec(), b"e".to_vec()]);
        assert_eq!(split_chunks(b"abc", None), vec![b"abc".to_vec()]);
        assert_eq!(split_chunks(b"abc", Some(0)), vec![b"abc".to_vec()]);
    }

    #[tokio::test]
    async fn test_replay_gives_same_answer_for_any_chunk_size() {
        let mut answers = Vec::new();
        for chunk_size in [None, Some(1), Some(3), Some(17)] {
            let backend = Arc::new(ReplayBackend::new(BODY.as_bytes().to_vec(), chunk_size));
            let session = ChatSession::new(backend);
            let Outcome::Answered { answer, .. } = session.ask("pumps?").await.unwrap() else {
                panic!("replay failed for chunk size {:?}", chunk_size);
            };
            answers.push(answer.unwrap());
        }

        let first = &answers[0];
        assert_eq!(first.markdown_text, "Pumps need priming  ^1^  before use.");
        assert_eq!(first.citations[0].filepath.as_deref(), Some("pumps.md"));
        for answer in &answers[1..] {
            assert_eq!(answer.markdown_text, first.markdown_text);
            assert_eq!(answer.citations.len(), first.citations.len());
        }
    }
}
