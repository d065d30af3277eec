//! Incremental decoding of the newline-delimited JSON response stream
//!
//! The backend writes one JSON object per line, but the transport hands us
//! chunks that may cut a line (or a UTF-8 sequence) anywhere. The decoder
//! appends fragments to a running buffer until the buffer parses.

use crate::error::{Error, Result};
use crate::types::ResultFrame;

/// Keep-alive fragment sent by the backend between frames
pub const HEARTBEAT: &str = "{}";

/// Reassembles complete result frames from raw stream chunks
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Bytes of an incomplete UTF-8 sequence held back from the last chunk
    pending_bytes: Vec<u8>,
    /// Fragments accumulated since the last complete frame
    running_text: String,
}

impl FrameDecoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw chunk and return the frames it completes, in order.
    ///
    /// Processing stops at the first error; the error is the last item.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<ResultFrame>> {
        let text = self.decode(chunk);
        let mut frames = Vec::new();

        for fragment in text.split('\n') {
            match self.push_fragment(fragment) {
                None => {}
                Some(Ok(frame)) => frames.push(Ok(frame)),
                Some(Err(e)) => {
                    frames.push(Err(e));
                    break;
                }
            }
        }

        frames
    }

    /// Consume the decoder, returning any unterminated partial frame
    pub fn finish(self) -> Option<String> {
        let mut rest = self.running_text;
        if !self.pending_bytes.is_empty() {
            rest.push_str(&String::from_utf8_lossy(&self.pending_bytes));
        }
        if rest.is_empty() { None } else { Some(rest) }
    }

    fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending_bytes.extend_from_slice(chunk);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending_bytes) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending_bytes.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    if let Ok(text) = std::str::from_utf8(&self.pending_bytes[..valid]) {
                        out.push_str(text);
                    }
                    match e.error_len() {
                        // Truncated sequence at the end: wait for the next chunk
                        None => {
                            self.pending_bytes.drain(..valid);
                            break;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending_bytes.drain(..valid + len);
                        }
                    }
                }
            }
        }

        out
    }

    fn push_fragment(&mut self, fragment: &str) -> Option<Result<ResultFrame>> {
        if fragment.is_empty() || fragment == HEARTBEAT {
            return None;
        }

        self.running_text.push_str(fragment);

        let value: serde_json::Value = match serde_json::from_str(&self.running_text) {
            Ok(value) => value,
            Err(e) if e.is_eof() || e.is_syntax() => {
                tracing::trace!(buffered = self.running_text.len(), "Incomplete frame, continuing");
                return None;
            }
            Err(e) => {
                self.running_text.clear();
                return Some(Err(e.into()));
            }
        };

        self.running_text.clear();
        Some(into_frame(value))
    }
}

/// Interpret a parsed JSON value as a result frame
fn into_frame(value: serde_json::Value) -> Result<ResultFrame> {
    let frame: ResultFrame = serde_json::from_value(value)
        .map_err(|e| Error::UnexpectedResponse(format!("malformed result frame: {}", e)))?;

    if frame.choices.is_empty() {
        if let Some(message) = frame.error_message() {
            return Err(Error::Backend(message));
        }
    }

    Ok(frame)
}
