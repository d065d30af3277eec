//! HTTP client for the chat backend

use std::pin::Pin;

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use tokio_stream::Stream;

use crate::{
    error::{Error, Result},
    frame::FrameDecoder,
    types::{ConversationRequest, Feedback, FrontendSettings, ResultFrame},
};

/// A stream of decoded result frames; an `Err` item ends the stream
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<ResultFrame>> + Send>>;

/// Trait for chat backends
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send the conversation and stream back result frames
    async fn stream(&self, request: &ConversationRequest) -> Result<FrameStream>;

    /// Store the finished exchange in the backend's conversation history.
    ///
    /// `request` carries the backend conversation id and the messages, ending
    /// with the tool message and the assistant answer. Backends without
    /// history accept and ignore it.
    async fn update_history(&self, _request: &ConversationRequest) -> Result<()> {
        Ok(())
    }

    /// Record a rating for an answer stored in history
    async fn send_feedback(&self, _message_id: &str, _feedback: &Feedback) -> Result<()> {
        Ok(())
    }
}

/// Body of a message feedback request
#[derive(Debug, Serialize)]
struct FeedbackRequest<'a> {
    message_id: &'a str,
    message_feedback: &'a Feedback,
}

/// Backend reached over HTTP
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    headers: HeaderMap,
    history_enabled: bool,
}

impl HttpBackend {
    /// Create a backend client for the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            headers: HeaderMap::new(),
            history_enabled: false,
        }
    }

    /// Route requests through the history endpoint so the backend persists them
    pub fn with_history(mut self, enabled: bool) -> Self {
        self.history_enabled = enabled;
        self
    }

    /// Add a header sent with every request
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = name
            .parse::<HeaderName>()
            .map_err(|e| Error::InvalidConfig(format!("header name {:?}: {}", name, e)))?;
        let value = value
            .parse::<HeaderValue>()
            .map_err(|e| Error::InvalidConfig(format!("header value for {}: {}", name, e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// URL that conversation requests are posted to
    pub fn conversation_url(&self) -> String {
        if self.history_enabled {
            format!("{}/history/generate", self.base_url)
        } else {
            format!("{}/conversation", self.base_url)
        }
    }

    /// Fetch the backend's UI settings
    pub async fn frontend_settings(&self) -> Result<FrontendSettings> {
        let url = format!("{}/frontend_settings", self.base_url);

        let response = self
            .client
            .get(&url)
            .headers(self.headers.clone())
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }

    /// Post a JSON body to a history endpoint, discarding the response body
    async fn post_json<T: Serialize + Sync>(&self, path: &str, body: &T) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%url, "Posting to history endpoint");

        let response = self
            .client
            .post(&url)
            .headers(self.headers.clone())
            .json(body)
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn stream(&self, request: &ConversationRequest) -> Result<FrameStream> {
        let url = self.conversation_url();
        tracing::debug!(%url, messages = request.messages.len(), "Sending conversation request");

        let response = self
            .client
            .post(&url)
            .headers(self.headers.clone())
            .json(request)
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(decode_frames(response.bytes_stream()))
    }

    async fn update_history(&self, request: &ConversationRequest) -> Result<()> {
        if !self.history_enabled {
            return Ok(());
        }
        self.post_json("/history/update", request).await
    }

    async fn send_feedback(&self, message_id: &str, feedback: &Feedback) -> Result<()> {
        if !self.history_enabled {
            return Ok(());
        }
        let body = FeedbackRequest {
            message_id,
            message_feedback: feedback,
        };
        self.post_json("/history/message_feedback", &body).await
    }
}

/// Turn a non-success response into an API error
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(Error::api(status.as_u16(), error_from_body(&text)))
}

/// Pull the `error` field out of a JSON error body, or return the body as-is
fn error_from_body(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

/// Decode a stream of raw chunks into result frames
pub fn decode_frames<S, B, E>(chunks: S) -> FrameStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<Error> + Send + 'static,
{
    Box::pin(stream! {
        let mut chunks = Box::pin(chunks);
        let mut decoder = FrameDecoder::new();

        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(e.into());
                    return;
                }
            };

            for item in decoder.push(chunk.as_ref()) {
                let failed = item.is_err();
                yield item;
                if failed {
                    return;
                }
            }
        }

        if let Some(rest) = decoder.finish() {
            tracing::debug!(bytes = rest.len(), "Stream ended with an unterminated frame");
        }
    })
}

/// Build a frame stream from in-memory chunks (captured bodies, tests)
pub fn frames_from_chunks(chunks: Vec<Vec<u8>>) -> FrameStream {
    decode_frames(tokio_stream::iter(chunks.into_iter().map(Ok::<_, Error>)))
}
