//! Salon backend API client.
//!
//! This module addresses the collaborator REST API: it creates chat sessions
//! and opens the chunked byte streams that the session layer consumes. It
//! performs no stream parsing itself.

use tracing::debug;

use crate::error::StreamError;
use crate::models::{SendMessageRequest, SessionCreated, SessionToken};
use crate::traits::{ByteStream, Headers, HttpClient};

/// Default base URL of the backend API (the development proxy target).
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/v1";

/// Path of the quote-generation stream for a lead.
pub fn lead_quote_path(lead_id: i64) -> String {
    format!("/leads/{}/generate-quote", lead_id)
}

/// Path of the AI-summary stream for a monthly report.
pub fn report_summary_path(month: &str) -> String {
    format!("/reports/{}/ai-summary", month)
}

/// Client for the salon backend API, generic over the transport.
pub struct SalonClient<C: HttpClient> {
    base_url: String,
    http: C,
}

impl<C: HttpClient> SalonClient<C> {
    /// Create a client against [`DEFAULT_BASE_URL`].
    pub fn new(http: C) -> Self {
        Self::with_base_url(http, DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL.
    pub fn with_base_url(http: C, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url, http }
    }

    /// The configured base URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create a new chat session and return its token.
    ///
    /// Sends `POST /chat/session`; the endpoint takes no body.
    pub async fn create_chat_session(&self) -> Result<SessionToken, StreamError> {
        let url = format!("{}/chat/session", self.base_url);
        debug!(%url, "creating chat session");

        let response = self.http.post(&url, None, &json_headers()).await?;

        if !response.is_success() {
            return Err(StreamError::Server {
                status: response.status,
                message: response.text().unwrap_or_default(),
            });
        }

        let created: SessionCreated = response.json().map_err(|e| StreamError::Payload {
            message: e.to_string(),
        })?;
        Ok(created.session_token)
    }

    /// Open the reply stream for one chat message.
    ///
    /// Sends `POST /chat/session/{token}/message` with a JSON body and
    /// returns the raw byte stream; framing is the session layer's concern.
    pub async fn open_message_stream(
        &self,
        token: &SessionToken,
        message: &str,
    ) -> Result<ByteStream, StreamError> {
        let url = format!("{}/chat/session/{}/message", self.base_url, token);
        let body =
            serde_json::to_string(&SendMessageRequest::new(message)).map_err(|e| {
                StreamError::Payload {
                    message: e.to_string(),
                }
            })?;
        debug!(%url, "opening message stream");

        let mut headers = json_headers();
        headers.insert("Accept".to_string(), "text/event-stream".to_string());

        let stream = self.http.post_stream(&url, Some(&body), &headers).await?;
        Ok(stream)
    }

    /// Open a single-shot generation stream (quote, AI summary).
    ///
    /// `path` is relative to the base URL, e.g. [`lead_quote_path`]. These
    /// endpoints take no body and no session token.
    pub async fn open_generation_stream(&self, path: &str) -> Result<ByteStream, StreamError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "opening generation stream");

        let stream = self.http.post_stream(&url, None, &Headers::new()).await?;
        Ok(stream)
    }
}

fn json_headers() -> Headers {
    let mut headers = Headers::new();
    headers.insert("Content-Type".to_string(), "application/json".to_string());
    headers
}
