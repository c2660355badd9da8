//! Mock HTTP client for testing.
//!
//! Provides a configurable mock transport that can return predefined
//! responses, scripted byte streams, mid-stream failures, or a manually
//! driven stream whose chunks the test feeds in by hand.

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::traits::{ByteStream, Headers, HttpClient, HttpError, Response};

/// Which trait operation a request went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Post,
    PostStream,
}

/// A recorded request for verification in tests.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub kind: RequestKind,
    pub url: String,
    pub headers: Headers,
    pub body: Option<String>,
}

/// Configuration for a mock response.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Return a buffered response.
    Success(Response),
    /// Fail the request outright.
    Error(HttpError),
    /// Return a stream that yields these chunks, then ends.
    Stream(Vec<Bytes>),
    /// Return a stream that yields these chunks, then fails mid-stream.
    StreamThenError { chunks: Vec<Bytes>, error: HttpError },
    /// Fail while opening the stream.
    StreamError(HttpError),
}

/// Mock HTTP client for testing.
///
/// Responses are configured per URL (exact match first, then prefix match,
/// then the default). Every request is recorded for later assertions.
///
/// # Example
///
/// ```ignore
/// use glowdesk_stream::adapters::mock::{MockHttpClient, MockResponse};
/// use bytes::Bytes;
///
/// let client = MockHttpClient::new();
/// client.set_response(
///     "http://test/chat/session/tok/message",
///     MockResponse::Stream(vec![Bytes::from("data: hi\n")]),
/// );
/// ```
#[derive(Clone, Default)]
pub struct MockHttpClient {
    /// Configured responses by URL pattern
    responses: Arc<Mutex<HashMap<String, MockResponse>>>,
    /// Manually driven streams by URL, taken on first use
    manual_streams: Arc<Mutex<HashMap<String, mpsc::UnboundedReceiver<Result<Bytes, HttpError>>>>>,
    /// Default response when no specific match
    default_response: Arc<Mutex<Option<MockResponse>>>,
    /// Recorded requests for verification
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl std::fmt::Debug for MockHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockHttpClient")
            .field("responses", &self.responses.lock().unwrap().len())
            .field("requests", &self.requests.lock().unwrap().len())
            .finish()
    }
}

impl MockHttpClient {
    /// Create a new mock HTTP client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a response for a specific URL.
    pub fn set_response(&self, url: &str, response: MockResponse) {
        let mut responses = self.responses.lock().unwrap();
        responses.insert(url.to_string(), response);
    }

    /// Set a default response for URLs without specific matches.
    pub fn set_default_response(&self, response: MockResponse) {
        let mut default = self.default_response.lock().unwrap();
        *default = Some(response);
    }

    /// Configure a manually driven stream for a URL.
    ///
    /// The returned sender feeds chunks (or a mid-stream error) to whoever
    /// opens the stream; dropping the sender ends it. The stream can be
    /// opened once. Manual streams take precedence over `set_response`.
    pub fn set_manual_stream(&self, url: &str) -> mpsc::UnboundedSender<Result<Bytes, HttpError>> {
        let (tx, rx) = mpsc::unbounded();
        self.manual_streams
            .lock()
            .unwrap()
            .insert(url.to_string(), rx);
        tx
    }

    /// Get all recorded requests.
    pub fn get_requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Clear all recorded requests.
    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }

    /// Clear all configured responses.
    pub fn clear_responses(&self) {
        self.responses.lock().unwrap().clear();
    }

    /// Record a request.
    fn record_request(&self, kind: RequestKind, url: &str, headers: &Headers, body: Option<String>) {
        let mut requests = self.requests.lock().unwrap();
        requests.push(RecordedRequest {
            kind,
            url: url.to_string(),
            headers: headers.clone(),
            body,
        });
    }

    /// Get the response for a URL.
    fn get_response(&self, url: &str) -> Option<MockResponse> {
        let responses = self.responses.lock().unwrap();

        // First try exact match
        if let Some(response) = responses.get(url) {
            return Some(response.clone());
        }

        // Then try prefix match (for URL patterns)
        for (pattern, response) in responses.iter() {
            if url.starts_with(pattern) {
                return Some(response.clone());
            }
        }

        // Finally use default
        let default = self.default_response.lock().unwrap();
        default.clone()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn post(
        &self,
        url: &str,
        body: Option<&str>,
        headers: &Headers,
    ) -> Result<Response, HttpError> {
        self.record_request(RequestKind::Post, url, headers, body.map(str::to_string));

        match self.get_response(url) {
            Some(MockResponse::Success(response)) => Ok(response),
            Some(MockResponse::Error(err)) => Err(err),
            Some(MockResponse::Stream(_)) | Some(MockResponse::StreamThenError { .. }) => Err(
                HttpError::Other("Stream response on non-stream request".to_string()),
            ),
            Some(MockResponse::StreamError(err)) => Err(err),
            None => Err(HttpError::Other(format!(
                "No mock response for URL: {}",
                url
            ))),
        }
    }

    async fn post_stream(
        &self,
        url: &str,
        body: Option<&str>,
        headers: &Headers,
    ) -> Result<ByteStream, HttpError> {
        self.record_request(
            RequestKind::PostStream,
            url,
            headers,
            body.map(str::to_string),
        );

        if let Some(rx) = self.manual_streams.lock().unwrap().remove(url) {
            return Ok(Box::pin(rx));
        }

        match self.get_response(url) {
            Some(MockResponse::Stream(chunks)) => {
                let stream = futures::stream::iter(chunks.into_iter().map(Ok));
                Ok(Box::pin(stream))
            }
            Some(MockResponse::StreamThenError { chunks, error }) => {
                let items: Vec<Result<Bytes, HttpError>> = chunks
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(error)))
                    .collect();
                Ok(Box::pin(futures::stream::iter(items)))
            }
            Some(MockResponse::StreamError(err)) => Err(err),
            Some(MockResponse::Success(_)) | Some(MockResponse::Error(_)) => Err(
                HttpError::Other("Non-stream response on stream request".to_string()),
            ),
            None => Err(HttpError::Other(format!(
                "No mock response for URL: {}",
                url
            ))),
        }
    }
}
