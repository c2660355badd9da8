//! Exchange orchestration: drives a byte stream through decoding, framing,
//! and accumulation, publishing a snapshot to the caller after every
//! fragment.
//!
//! Two entry points share the same engine:
//! - [`StreamSession`] for session-bound chat, which owns the conversation
//!   and enforces the one-streaming-exchange-per-session rule;
//! - [`stream_generation`] for the single-shot generation endpoints, which
//!   have no session token and no conversation.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::accumulate::ContentAccumulator;
use crate::client::{lead_quote_path, report_summary_path, SalonClient};
use crate::decode::Utf8Decoder;
use crate::error::StreamError;
use crate::frame::{FrameParser, Framing};
use crate::models::{ChatMessage, ConversationState, Exchange, SessionToken};
use crate::traits::{ByteStream, HttpClient};

/// Tuning for stream consumption.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamConfig {
    /// Maximum wait for stream establishment and for each chunk read.
    ///
    /// `None` (the default) waits indefinitely; the backend contract
    /// specifies no timeout, so none is enforced unless the caller opts in.
    pub chunk_timeout: Option<Duration>,
}

/// Cancellation handle for a single-shot generation exchange.
///
/// Cancelling stops snapshot publication immediately; the exchange resolves
/// `Failed` with [`StreamError::Cancelled`] and keeps the content received
/// so far.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Pull chunks off the stream and publish a snapshot per content fragment.
///
/// Returns the accumulated content plus the error that ended the exchange,
/// if any. `live` is re-checked before every chunk read and every publish;
/// once it turns false the stream is abandoned and nothing further reaches
/// the sink.
async fn pump_stream<L, F>(
    mut stream: ByteStream,
    framing: Framing,
    chunk_timeout: Option<Duration>,
    live: L,
    sink: &mut F,
) -> (String, Option<StreamError>)
where
    L: Fn() -> bool,
    F: FnMut(&str),
{
    let mut decoder = Utf8Decoder::new();
    let mut parser = FrameParser::new(framing);
    let mut accumulator = ContentAccumulator::new();
    let mut saw_bytes = false;

    loop {
        if !live() {
            debug!("exchange invalidated, abandoning stream");
            return (accumulator.into_content(), Some(StreamError::Cancelled));
        }

        let next = match chunk_timeout {
            Some(limit) => match timeout(limit, stream.next()).await {
                Ok(item) => item,
                Err(_) => {
                    return (
                        accumulator.into_content(),
                        Some(StreamError::Timeout { limit }),
                    )
                }
            },
            None => stream.next().await,
        };

        match next {
            Some(Ok(chunk)) => {
                if !chunk.is_empty() {
                    saw_bytes = true;
                }
                let text = match decoder.feed(&chunk) {
                    Ok(text) => text,
                    Err(e) => return (accumulator.into_content(), Some(e.into())),
                };
                for fragment in parser.feed(&text) {
                    let snapshot = accumulator.append(&fragment);
                    if live() {
                        sink(snapshot);
                    }
                }
            }
            Some(Err(e)) => return (accumulator.into_content(), Some(e.into())),
            None => break,
        }
    }

    if !live() {
        return (accumulator.into_content(), Some(StreamError::Cancelled));
    }

    // End of stream: flush the decoder, then any buffered partial line.
    let tail = match decoder.finish() {
        Ok(tail) => tail,
        Err(e) => return (accumulator.into_content(), Some(e.into())),
    };
    for fragment in parser.feed(&tail) {
        let snapshot = accumulator.append(&fragment);
        if live() {
            sink(snapshot);
        }
    }
    if let Some(fragment) = parser.finish() {
        let snapshot = accumulator.append(&fragment);
        if live() {
            sink(snapshot);
        }
    }

    if !saw_bytes {
        // The transport resolved without ever producing a body. Surfaced as
        // an explicit failure so it stays distinguishable from a reply that
        // happened to be empty.
        return (accumulator.into_content(), Some(StreamError::EmptyBody));
    }

    (accumulator.into_content(), None)
}

/// Open the stream and run it to a terminal state on `exchange`.
async fn run_exchange<L, F>(
    exchange: &mut Exchange,
    open: impl Future<Output = Result<ByteStream, StreamError>>,
    framing: Framing,
    chunk_timeout: Option<Duration>,
    live: L,
    sink: &mut F,
) where
    L: Fn() -> bool,
    F: FnMut(&str),
{
    let opened = match chunk_timeout {
        Some(limit) => match timeout(limit, open).await {
            Ok(result) => result,
            Err(_) => {
                exchange.fail(String::new(), StreamError::Timeout { limit });
                return;
            }
        },
        None => open.await,
    };

    let stream = match opened {
        Ok(stream) => stream,
        Err(e) => {
            warn!(exchange_id = %exchange.id, error = %e, "failed to open stream");
            exchange.fail(String::new(), e);
            return;
        }
    };

    exchange.mark_streaming();
    let (content, error) = pump_stream(stream, framing, chunk_timeout, live, sink).await;
    match error {
        None => {
            debug!(exchange_id = %exchange.id, content_len = content.len(), "exchange complete");
            exchange.complete(content);
        }
        Some(e) => {
            warn!(exchange_id = %exchange.id, error = %e, "exchange failed");
            exchange.fail(content, e);
        }
    }
}

/// A chat session over the streaming backend.
///
/// All methods take `&self`; the session is designed to sit behind an `Arc`
/// in UI code. Conversation history lives in process memory only and is
/// dropped with the session.
///
/// Concurrency rules:
/// - at most one exchange streams at a time; a second [`send`](Self::send)
///   is rejected with [`StreamError::ConcurrentSend`];
/// - [`cancel`](Self::cancel) and [`open_session`](Self::open_session)
///   invalidate the in-flight exchange: it stops publishing snapshots even
///   if bytes keep arriving, and it never touches the conversation again.
pub struct StreamSession<C: HttpClient> {
    client: SalonClient<C>,
    config: StreamConfig,
    token: Mutex<Option<SessionToken>>,
    conversation: Mutex<ConversationState>,
    /// Current epoch; bumped by every send, cancel, and new session. An
    /// exchange is live while its captured epoch equals this value.
    epoch: AtomicU64,
    /// Epoch of the exchange currently streaming, if any.
    in_flight: Mutex<Option<u64>>,
}

impl<C: HttpClient> StreamSession<C> {
    /// Create a session with default configuration.
    pub fn new(client: SalonClient<C>) -> Self {
        Self::with_config(client, StreamConfig::default())
    }

    /// Create a session with explicit configuration.
    pub fn with_config(client: SalonClient<C>, config: StreamConfig) -> Self {
        Self {
            client,
            config,
            token: Mutex::new(None),
            conversation: Mutex::new(ConversationState::new()),
            epoch: AtomicU64::new(0),
            in_flight: Mutex::new(None),
        }
    }

    /// The underlying API client.
    pub fn client(&self) -> &SalonClient<C> {
        &self.client
    }

    /// Create a fresh backend session.
    ///
    /// Any in-flight exchange is invalidated and the conversation is
    /// cleared; the previous token is discarded.
    pub async fn open_session(&self) -> Result<SessionToken, StreamError> {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let token = self.client.create_chat_session().await?;
        *self.token.lock().unwrap() = Some(token.clone());
        self.conversation.lock().unwrap().clear();
        debug!("chat session opened");
        Ok(token)
    }

    /// The current session token, if a session is open.
    pub fn session_token(&self) -> Option<SessionToken> {
        self.token.lock().unwrap().clone()
    }

    /// Whether a session is open.
    pub fn has_session(&self) -> bool {
        self.token.lock().unwrap().is_some()
    }

    /// Whether an exchange is currently streaming.
    pub fn is_streaming(&self) -> bool {
        let current = self.epoch.load(Ordering::SeqCst);
        self.in_flight.lock().unwrap().map_or(false, |e| e == current)
    }

    /// Snapshot of the conversation so far.
    pub fn history(&self) -> Vec<ChatMessage> {
        self.conversation.lock().unwrap().messages().to_vec()
    }

    /// Invalidate the in-flight exchange, if any.
    ///
    /// The stale exchange stops publishing and resolves `Failed` with
    /// [`StreamError::Cancelled`]; a new send may start immediately.
    pub fn cancel(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        debug!("in-flight exchange invalidated");
    }

    /// Send a message and stream the reply.
    ///
    /// `sink` receives the full accumulated content after every fragment.
    /// Returns the terminal [`Exchange`]: `Complete` with the final content,
    /// or `Failed` with its error and whatever content arrived before the
    /// failure. Only pre-flight rejections ([`StreamError::NoSession`],
    /// [`StreamError::ConcurrentSend`]) return `Err`; they leave no trace.
    ///
    /// On completion the user message and the reply are appended to the
    /// conversation; a failed or invalidated exchange never appends a reply.
    pub async fn send<F>(&self, text: &str, mut sink: F) -> Result<Exchange, StreamError>
    where
        F: FnMut(&str),
    {
        let token = self
            .token
            .lock()
            .unwrap()
            .clone()
            .ok_or(StreamError::NoSession)?;

        let my_epoch = {
            let mut in_flight = self.in_flight.lock().unwrap();
            let current = self.epoch.load(Ordering::SeqCst);
            if in_flight.map_or(false, |e| e == current) {
                return Err(StreamError::ConcurrentSend);
            }
            let next = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            *in_flight = Some(next);
            next
        };

        // The outgoing message enters the transcript immediately; the reply
        // only once it is complete.
        self.conversation
            .lock()
            .unwrap()
            .push(ChatMessage::user(text));

        let mut exchange = Exchange::new(Some(text.to_string()));
        debug!(exchange_id = %exchange.id, "sending message");

        let live = || self.epoch.load(Ordering::SeqCst) == my_epoch;
        run_exchange(
            &mut exchange,
            self.client.open_message_stream(&token, text),
            Framing::Lines,
            self.config.chunk_timeout,
            &live,
            &mut sink,
        )
        .await;

        if exchange.is_complete() && live() {
            self.conversation
                .lock()
                .unwrap()
                .push(ChatMessage::assistant(exchange.content.clone()));
        }

        let mut in_flight = self.in_flight.lock().unwrap();
        if *in_flight == Some(my_epoch) {
            *in_flight = None;
        }
        drop(in_flight);

        Ok(exchange)
    }
}

/// Run a single-shot generation exchange (no session token, no
/// conversation).
///
/// `path` is relative to the client's base URL; each call site is a thin
/// configuration of endpoint and [`Framing`] over the shared engine.
pub async fn stream_generation<C, F>(
    client: &SalonClient<C>,
    path: &str,
    framing: Framing,
    config: &StreamConfig,
    cancel: &CancelToken,
    mut sink: F,
) -> Exchange
where
    C: HttpClient,
    F: FnMut(&str),
{
    let mut exchange = Exchange::new(None);
    debug!(exchange_id = %exchange.id, path, "starting generation");

    let live = || !cancel.is_cancelled();
    run_exchange(
        &mut exchange,
        client.open_generation_stream(path),
        framing,
        config.chunk_timeout,
        &live,
        &mut sink,
    )
    .await;

    exchange
}

/// Stream an AI-generated quote for a lead.
pub async fn stream_lead_quote<C, F>(
    client: &SalonClient<C>,
    lead_id: i64,
    config: &StreamConfig,
    cancel: &CancelToken,
    sink: F,
) -> Exchange
where
    C: HttpClient,
    F: FnMut(&str),
{
    stream_generation(
        client,
        &lead_quote_path(lead_id),
        Framing::Raw,
        config,
        cancel,
        sink,
    )
    .await
}

/// Stream the AI summary for a monthly report.
pub async fn stream_report_summary<C, F>(
    client: &SalonClient<C>,
    month: &str,
    config: &StreamConfig,
    cancel: &CancelToken,
    sink: F,
) -> Exchange
where
    C: HttpClient,
    F: FnMut(&str),
{
    stream_generation(
        client,
        &report_summary_path(month),
        Framing::Raw,
        config,
        cancel,
        sink,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{MockHttpClient, MockResponse};
    use crate::models::MessageRole;
    use crate::traits::{HttpError, Response};
    use bytes::Bytes;

    const BASE: &str = "http://test";

    fn session_with(http: MockHttpClient) -> StreamSession<MockHttpClient> {
        StreamSession::new(SalonClient::with_base_url(http, BASE))
    }

    fn stub_session_creation(http: &MockHttpClient) {
        http.set_response(
            "http://test/chat/session",
            MockResponse::Success(Response::new(
                201,
                Bytes::from(r#"{"session_token":"tok-1"}"#),
            )),
        );
    }

    #[tokio::test]
    async fn test_send_without_session_is_rejected() {
        let session = session_with(MockHttpClient::new());
        let err = session.send("hi", |_| {}).await.unwrap_err();
        assert!(matches!(err, StreamError::NoSession));
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn test_raw_generation_scenario() {
        // Chunks "Hel", "lo, wor", "ld!" must produce exactly three ordered
        // snapshots and the final content.
        let http = MockHttpClient::new();
        http.set_response(
            "http://test/leads/7/generate-quote",
            MockResponse::Stream(vec![
                Bytes::from("Hel"),
                Bytes::from("lo, wor"),
                Bytes::from("ld!"),
            ]),
        );
        let client = SalonClient::with_base_url(http, BASE);

        let mut snapshots = Vec::new();
        let exchange = stream_lead_quote(
            &client,
            7,
            &StreamConfig::default(),
            &CancelToken::new(),
            |s| snapshots.push(s.to_string()),
        )
        .await;

        assert!(exchange.is_complete());
        assert_eq!(exchange.content, "Hello, world!");
        assert_eq!(snapshots, vec!["Hel", "Hello, wor", "Hello, world!"]);
        assert!(exchange.prompt.is_none());
    }

    #[tokio::test]
    async fn test_line_framed_chat_scenario() {
        let http = MockHttpClient::new();
        stub_session_creation(&http);
        http.set_response(
            "http://test/chat/session/tok-1/message",
            MockResponse::Stream(vec![
                Bytes::from("data: Hel\n"),
                Bytes::from("lo\n"),
                Bytes::from("data: World\n"),
            ]),
        );

        let session = session_with(http);
        session.open_session().await.unwrap();

        let mut snapshots = Vec::new();
        let exchange = session
            .send("question", |s| snapshots.push(s.to_string()))
            .await
            .unwrap();

        assert!(exchange.is_complete());
        assert_eq!(exchange.content, "HelloWorld");
        assert_eq!(snapshots, vec!["Hel", "Hello", "HelloWorld"]);

        let history = session.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, MessageRole::User);
        assert_eq!(history[0].content, "question");
        assert_eq!(history[1].role, MessageRole::Assistant);
        assert_eq!(history[1].content, "HelloWorld");
    }

    #[tokio::test]
    async fn test_multibyte_character_split_across_chunks() {
        // "€" (E2 82 AC) split 2+1 across chunk boundaries must decode to
        // the single correct character.
        let euro = "€".as_bytes();
        let http = MockHttpClient::new();
        http.set_response(
            "http://test/reports/2026-07/ai-summary",
            MockResponse::Stream(vec![
                Bytes::from("Total: "),
                Bytes::copy_from_slice(&euro[..2]),
                Bytes::copy_from_slice(&euro[2..]),
                Bytes::from("120"),
            ]),
        );
        let client = SalonClient::with_base_url(http, BASE);

        let mut snapshots = Vec::new();
        let exchange = stream_report_summary(
            &client,
            "2026-07",
            &StreamConfig::default(),
            &CancelToken::new(),
            |s| snapshots.push(s.to_string()),
        )
        .await;

        assert!(exchange.is_complete());
        assert_eq!(exchange.content, "Total: €120");
        // The partial-character chunk publishes nothing on its own.
        assert_eq!(snapshots, vec!["Total: ", "Total: €", "Total: €120"]);
    }

    #[tokio::test]
    async fn test_empty_body_is_an_explicit_failure() {
        let http = MockHttpClient::new();
        stub_session_creation(&http);
        http.set_response(
            "http://test/chat/session/tok-1/message",
            MockResponse::Stream(vec![]),
        );

        let session = session_with(http);
        session.open_session().await.unwrap();

        let mut snapshots = Vec::new();
        let exchange = session
            .send("hi", |s| snapshots.push(s.to_string()))
            .await
            .unwrap();

        assert!(exchange.is_failed());
        assert!(matches!(exchange.error, Some(StreamError::EmptyBody)));
        assert!(snapshots.is_empty());
        // Only the user message made it into the transcript.
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_frames_complete_with_empty_content() {
        // Bytes arrived but produced no content: a legitimate empty reply,
        // distinct from the absent-body failure.
        let http = MockHttpClient::new();
        stub_session_creation(&http);
        http.set_response(
            "http://test/chat/session/tok-1/message",
            MockResponse::Stream(vec![Bytes::from("\n\n")]),
        );

        let session = session_with(http);
        session.open_session().await.unwrap();

        let exchange = session.send("hi", |_| {}).await.unwrap();
        assert!(exchange.is_complete());
        assert_eq!(exchange.content, "");
    }

    #[tokio::test]
    async fn test_transport_error_mid_stream_retains_partial_content() {
        let http = MockHttpClient::new();
        stub_session_creation(&http);
        http.set_response(
            "http://test/chat/session/tok-1/message",
            MockResponse::StreamThenError {
                chunks: vec![Bytes::from("data: partial\n")],
                error: HttpError::Io("connection reset".to_string()),
            },
        );

        let session = session_with(http);
        session.open_session().await.unwrap();

        let mut snapshots = Vec::new();
        let exchange = session
            .send("hi", |s| snapshots.push(s.to_string()))
            .await
            .unwrap();

        assert!(exchange.is_failed());
        assert_eq!(exchange.content, "partial");
        assert_eq!(snapshots, vec!["partial"]);
        assert!(matches!(exchange.error, Some(StreamError::Transport { .. })));
        // No assistant entry for a failed exchange.
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_utf8_fails_the_exchange() {
        let http = MockHttpClient::new();
        http.set_response(
            "http://test/leads/1/generate-quote",
            MockResponse::Stream(vec![Bytes::from("ok"), Bytes::from(vec![0xFF, 0xFE])]),
        );
        let client = SalonClient::with_base_url(http, BASE);

        let exchange = stream_lead_quote(
            &client,
            1,
            &StreamConfig::default(),
            &CancelToken::new(),
            |_| {},
        )
        .await;

        assert!(exchange.is_failed());
        assert!(matches!(exchange.error, Some(StreamError::Decode(_))));
        assert_eq!(exchange.content, "ok");
    }

    #[tokio::test]
    async fn test_truncated_utf8_at_end_of_stream_fails() {
        // First two bytes of "€", then the stream ends.
        let euro = "€".as_bytes();
        let http = MockHttpClient::new();
        http.set_response(
            "http://test/leads/1/generate-quote",
            MockResponse::Stream(vec![Bytes::copy_from_slice(&euro[..2])]),
        );
        let client = SalonClient::with_base_url(http, BASE);

        let exchange = stream_lead_quote(
            &client,
            1,
            &StreamConfig::default(),
            &CancelToken::new(),
            |_| {},
        )
        .await;

        assert!(exchange.is_failed());
        assert!(matches!(exchange.error, Some(StreamError::Decode(_))));
    }

    #[tokio::test]
    async fn test_unterminated_final_line_is_flushed() {
        let http = MockHttpClient::new();
        stub_session_creation(&http);
        http.set_response(
            "http://test/chat/session/tok-1/message",
            MockResponse::Stream(vec![Bytes::from("data: no newline")]),
        );

        let session = session_with(http);
        session.open_session().await.unwrap();

        let exchange = session.send("hi", |_| {}).await.unwrap();
        assert!(exchange.is_complete());
        assert_eq!(exchange.content, "no newline");
    }

    #[tokio::test]
    async fn test_stream_open_failure_fails_the_exchange() {
        let http = MockHttpClient::new();
        stub_session_creation(&http);
        http.set_response(
            "http://test/chat/session/tok-1/message",
            MockResponse::StreamError(HttpError::ServerError {
                status: 404,
                message: "Chat session not found".to_string(),
            }),
        );

        let session = session_with(http);
        session.open_session().await.unwrap();

        let exchange = session.send("hi", |_| {}).await.unwrap();
        assert!(exchange.is_failed());
        assert!(matches!(
            exchange.error,
            Some(StreamError::Server { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_generation_cancel_token() {
        let http = MockHttpClient::new();
        http.set_response(
            "http://test/leads/1/generate-quote",
            MockResponse::Stream(vec![Bytes::from("never seen")]),
        );
        let client = SalonClient::with_base_url(http, BASE);

        let cancel = CancelToken::new();
        cancel.cancel();

        let mut snapshots = Vec::new();
        let exchange = stream_lead_quote(&client, 1, &StreamConfig::default(), &cancel, |s| {
            snapshots.push(s.to_string())
        })
        .await;

        assert!(exchange.is_failed());
        assert!(matches!(exchange.error, Some(StreamError::Cancelled)));
        assert!(snapshots.is_empty());
    }

    #[tokio::test]
    async fn test_chunk_timeout_fails_the_exchange() {
        let http = MockHttpClient::new();
        stub_session_creation(&http);
        // A manual stream that never produces a chunk.
        let _tx = http.set_manual_stream("http://test/chat/session/tok-1/message");

        let session = StreamSession::with_config(
            SalonClient::with_base_url(http, BASE),
            StreamConfig {
                chunk_timeout: Some(Duration::from_millis(20)),
            },
        );
        session.open_session().await.unwrap();

        let exchange = session.send("hi", |_| {}).await.unwrap();
        assert!(exchange.is_failed());
        assert!(matches!(exchange.error, Some(StreamError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_open_session_resets_conversation() {
        let http = MockHttpClient::new();
        stub_session_creation(&http);
        http.set_response(
            "http://test/chat/session/tok-1/message",
            MockResponse::Stream(vec![Bytes::from("data: reply\n")]),
        );

        let session = session_with(http);
        session.open_session().await.unwrap();
        session.send("hi", |_| {}).await.unwrap();
        assert_eq!(session.history().len(), 2);

        session.open_session().await.unwrap();
        assert!(session.history().is_empty());
        assert!(session.has_session());
    }

    #[tokio::test]
    async fn test_fresh_send_after_terminal_exchange() {
        let http = MockHttpClient::new();
        stub_session_creation(&http);
        http.set_response(
            "http://test/chat/session/tok-1/message",
            MockResponse::Stream(vec![Bytes::from("data: one\n")]),
        );

        let session = session_with(http);
        session.open_session().await.unwrap();

        let first = session.send("a", |_| {}).await.unwrap();
        let second = session.send("b", |_| {}).await.unwrap();
        assert!(first.is_complete());
        assert!(second.is_complete());
        assert_ne!(first.id, second.id);
        assert_eq!(session.history().len(), 4);
        assert!(!session.is_streaming());
    }
}
