//! Common test utilities for integration tests.
//!
//! Provides mock transport wiring and small helpers shared by the
//! integration suites.

use bytes::Bytes;
use glowdesk_stream::adapters::mock::{MockHttpClient, MockResponse};
use glowdesk_stream::client::SalonClient;
use glowdesk_stream::session::StreamSession;
use glowdesk_stream::traits::Response;

/// Base URL every mock-backed test addresses.
pub const BASE_URL: &str = "http://test";

/// URL of the message stream for the stubbed session token.
pub const MESSAGE_URL: &str = "http://test/chat/session/tok-1/message";

/// Stub `POST /chat/session` to issue the token `tok-1`.
pub fn stub_session_creation(http: &MockHttpClient) {
    http.set_response(
        "http://test/chat/session",
        MockResponse::Success(Response::new(
            201,
            Bytes::from(r#"{"session_token":"tok-1"}"#),
        )),
    );
}

/// Build a session over the given mock transport.
pub fn test_session(http: MockHttpClient) -> StreamSession<MockHttpClient> {
    StreamSession::new(SalonClient::with_base_url(http, BASE_URL))
}

/// Yield until `condition` holds; panics if it never does.
///
/// Cooperative scheduling makes this deterministic on the test runtime: the
/// spawned task under observation runs during each yield.
pub async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not met while waiting");
}
