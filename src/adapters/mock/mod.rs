//! Mock implementations for testing.
//!
//! [`MockHttpClient`] scripts responses and byte streams per URL, records
//! every request for verification, and can hand out a manually driven stream
//! so tests control exactly when chunks arrive.

pub mod http;

pub use http::{MockHttpClient, MockResponse, RecordedRequest, RequestKind};
