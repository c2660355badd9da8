//! Concrete implementations of trait abstractions.
//!
//! Production code uses [`ReqwestHttpClient`]; tests use
//! [`mock::MockHttpClient`] to script responses and byte streams without
//! network access.

pub mod mock;
pub mod reqwest_http;

pub use mock::MockHttpClient;
pub use reqwest_http::ReqwestHttpClient;
