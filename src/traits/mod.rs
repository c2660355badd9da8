//! Trait abstractions for dependency injection and testability.
//!
//! The streaming core never talks to the network directly; it goes through
//! [`HttpClient`], so tests can script byte streams and production code can
//! plug in the reqwest adapter.

pub mod http;

pub use http::{ByteStream, Headers, HttpClient, HttpError, Response};
