//! GlowDesk streaming core - incremental consumption of chunked AI
//! responses.
//!
//! The salon backend streams AI chat replies, quote drafts, and report
//! summaries as chunked text. This crate reconstructs a complete,
//! correctly-decoded message from those chunks while the caller's UI updates
//! live: bytes are decoded incrementally ([`decode`]), framed into content
//! fragments ([`frame`]), accumulated ([`accumulate`]), and published as
//! snapshots by the session layer ([`session`]).
//!
//! The REST API itself is an external collaborator reached through
//! [`traits::HttpClient`]; this crate only creates chat sessions and
//! consumes byte streams.

pub mod accumulate;
pub mod adapters;
pub mod client;
pub mod decode;
pub mod error;
pub mod frame;
pub mod models;
pub mod prelude;
pub mod session;
pub mod traits;
