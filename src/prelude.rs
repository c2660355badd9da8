//! Prelude module for convenient imports.
//!
//! Re-exports the types most callers need to stream an exchange.
//!
//! # Usage
//!
//! ```ignore
//! use glowdesk_stream::prelude::*;
//! ```

pub use crate::client::{lead_quote_path, report_summary_path, SalonClient, DEFAULT_BASE_URL};
pub use crate::error::StreamError;
pub use crate::frame::Framing;
pub use crate::models::{
    ChatMessage, ConversationState, Exchange, ExchangeStatus, MessageRole, SessionToken,
};
pub use crate::session::{
    stream_generation, stream_lead_quote, stream_report_summary, CancelToken, StreamConfig,
    StreamSession,
};
pub use crate::traits::HttpClient;
