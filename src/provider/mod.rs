//! LLM Provider layer
//!
//! Thin adapters that turn a vendor's streaming wire format into [`Event`]s.
//! Supports any API speaking the OpenAI chat completions format, plus the
//! OpenAI Responses API.
//!
//! [`Event`]: crate::Event

mod chat;
mod client;
mod config;
mod loader;
mod responses;
mod sse;
mod stream;

pub use client::*;
pub use config::*;
pub use loader::*;
pub use sse::{SseDecoder, SseFrame};
pub use stream::decode_byte_stream;

use crate::events::Event;

/// Outcome of decoding one SSE frame
#[derive(Debug)]
pub(crate) enum Decoded {
    Events(Vec<Event>),
    /// The provider reported a failure inside the stream
    ProviderError(String),
}
