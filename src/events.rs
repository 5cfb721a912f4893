//! Provider stream events
//!
//! Provider adapters translate their wire format into these events. This is
//! the ONLY shape the aggregator understands; it never inspects vendor
//! payloads directly.

use crate::error::TransportError;
use crate::usage::UsageReport;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// One event from a provider stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Streaming text delta
    ContentDelta { text: String },
    /// Streaming reasoning delta (extended thinking)
    ReasoningDelta { text: String },
    /// Provider-declared token usage
    UsageReport(UsageReport),
    /// Response identity, model and creation time
    Metadata(ResponseMetadata),
    /// The provider signalled the end of the response
    Completed,
    /// Anything else, including events that failed to decode
    Other,
}

impl Event {
    pub fn content(text: impl Into<String>) -> Self {
        Event::ContentDelta { text: text.into() }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Event::ReasoningDelta { text: text.into() }
    }

    pub fn usage(prompt_tokens: u64, completion_tokens: u64, total_tokens: u64) -> Self {
        Event::UsageReport(UsageReport::new(prompt_tokens, completion_tokens, total_tokens))
    }
}

/// Response metadata as reported by the provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub id: Option<String>,
    pub model: Option<String>,
    pub created: Option<DateTime<Utc>>,
}

impl ResponseMetadata {
    /// Overwrite every field that `other` carries
    pub fn merge(&mut self, other: ResponseMetadata) {
        if other.id.is_some() {
            self.id = other.id;
        }
        if other.model.is_some() {
            self.model = other.model;
        }
        if other.created.is_some() {
            self.created = other.created;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.model.is_none() && self.created.is_none()
    }
}

/// Stream of provider events
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Event, TransportError>> + Send>>;

/// Output delivered to a fragment consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Content(String),
    Reasoning(String),
}
