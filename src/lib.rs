//! evalai - streaming LLM response aggregation
//!
//! This crate provides:
//! - A single-pass aggregator turning provider stream events into a final
//!   text, metadata, and token usage (reported or estimated)
//! - SSE decoders for OpenAI-compatible chat completions and the Responses API
//! - Provider presets, YAML provider definitions, and a streaming HTTP client

pub mod aggregate;
pub mod config;
pub mod error;
pub mod estimate;
pub mod events;
pub mod provider;
pub mod telemetry;
pub mod usage;

pub use aggregate::{
    aggregate, aggregate_iter, spawn_aggregation, Accumulator, ChannelSink, Completion, Discard,
    FragmentSink, PromptText, Step,
};
pub use config::{RequestConfig, DEFAULT_SYSTEM_MESSAGE};
pub use error::{Error, ErrorKind, Result, TransportError};
pub use estimate::{
    CharRatioEstimator, Cl100kEstimator, EstimationPolicy, EstimatorKind, SharedEstimator,
};
pub use events::{Event, EventStream, Fragment, ResponseMetadata};
pub use provider::{ProviderClient, ProviderConfig, WireApi};
pub use telemetry::init_tracing;
pub use usage::{FinalUsage, UsageReport, UsageSource};
