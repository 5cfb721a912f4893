//! Per-request configuration
//!
//! A [`RequestConfig`] is built once and passed by reference into each
//! streaming call. Nothing here is process-wide.

use crate::aggregate::PromptText;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SYSTEM_MESSAGE: &str = "You are a helpful assistant.";

/// Everything needed to shape one streaming request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Model override; the provider's default model is used when unset
    pub model: Option<String>,

    /// System instruction
    pub system: String,

    /// User prompt
    pub prompt: String,

    /// Maximum tokens for the response, sent as a structured parameter
    pub max_tokens: Option<u32>,

    /// Temperature for sampling
    pub temperature: Option<f32>,

    /// Nucleus sampling threshold
    pub top_p: Option<f32>,

    /// Reasoning effort for the Responses API (minimal, low, medium, high)
    pub reasoning_effort: Option<String>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            model: None,
            system: DEFAULT_SYSTEM_MESSAGE.to_string(),
            prompt: String::new(),
            max_tokens: None,
            temperature: None,
            top_p: None,
            reasoning_effort: None,
        }
    }
}

impl RequestConfig {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_reasoning_effort(mut self, effort: impl Into<String>) -> Self {
        self.reasoning_effort = Some(effort.into());
        self
    }

    /// Resolve the model against a provider default
    pub fn model_or<'a>(&'a self, default_model: &'a str) -> &'a str {
        self.model.as_deref().unwrap_or(default_model)
    }

    /// The text that local usage estimation counts as input
    pub fn prompt_text(&self) -> PromptText {
        PromptText::new(self.system.clone(), self.prompt.clone())
    }
}
