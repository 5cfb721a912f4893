//! Token usage accounting
//!
//! A [`UsageReport`] is either passed through verbatim from the provider or
//! computed locally by an estimator. [`FinalUsage`] keeps track of which, so
//! callers can label the two differently.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Token counts for one request/response pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UsageReport {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl UsageReport {
    /// Provider-declared usage, taken as-is.
    ///
    /// No correction is applied when `total_tokens` disagrees with the sum of
    /// the other two fields.
    pub fn new(prompt_tokens: u64, completion_tokens: u64, total_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }

    /// Usage whose total is derived from its parts
    pub fn from_counts(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }

    /// Whether `total == prompt + completion`
    pub fn is_consistent(&self) -> bool {
        self.prompt_tokens.checked_add(self.completion_tokens) == Some(self.total_tokens)
    }
}

/// Where a final usage figure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageSource {
    /// Declared by the provider in the stream
    Reported,
    /// Computed locally because the provider never reported usage
    Estimated,
}

impl UsageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageSource::Reported => "reported",
            UsageSource::Estimated => "estimated",
        }
    }
}

/// Usage attached to a finished stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalUsage {
    #[serde(flatten)]
    pub report: UsageReport,
    pub source: UsageSource,
}

impl FinalUsage {
    pub fn reported(report: UsageReport) -> Self {
        Self {
            report,
            source: UsageSource::Reported,
        }
    }

    pub fn estimated(report: UsageReport) -> Self {
        Self {
            report,
            source: UsageSource::Estimated,
        }
    }

    pub fn is_estimated(&self) -> bool {
        self.source == UsageSource::Estimated
    }
}

impl fmt::Display for FinalUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "input {} / output {} / total {} ({})",
            self.report.prompt_tokens,
            self.report.completion_tokens,
            self.report.total_tokens,
            self.source.as_str()
        )
    }
}
