//! Local token estimation
//!
//! Used only when a provider never reports usage in its stream. Each vendor
//! tokenizes differently, so the policy is chosen per provider.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tiktoken_rs::CoreBPE;

/// Counts tokens in a piece of text.
///
/// Implementations must be pure: the same text always yields the same count.
pub trait EstimationPolicy: Send + Sync {
    fn estimate(&self, text: &str) -> u64;
}

impl<F> EstimationPolicy for F
where
    F: Fn(&str) -> u64 + Send + Sync,
{
    fn estimate(&self, text: &str) -> u64 {
        self(text)
    }
}

/// Shared estimator handle
pub type SharedEstimator = Arc<dyn EstimationPolicy>;

/// BPE count with the `cl100k_base` encoding
#[derive(Clone)]
pub struct Cl100kEstimator {
    bpe: Arc<CoreBPE>,
}

impl Cl100kEstimator {
    pub fn new() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| Error::InvalidRequest(format!("Failed to load cl100k_base: {}", e)))?;
        Ok(Self { bpe: Arc::new(bpe) })
    }
}

impl EstimationPolicy for Cl100kEstimator {
    fn estimate(&self, text: &str) -> u64 {
        self.bpe.encode_ordinary(text).len() as u64
    }
}

/// Character-ratio heuristic: `ceil(chars / chars_per_token)`
#[derive(Debug, Clone, Copy)]
pub struct CharRatioEstimator {
    chars_per_token: f64,
}

impl CharRatioEstimator {
    pub fn new(chars_per_token: f64) -> Self {
        // A non-positive ratio would divide into infinity
        let chars_per_token = if chars_per_token > 0.0 { chars_per_token } else { 4.0 };
        Self { chars_per_token }
    }
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self::new(4.0)
    }
}

impl EstimationPolicy for CharRatioEstimator {
    fn estimate(&self, text: &str) -> u64 {
        if text.is_empty() {
            return 0;
        }
        let chars = text.chars().count() as f64;
        (chars / self.chars_per_token).ceil() as u64
    }
}

/// Estimator selection, as stored in provider configs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EstimatorKind {
    #[default]
    Cl100k,
    CharRatio {
        chars_per_token: f64,
    },
}

impl EstimatorKind {
    pub fn build(&self) -> Result<SharedEstimator> {
        match self {
            EstimatorKind::Cl100k => Ok(Arc::new(Cl100kEstimator::new()?)),
            EstimatorKind::CharRatio { chars_per_token } => {
                Ok(Arc::new(CharRatioEstimator::new(*chars_per_token)))
            }
        }
    }
}
