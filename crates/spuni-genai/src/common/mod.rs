pub mod sampling;
pub mod stream;

pub use sampling::*;
pub use stream::*;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{GenerationError, GenerationResult};

/// The decoding algorithm resolved from a [`GenerationConfig`].
#[derive(Clone, Debug, PartialEq)]
pub enum DecodingStrategy {
    /// Select the most likely token (argmax).
    Greedy,
    /// Sample from the k highest-probability tokens.
    TopK(usize),
    /// Nucleus sampling: sample from the smallest set whose cumulative
    /// probability reaches p.
    TopP(f32),
}

/// The main configuration struct for text generation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Maximum tokens to generate.
    pub max_output_tokens: usize,
    /// Minimum tokens before EOS may be accepted (0 = disabled).
    pub min_output_tokens: usize,
    /// Sampling temperature. 1.0 leaves logits untouched; 0.0 means greedy.
    pub temperature: f32,
    pub top_k: Option<usize>,
    pub top_p: Option<f32>,
    /// Penalty applied to tokens already present in the history
    /// (1.0 = disabled).
    pub repetition_penalty: Option<f32>,
    /// Token sequences that must never be completed.
    pub banned_sequences: Vec<Vec<u32>>,
    /// Force greedy decoding regardless of sampling parameters.
    pub greedy: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: 512,
            min_output_tokens: 0,
            temperature: 0.7,
            top_k: Some(50),
            top_p: Some(0.9),
            repetition_penalty: None,
            banned_sequences: Vec::new(),
            greedy: false,
        }
    }
}

impl GenerationConfig {
    /// A greedy configuration with the given output budget.
    pub fn greedy(max_output_tokens: usize) -> Self {
        Self {
            max_output_tokens,
            greedy: true,
            temperature: 0.0,
            top_k: None,
            top_p: None,
            ..Self::default()
        }
    }

    /// Validates parameters before the loop starts.
    pub fn validate(&self) -> GenerationResult<()> {
        if self.max_output_tokens == 0 {
            return Err(GenerationError::InvalidConfig(
                "max_output_tokens must be at least 1".into(),
            ));
        }
        if self.min_output_tokens > self.max_output_tokens {
            return Err(GenerationError::InvalidConfig(format!(
                "min_output_tokens ({}) exceeds max_output_tokens ({})",
                self.min_output_tokens, self.max_output_tokens
            )));
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(GenerationError::InvalidConfig(format!(
                "temperature must be finite and >= 0.0, got {}",
                self.temperature
            )));
        }
        if self.top_k == Some(0) {
            return Err(GenerationError::InvalidConfig(
                "top_k must be at least 1 when set".into(),
            ));
        }
        if let Some(p) = self.top_p {
            if !(0.0..=1.0).contains(&p) || p == 0.0 {
                return Err(GenerationError::InvalidConfig(format!(
                    "top_p must be in (0.0, 1.0], got {}",
                    p
                )));
            }
        }
        if let Some(penalty) = self.repetition_penalty {
            if !penalty.is_finite() || penalty <= 0.0 {
                return Err(GenerationError::InvalidConfig(format!(
                    "repetition_penalty must be finite and > 0.0, got {}",
                    penalty
                )));
            }
        }
        Ok(())
    }

    /// Resolves the decoding strategy: greedy wins, then top-k, then top-p;
    /// with nothing configured greedy is the fallback.
    pub fn strategy(&self) -> DecodingStrategy {
        if self.greedy || self.temperature == 0.0 {
            return DecodingStrategy::Greedy;
        }
        if let Some(k) = self.top_k {
            return DecodingStrategy::TopK(k);
        }
        if let Some(p) = self.top_p {
            return DecodingStrategy::TopP(p);
        }
        warn!("no sampling strategy configured, falling back to greedy");
        DecodingStrategy::Greedy
    }

    /// Whether temperature scaling is active.
    pub fn temperature_enabled(&self) -> bool {
        self.temperature > 0.0 && self.temperature != 1.0
    }
}
