//! Decode orchestration for encoder-decoder generation engines.
//!
//! This crate drives the auto-regressive decode loop on top of an external
//! forward-pass engine: it builds per-step inputs, selects the graph to run,
//! manages the key-value cache across steps, applies logit adjustments and
//! sampling, and optionally streams tokens to a caller.
//!
//! The engine itself (graph loading, tensor math, device selection) lives
//! behind the [`engine::ForwardPassEngine`] trait; the tokenizer behind
//! [`tokenizer::Tokenizer`].

pub mod cache;
pub mod common;
pub mod decoder;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod stats;
pub mod streaming;
pub mod tokenizer;

// Re-export commonly used items
pub use cache::{CacheShapeInfo, CacheTopology, KvCacheStore};
pub use common::{DecodingStrategy, GenerationConfig, StreamingResult, TokenCallback};
pub use decoder::{DecodeOrchestrator, DecodeStrategy, SpecialTokens};
pub use encoder::{EncoderContext, EncoderInvoker};
pub use engine::{EngineSpec, ForwardPassEngine, GraphTarget, Tensor, TensorMap};
pub use error::{GenerationError, GenerationResult};
pub use pipeline::Seq2SeqGenerator;
pub use streaming::StreamingController;

// Prelude for easy imports
pub mod prelude {
    pub use crate::cache::{CacheTopology, KvCacheStore};
    pub use crate::common::{GenerationConfig, TokenCallback};
    pub use crate::decoder::{DecodeOrchestrator, SpecialTokens};
    pub use crate::engine::{EngineSpec, ForwardPassEngine, GraphTarget, Tensor};
    pub use crate::error::{GenerationError, GenerationResult};
    pub use crate::pipeline::Seq2SeqGenerator;
    pub use crate::tokenizer::Tokenizer;
}

#[cfg(test)]
pub mod tests;
