//! The auto-regressive decode loop.

mod generator;

pub use generator::DecodeOrchestrator;

use crate::engine::{EngineSpec, GraphTarget};

/// Special token ids driving the loop.
#[derive(Debug, Clone, Copy)]
pub struct SpecialTokens {
    /// Token that starts the decoder sequence (T5 uses the pad id).
    pub decoder_start: u32,
    /// End-of-sequence token; terminates generation and is excluded from
    /// the output.
    pub eos: u32,
}

/// How the deployment exposes its decoder, resolved once from engine
/// introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStrategy {
    /// One decoder graph, no cache flag.
    SingleGraph,
    /// One merged graph with a boolean `use_cache_branch` input, false only
    /// on step 0.
    MergedGraphWithFlag,
    /// Two graphs: step 0 always runs the first-step graph, every later
    /// step the with-past graph, regardless of the cache's actual state.
    DualGraph,
}

impl DecodeStrategy {
    pub fn resolve(spec: &EngineSpec) -> Self {
        if spec.has_dual_graph() {
            DecodeStrategy::DualGraph
        } else if spec.has_cache_flag() {
            DecodeStrategy::MergedGraphWithFlag
        } else {
            DecodeStrategy::SingleGraph
        }
    }

    pub fn target_for_step(&self, step: usize) -> GraphTarget {
        match self {
            DecodeStrategy::DualGraph if step > 0 => GraphTarget::DecoderWithPast,
            _ => GraphTarget::Decoder,
        }
    }
}
