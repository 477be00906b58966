//! The forward-pass engine boundary.
//!
//! The engine executes neural network graphs on named tensors; everything it
//! needs to know is exchanged through [`TensorMap`]s. Which inputs a graph
//! accepts is resolved once from [`EngineSpec`] introspection instead of
//! being re-derived with ad hoc flags inside the decode loop.

use std::collections::BTreeMap;

use half::f16;
use ndarray::{ArrayD, IxDyn};

use crate::cache::CacheTopology;

/// Conventional tensor names shared with the engine.
pub mod io {
    pub const INPUT_IDS: &str = "input_ids";
    pub const ATTENTION_MASK: &str = "attention_mask";
    pub const ENCODER_HIDDEN_STATES: &str = "encoder_hidden_states";
    pub const ENCODER_ATTENTION_MASK: &str = "encoder_attention_mask";
    pub const USE_CACHE_BRANCH: &str = "use_cache_branch";
    pub const POSITION_IDS: &str = "position_ids";
    pub const LOGITS: &str = "logits";
    pub const LAST_HIDDEN_STATE: &str = "last_hidden_state";
}

/// An owned tensor crossing the engine boundary.
///
/// `F16` carries half-precision payloads through untouched so FP16 engine
/// outputs can be fed back as inputs without a round trip through f32.
#[derive(Debug, Clone)]
pub enum Tensor {
    F32(ArrayD<f32>),
    F16(ArrayD<f16>),
    I64(ArrayD<i64>),
    Bool(ArrayD<bool>),
}

impl Tensor {
    pub fn shape(&self) -> &[usize] {
        match self {
            Tensor::F32(a) => a.shape(),
            Tensor::F16(a) => a.shape(),
            Tensor::I64(a) => a.shape(),
            Tensor::Bool(a) => a.shape(),
        }
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn dtype_name(&self) -> &'static str {
        match self {
            Tensor::F32(_) => "f32",
            Tensor::F16(_) => "f16",
            Tensor::I64(_) => "i64",
            Tensor::Bool(_) => "bool",
        }
    }

    pub fn is_floating(&self) -> bool {
        matches!(self, Tensor::F32(_) | Tensor::F16(_))
    }

    /// Token ids as the engine expects them: `i64`, shape `[1, len]`.
    pub fn from_token_ids(ids: &[u32]) -> Self {
        let data: Vec<i64> = ids.iter().map(|&id| i64::from(id)).collect();
        Tensor::I64(
            ArrayD::from_shape_vec(IxDyn(&[1, data.len()]), data)
                .expect("shape matches data length"),
        )
    }

    /// Attention mask, shape `[1, len]`.
    pub fn from_mask(mask: &[i64]) -> Self {
        Tensor::I64(
            ArrayD::from_shape_vec(IxDyn(&[1, mask.len()]), mask.to_vec())
                .expect("shape matches data length"),
        )
    }

    /// Single boolean flag, shape `[1]`.
    pub fn flag(value: bool) -> Self {
        Tensor::Bool(
            ArrayD::from_shape_vec(IxDyn(&[1]), vec![value]).expect("shape matches data length"),
        )
    }

    pub fn zeros_f32(shape: &[usize]) -> Self {
        Tensor::F32(ArrayD::zeros(IxDyn(shape)))
    }
}

/// Named engine outputs, ordered for deterministic iteration.
pub type TensorMap = BTreeMap<String, Tensor>;

/// Named engine inputs, borrowed from their owners for the duration of one
/// invocation.
pub type InputMap<'a> = BTreeMap<&'a str, &'a Tensor>;

/// The runnable graphs an engine deployment may provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphTarget {
    Encoder,
    /// The decoder graph, or the first-step graph of a dual deployment.
    Decoder,
    /// The with-cache graph of a dual deployment.
    DecoderWithPast,
}

/// Static facts about an engine deployment, resolved once at load time.
#[derive(Debug, Clone)]
pub struct EngineSpec {
    pub topology: CacheTopology,
    pub num_layers: usize,
    /// Key-value heads (not attention heads: grouped-query models differ).
    pub num_kv_heads: usize,
    pub head_dim: usize,
    /// Whether the decoder emits `present.*` cache outputs at all.
    pub cache_enabled: bool,
    /// Declared input names of the decoder (first-step) graph.
    pub decoder_inputs: Vec<String>,
    /// Declared input names of the with-past graph; `Some` iff the
    /// deployment ships two distinct decoder graphs.
    pub decoder_with_past_inputs: Option<Vec<String>>,
}

impl EngineSpec {
    /// Declared input names for a decoder-side target.
    pub fn inputs_for(&self, target: GraphTarget) -> &[String] {
        match target {
            GraphTarget::DecoderWithPast => self
                .decoder_with_past_inputs
                .as_deref()
                .unwrap_or(&self.decoder_inputs),
            _ => &self.decoder_inputs,
        }
    }

    /// Whether the given graph declares an input of this name.
    pub fn accepts(&self, target: GraphTarget, name: &str) -> bool {
        self.inputs_for(target).iter().any(|n| n == name)
    }

    pub fn has_dual_graph(&self) -> bool {
        self.decoder_with_past_inputs.is_some()
    }

    pub fn has_cache_flag(&self) -> bool {
        self.decoder_inputs
            .iter()
            .any(|n| n == io::USE_CACHE_BRANCH)
    }

    /// Cache tensors per layer for this topology.
    pub fn tensors_per_layer(&self) -> usize {
        match self.topology {
            CacheTopology::EncoderDecoder => 4,
            CacheTopology::DecoderOnly => 2,
        }
    }
}

/// An external component that executes one named graph on named tensors.
///
/// Invocations are blocking; the decode loop is inherently sequential. The
/// output map contains a `logits` tensor and, if the deployment is
/// cache-enabled, per-layer `present.*` tensors.
pub trait ForwardPassEngine {
    fn spec(&self) -> &EngineSpec;

    fn run(&self, target: GraphTarget, inputs: &InputMap<'_>) -> anyhow::Result<TensorMap>;
}
