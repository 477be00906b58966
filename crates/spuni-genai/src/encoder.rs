//! Runs the encoder once per generation call.

use std::time::Instant;

use anyhow::anyhow;
use log::debug;

use crate::engine::{io, ForwardPassEngine, GraphTarget, InputMap, Tensor};
use crate::error::{GenerationError, GenerationResult};

/// Immutable encoder output consumed by every decode step.
///
/// Created once per generation call; the caller owns it and drops it when
/// the call ends.
pub struct EncoderContext {
    /// Hidden states, shape `[1, seq_len, hidden]` (f32 or f16).
    pub hidden_states: Tensor,
    /// Attention mask over the input, shape `[1, seq_len]`.
    pub attention_mask: Tensor,
    seq_len: usize,
}

impl EncoderContext {
    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_states.shape().last().copied().unwrap_or(0)
    }
}

/// Invokes the engine's encoder graph over the full input.
pub struct EncoderInvoker<'e, E: ForwardPassEngine> {
    engine: &'e E,
}

impl<'e, E: ForwardPassEngine> EncoderInvoker<'e, E> {
    pub fn new(engine: &'e E) -> Self {
        Self { engine }
    }

    /// Runs the encoder with an all-ones attention mask.
    pub fn execute_with_default_mask(
        &self,
        token_ids: &[u32],
    ) -> GenerationResult<EncoderContext> {
        let mask = vec![1i64; token_ids.len()];
        self.execute(token_ids, &mask)
    }

    /// Runs the encoder over `token_ids` and transfers ownership of the
    /// resulting context to the caller.
    pub fn execute(
        &self,
        token_ids: &[u32],
        attention_mask: &[i64],
    ) -> GenerationResult<EncoderContext> {
        if token_ids.is_empty() {
            return Err(GenerationError::engine(anyhow!(
                "encoder input must not be empty"
            )));
        }
        if attention_mask.len() != token_ids.len() {
            return Err(GenerationError::engine(anyhow!(
                "attention mask length {} does not match input length {}",
                attention_mask.len(),
                token_ids.len()
            )));
        }

        debug!("executing encoder with {} tokens", token_ids.len());
        let ids = Tensor::from_token_ids(token_ids);
        let mask = Tensor::from_mask(attention_mask);

        let mut inputs = InputMap::new();
        inputs.insert(io::INPUT_IDS, &ids);
        inputs.insert(io::ATTENTION_MASK, &mask);

        let t_start = Instant::now();
        let mut outputs = self
            .engine
            .run(GraphTarget::Encoder, &inputs)
            .map_err(GenerationError::engine)?;
        debug!("encoder completed in {:?}", t_start.elapsed());

        let hidden_states = extract_hidden_states(&mut outputs)
            .map_err(GenerationError::engine)?;

        Ok(EncoderContext {
            hidden_states,
            attention_mask: mask,
            seq_len: token_ids.len(),
        })
    }
}

/// Takes the hidden-state tensor out of the encoder's output map: the
/// `last_hidden_state` output by name, else the single floating rank-3
/// output.
fn extract_hidden_states(outputs: &mut crate::engine::TensorMap) -> anyhow::Result<Tensor> {
    if let Some(tensor) = outputs.remove(io::LAST_HIDDEN_STATE) {
        anyhow::ensure!(
            tensor.ndim() == 3,
            "encoder hidden states must be rank 3, got rank {}",
            tensor.ndim()
        );
        return Ok(tensor);
    }

    let candidates: Vec<String> = outputs
        .iter()
        .filter(|(_, t)| t.is_floating() && t.ndim() == 3)
        .map(|(name, _)| name.clone())
        .collect();
    match candidates.as_slice() {
        [name] => Ok(outputs
            .remove(name.as_str())
            .expect("candidate key exists in map")),
        [] => Err(anyhow!("encoder produced no hidden-state output")),
        _ => Err(anyhow!(
            "ambiguous encoder output: {} rank-3 candidates and no '{}'",
            candidates.len(),
            io::LAST_HIDDEN_STATE
        )),
    }
}
