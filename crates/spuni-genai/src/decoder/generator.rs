//! Orchestrates the step-by-step decode loop.

use std::time::Instant;

use anyhow::anyhow;
use log::{debug, info};
use ndarray::{Array1, Axis, Ix1};

use crate::cache::{CacheShapeInfo, KvCacheStore, PAST_PREFIX};
use crate::common::{
    apply_banned_sequences, apply_repetition_penalty, apply_temperature, sample_token,
    GenerationConfig,
};
use crate::decoder::{DecodeStrategy, SpecialTokens};
use crate::encoder::EncoderContext;
use crate::engine::{io, ForwardPassEngine, InputMap, Tensor, TensorMap};
use crate::error::{GenerationError, GenerationResult};

/// Drives the decode loop: builds per-step inputs, selects the graph to
/// invoke, applies logit adjustments and sampling, folds engine outputs into
/// the cache store and decides termination.
///
/// A single orchestrator is not safe for concurrent `generate` calls on the
/// same engine session; independent sessions may run concurrently. Every
/// tensor created during a call is owned by the call and dropped on every
/// exit path, success or error.
pub struct DecodeOrchestrator<'e, E: ForwardPassEngine> {
    engine: &'e E,
    strategy: DecodeStrategy,
    special: SpecialTokens,
}

impl<'e, E: ForwardPassEngine> DecodeOrchestrator<'e, E> {
    pub fn new(engine: &'e E, special: SpecialTokens) -> Self {
        let strategy = DecodeStrategy::resolve(engine.spec());
        debug!(
            "decode orchestrator ready: strategy={:?}, cache_enabled={}",
            strategy,
            engine.spec().cache_enabled
        );
        Self {
            engine,
            strategy,
            special,
        }
    }

    pub fn strategy(&self) -> DecodeStrategy {
        self.strategy
    }

    /// Generates up to `config.max_output_tokens` tokens. The EOS token
    /// terminates generation and never appears in the output.
    pub fn generate(
        &self,
        ctx: &EncoderContext,
        config: &GenerationConfig,
    ) -> GenerationResult<Vec<u32>> {
        self.run_with(ctx, config, |_, _| Ok(()))
    }

    /// The shared loop. `on_token` sees the generated sequence after each
    /// accepted token, plus whether the output budget is now exhausted; an
    /// error from it aborts generation.
    pub(crate) fn run_with<F>(
        &self,
        ctx: &EncoderContext,
        config: &GenerationConfig,
        mut on_token: F,
    ) -> GenerationResult<Vec<u32>>
    where
        F: FnMut(&[u32], bool) -> GenerationResult<()>,
    {
        config.validate()?;

        let spec = self.engine.spec();
        let sampling = config.strategy();
        let mut rng = rand::thread_rng();

        let mut cache = KvCacheStore::new(spec.topology);
        // Some graphs demand cache-shaped inputs even on the first call.
        let first_target = self.strategy.target_for_step(0);
        if spec.cache_enabled
            && spec
                .inputs_for(first_target)
                .iter()
                .any(|name| name.starts_with(PAST_PREFIX))
        {
            cache.initialize_placeholder(&CacheShapeInfo {
                num_layers: spec.num_layers,
                num_kv_heads: spec.num_kv_heads,
                head_dim: spec.head_dim,
            });
        }

        let mut generated: Vec<u32> = Vec::new();
        let mut current = self.special.decoder_start;
        let t_start = Instant::now();

        for step in 0..config.max_output_tokens {
            let target = self.strategy.target_for_step(step);
            let outputs = self.invoke_step(target, step, current, &generated, ctx, &cache)?;

            let mut logits =
                last_position_logits(&outputs).map_err(GenerationError::engine)?;

            // Hold EOS back until the minimum length is met.
            if generated.len() < config.min_output_tokens {
                let eos = self.special.eos as usize;
                if eos < logits.len() {
                    logits[eos] = f32::NEG_INFINITY;
                }
            }
            apply_banned_sequences(&mut logits, &generated, &config.banned_sequences);
            if let Some(penalty) = config.repetition_penalty {
                apply_repetition_penalty(&mut logits, &generated, penalty);
            }
            if config.temperature_enabled() {
                apply_temperature(&mut logits, config.temperature);
            }

            let next = sample_token(logits, &sampling, &mut rng)
                .map_err(|e| GenerationError::InvalidConfig(e.to_string()))?;

            if next == self.special.eos {
                debug!("EOS at step {}", step);
                break;
            }

            generated.push(next);
            if spec.cache_enabled {
                cache.update_from_output(&outputs);
            }

            let is_last = generated.len() == config.max_output_tokens;
            on_token(&generated, is_last)?;
            current = next;
        }

        let elapsed = t_start.elapsed();
        let tokens_per_sec = if elapsed.as_secs_f64() > 0.0 {
            generated.len() as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        info!(
            "generated {} tokens in {:?} ({:.1} tokens/sec, cache: {} tensors)",
            generated.len(),
            elapsed,
            tokens_per_sec,
            cache.len()
        );

        Ok(generated)
    }

    /// Builds the input map for one step and invokes the engine.
    fn invoke_step(
        &self,
        target: crate::engine::GraphTarget,
        step: usize,
        current: u32,
        generated: &[u32],
        ctx: &EncoderContext,
        cache: &KvCacheStore,
    ) -> GenerationResult<TensorMap> {
        let spec = self.engine.spec();

        // Cached mode feeds only the current token; uncached mode replays
        // the start token plus the whole generated prefix.
        let ids = if spec.cache_enabled {
            Tensor::from_token_ids(&[current])
        } else {
            let mut prefix = Vec::with_capacity(generated.len() + 1);
            prefix.push(self.special.decoder_start);
            prefix.extend_from_slice(generated);
            Tensor::from_token_ids(&prefix)
        };

        let positions: Vec<i64> = if spec.cache_enabled {
            vec![generated.len() as i64]
        } else {
            (0..=generated.len() as i64).collect()
        };
        let position_ids = Tensor::from_mask(&positions);
        let cache_flag = Tensor::flag(step > 0);

        let mut inputs = InputMap::new();
        inputs.insert(io::INPUT_IDS, &ids);
        if spec.accepts(target, io::ENCODER_HIDDEN_STATES) {
            inputs.insert(io::ENCODER_HIDDEN_STATES, &ctx.hidden_states);
        }
        if spec.accepts(target, io::ENCODER_ATTENTION_MASK) {
            inputs.insert(io::ENCODER_ATTENTION_MASK, &ctx.attention_mask);
        }
        if spec.accepts(target, io::USE_CACHE_BRANCH) {
            inputs.insert(io::USE_CACHE_BRANCH, &cache_flag);
        }
        if spec.accepts(target, io::POSITION_IDS) {
            inputs.insert(io::POSITION_IDS, &position_ids);
        }
        // Only hand over the cache entries this graph declares.
        for (name, tensor) in cache.inputs() {
            if spec.accepts(target, name) {
                inputs.insert(name, tensor);
            }
        }

        self.engine
            .run(target, &inputs)
            .map_err(GenerationError::engine)
    }
}

/// Extracts the logit vector for the last position from the engine output.
fn last_position_logits(outputs: &TensorMap) -> anyhow::Result<Array1<f32>> {
    let tensor = outputs
        .get(io::LOGITS)
        .ok_or_else(|| anyhow!("engine output missing '{}' tensor", io::LOGITS))?;
    anyhow::ensure!(
        tensor.ndim() == 3,
        "logits must be rank 3 [1, seq, vocab], got rank {}",
        tensor.ndim()
    );
    let seq = tensor.shape()[1];
    anyhow::ensure!(seq > 0, "logits have an empty sequence axis");

    match tensor {
        Tensor::F32(arr) => {
            let row = arr.index_axis(Axis(0), 0);
            let last = row.index_axis(Axis(0), seq - 1);
            Ok(last.to_owned().into_dimensionality::<Ix1>()?)
        }
        Tensor::F16(arr) => {
            let row = arr.index_axis(Axis(0), 0);
            let last = row.index_axis(Axis(0), seq - 1);
            Ok(last.mapv(|h| h.to_f32()).into_dimensionality::<Ix1>()?)
        }
        other => Err(anyhow!(
            "logits must be a floating tensor, got {}",
            other.dtype_name()
        )),
    }
}
