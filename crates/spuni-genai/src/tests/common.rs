// Shared mocks for unit tests across the crate; never compiled into the
// final library.
#![allow(dead_code)]

use std::cell::RefCell;

use anyhow::{anyhow, bail};
use ndarray::ArrayD;
use ndarray::IxDyn;

use crate::cache::CacheTopology;
use crate::decoder::SpecialTokens;
use crate::engine::{io, EngineSpec, ForwardPassEngine, GraphTarget, InputMap, Tensor, TensorMap};
use crate::tokenizer::Tokenizer;

/// The mock vocabulary's EOS id (T5 convention).
pub const EOS: u32 = 1;

#[derive(Clone, Copy, PartialEq)]
enum Deployment {
    /// Two graphs: first-step decoder + decoder-with-past.
    Dual,
    /// One merged graph with `use_cache_branch` and declared past inputs.
    Merged,
    /// One graph, no cache outputs at all.
    Uncached,
}

/// A scriptable encoder-decoder engine.
///
/// Each decoder invocation favors the next token in the script (logit 10),
/// optionally with a runner-up (logit 5); everything else gets logit 0.
/// Once the script runs out the engine favors EOS. Inputs are validated
/// against the declared input names, and the interesting parts of every
/// invocation are recorded for assertions.
pub struct MockEngine {
    spec: EngineSpec,
    deployment: Deployment,
    script: Vec<u32>,
    runner_up: Option<u32>,
    fail_encoder: bool,
    fail_after: Option<usize>,

    encoder_seq: RefCell<Option<usize>>,
    targets: RefCell<Vec<GraphTarget>>,
    flags: RefCell<Vec<Option<bool>>>,
    id_widths: RefCell<Vec<usize>>,
    self_lens: RefCell<Vec<Option<usize>>>,
    cross_lens: RefCell<Vec<Option<usize>>>,
}

impl MockEngine {
    pub const VOCAB: usize = 16;
    pub const HIDDEN: usize = 8;
    pub const LAYERS: usize = 2;
    pub const KV_HEADS: usize = 2;
    pub const HEAD_DIM: usize = 4;
    pub const SPECIAL: SpecialTokens = SpecialTokens {
        decoder_start: 0,
        eos: EOS,
    };

    /// Dual-graph cached deployment, the engine's preferred mode.
    pub fn seq2seq(script: &[u32]) -> Self {
        Self::build(Deployment::Dual, script)
    }

    /// Single merged graph with a cache flag and declared past inputs.
    pub fn merged(script: &[u32]) -> Self {
        Self::build(Deployment::Merged, script)
    }

    /// Single graph without any cache support.
    pub fn uncached(script: &[u32]) -> Self {
        Self::build(Deployment::Uncached, script)
    }

    fn build(deployment: Deployment, script: &[u32]) -> Self {
        let mut past_names = Vec::new();
        for layer in 0..Self::LAYERS {
            for role in ["decoder", "encoder"] {
                for kind in ["key", "value"] {
                    past_names.push(format!("past_key_values.{layer}.{role}.{kind}"));
                }
            }
        }

        let base = vec![
            io::INPUT_IDS.to_string(),
            io::ENCODER_HIDDEN_STATES.to_string(),
            io::ENCODER_ATTENTION_MASK.to_string(),
        ];
        let (decoder_inputs, with_past, cache_enabled) = match deployment {
            Deployment::Dual => {
                let mut with_past = vec![
                    io::INPUT_IDS.to_string(),
                    io::ENCODER_ATTENTION_MASK.to_string(),
                ];
                with_past.extend(past_names);
                (base, Some(with_past), true)
            }
            Deployment::Merged => {
                let mut inputs = base;
                inputs.push(io::USE_CACHE_BRANCH.to_string());
                inputs.extend(past_names);
                (inputs, None, true)
            }
            Deployment::Uncached => (base, None, false),
        };

        Self {
            spec: EngineSpec {
                topology: CacheTopology::EncoderDecoder,
                num_layers: Self::LAYERS,
                num_kv_heads: Self::KV_HEADS,
                head_dim: Self::HEAD_DIM,
                cache_enabled,
                decoder_inputs,
                decoder_with_past_inputs: with_past,
            },
            deployment,
            script: script.to_vec(),
            runner_up: None,
            fail_encoder: false,
            fail_after: None,
            encoder_seq: RefCell::new(None),
            targets: RefCell::new(Vec::new()),
            flags: RefCell::new(Vec::new()),
            id_widths: RefCell::new(Vec::new()),
            self_lens: RefCell::new(Vec::new()),
            cross_lens: RefCell::new(Vec::new()),
        }
    }

    /// Gives every step a second-favorite token.
    pub fn with_runner_up(mut self, token: u32) -> Self {
        self.runner_up = Some(token);
        self
    }

    /// Makes the encoder graph fail.
    pub fn failing_encoder(mut self) -> Self {
        self.fail_encoder = true;
        self
    }

    /// Makes decoder invocations fail after `n` successful ones.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Rewinds the script and recorders for a fresh generation run.
    pub fn reset_script(&self) {
        self.targets.borrow_mut().clear();
        self.flags.borrow_mut().clear();
        self.id_widths.borrow_mut().clear();
        self.self_lens.borrow_mut().clear();
        self.cross_lens.borrow_mut().clear();
    }

    pub fn decoder_calls(&self) -> usize {
        self.targets.borrow().len()
    }

    pub fn decoder_targets(&self) -> Vec<GraphTarget> {
        self.targets.borrow().clone()
    }

    pub fn cache_flags(&self) -> Vec<Option<bool>> {
        self.flags.borrow().clone()
    }

    pub fn input_id_widths(&self) -> Vec<usize> {
        self.id_widths.borrow().clone()
    }

    pub fn self_cache_seq_lens(&self) -> Vec<Option<usize>> {
        self.self_lens.borrow().clone()
    }

    pub fn cross_cache_seq_lens(&self) -> Vec<Option<usize>> {
        self.cross_lens.borrow().clone()
    }

    fn run_encoder(&self, inputs: &InputMap<'_>) -> anyhow::Result<TensorMap> {
        if self.fail_encoder {
            bail!("mock encoder failure");
        }
        let ids = inputs
            .get(io::INPUT_IDS)
            .ok_or_else(|| anyhow!("encoder requires input_ids"))?;
        let seq = ids.shape()[1];
        *self.encoder_seq.borrow_mut() = Some(seq);

        let mut out = TensorMap::new();
        out.insert(
            io::LAST_HIDDEN_STATE.to_string(),
            Tensor::zeros_f32(&[1, seq, Self::HIDDEN]),
        );
        Ok(out)
    }

    fn run_decoder(&self, target: GraphTarget, inputs: &InputMap<'_>) -> anyhow::Result<TensorMap> {
        // Reject anything the graph does not declare, like a real session.
        for &name in inputs.keys() {
            if !self.spec.accepts(target, name) {
                bail!("graph {:?} does not declare input '{}'", target, name);
            }
        }

        let call = self.targets.borrow().len();
        if let Some(limit) = self.fail_after {
            if call >= limit {
                bail!("mock decoder failure at call {}", call);
            }
        }

        let ids = inputs
            .get(io::INPUT_IDS)
            .ok_or_else(|| anyhow!("decoder requires input_ids"))?;
        let width = ids.shape()[1];

        let flag = inputs.get(io::USE_CACHE_BRANCH).map(|t| match t {
            Tensor::Bool(a) => a[[0]],
            _ => panic!("use_cache_branch must be a bool tensor"),
        });
        let seq_len_of = |name: &str| inputs.get(name).map(|t: &&Tensor| t.shape()[2]);

        self.targets.borrow_mut().push(target);
        self.flags.borrow_mut().push(flag);
        self.id_widths.borrow_mut().push(width);
        self.self_lens
            .borrow_mut()
            .push(seq_len_of("past_key_values.0.decoder.key"));
        self.cross_lens
            .borrow_mut()
            .push(seq_len_of("past_key_values.0.encoder.key"));

        let preferred = self.script.get(call).copied().unwrap_or(EOS);
        let mut logits = ArrayD::zeros(IxDyn(&[1, width, Self::VOCAB]));
        logits[[0, width - 1, preferred as usize]] = 10.0;
        if let Some(runner) = self.runner_up {
            logits[[0, width - 1, runner as usize]] = 5.0;
        }

        let mut out = TensorMap::new();
        out.insert(io::LOGITS.to_string(), Tensor::F32(logits));

        if self.deployment != Deployment::Uncached {
            let self_len = call + 1;
            let cross_len = self.encoder_seq.borrow().unwrap_or(3);
            for layer in 0..Self::LAYERS {
                for kind in ["key", "value"] {
                    out.insert(
                        format!("present.{layer}.decoder.{kind}"),
                        Tensor::zeros_f32(&[1, Self::KV_HEADS, self_len, Self::HEAD_DIM]),
                    );
                    out.insert(
                        format!("present.{layer}.encoder.{kind}"),
                        Tensor::zeros_f32(&[1, Self::KV_HEADS, cross_len, Self::HEAD_DIM]),
                    );
                }
            }
        }
        Ok(out)
    }
}

impl ForwardPassEngine for MockEngine {
    fn spec(&self) -> &EngineSpec {
        &self.spec
    }

    fn run(&self, target: GraphTarget, inputs: &InputMap<'_>) -> anyhow::Result<TensorMap> {
        match target {
            GraphTarget::Encoder => self.run_encoder(inputs),
            GraphTarget::Decoder | GraphTarget::DecoderWithPast => {
                self.run_decoder(target, inputs)
            }
        }
    }
}

/// A whitespace tokenizer over numeric "words": `"5 9 2"` encodes to
/// `[5, 9, 2]` and ids decode back to their decimal form. Cumulative decodes
/// are prefix-monotone, like the sub-word tokenizers the real pipeline uses.
pub struct MockTokenizer;

impl Tokenizer for MockTokenizer {
    fn encode(&self, text: &str) -> anyhow::Result<Vec<u32>> {
        text.split_whitespace()
            .map(|word| {
                word.parse::<u32>()
                    .map_err(|_| anyhow!("unknown word '{}'", word))
            })
            .collect()
    }

    fn decode(&self, ids: &[u32], skip_special: bool) -> anyhow::Result<String> {
        let words: Vec<String> = ids
            .iter()
            .filter(|&&id| !(skip_special && id <= EOS))
            .map(|id| id.to_string())
            .collect();
        Ok(words.join(" "))
    }
}
