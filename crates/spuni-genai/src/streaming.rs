//! Streams tokens to a caller as they are accepted.

use std::time::Instant;

use log::{debug, info};

use crate::common::{GenerationConfig, StreamingResult, TokenCallback};
use crate::decoder::DecodeOrchestrator;
use crate::encoder::EncoderContext;
use crate::engine::ForwardPassEngine;
use crate::error::{GenerationError, GenerationResult};
use crate::tokenizer::Tokenizer;

/// Wraps the decode loop with per-token callback delivery and latency
/// tracking.
///
/// After each accepted token the *entire* cumulative sequence is decoded and
/// the textual delta against the previous cumulative decode is handed to the
/// callback, synchronously on the decode thread. A callback error aborts
/// generation immediately.
pub struct StreamingController<'a, E: ForwardPassEngine, T: Tokenizer + ?Sized> {
    orchestrator: &'a DecodeOrchestrator<'a, E>,
    tokenizer: &'a T,
}

impl<'a, E: ForwardPassEngine, T: Tokenizer + ?Sized> StreamingController<'a, E, T> {
    pub fn new(orchestrator: &'a DecodeOrchestrator<'a, E>, tokenizer: &'a T) -> Self {
        Self {
            orchestrator,
            tokenizer,
        }
    }

    pub fn generate_streaming(
        &self,
        ctx: &EncoderContext,
        config: &GenerationConfig,
        callback: &mut dyn TokenCallback,
    ) -> GenerationResult<StreamingResult> {
        let t_start = Instant::now();
        let mut time_to_first_token = None;
        let mut previous = String::new();

        let tokens = self.orchestrator.run_with(ctx, config, |generated, is_last| {
            let Some(&token) = generated.last() else {
                return Ok(());
            };
            if time_to_first_token.is_none() {
                let ttft = t_start.elapsed();
                debug!("time to first token: {:?}", ttft);
                time_to_first_token = Some(ttft);
            }

            let full = self
                .tokenizer
                .decode(generated, true)
                .map_err(GenerationError::tokenizer)?;
            let delta_start = common_prefix_len(&previous, &full);
            let delta = &full[delta_start..];

            callback
                .on_token(token, delta, generated.len() - 1, is_last)
                .map_err(|source| GenerationError::Callback { source })?;

            previous = full;
            Ok(())
        })?;

        if let Some(ttft) = time_to_first_token {
            info!(
                "streamed {} tokens in {:?} (TTFT {:?})",
                tokens.len(),
                t_start.elapsed(),
                ttft
            );
        }

        Ok(StreamingResult {
            tokens,
            time_to_first_token,
        })
    }
}

/// Byte length of the longest common prefix that ends on a char boundary in
/// both strings.
fn common_prefix_len(a: &str, b: &str) -> usize {
    let mut len = 0;
    for (ca, cb) in a.chars().zip(b.chars()) {
        if ca != cb {
            break;
        }
        len += ca.len_utf8();
    }
    len
}
