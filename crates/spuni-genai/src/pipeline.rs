//! Text-in/text-out session over an engine and a tokenizer.

use std::time::Instant;

use log::info;

use crate::common::{GenerationConfig, StreamingResult, TokenCallback};
use crate::decoder::{DecodeOrchestrator, SpecialTokens};
use crate::encoder::EncoderInvoker;
use crate::error::{GenerationError, GenerationResult};
use crate::engine::ForwardPassEngine;
use crate::stats::GenerationStats;
use crate::streaming::StreamingController;
use crate::tokenizer::Tokenizer;

/// Ties the components together behind a text API: encode the prompt, run
/// the encoder once, drive the decode loop, decode the output tokens.
///
/// The generator owns its collaborators but no model files or discovery
/// logic; construct it with an already-loaded engine and tokenizer. One
/// instance must not serve concurrent `generate` calls; separate instances
/// may run in parallel.
pub struct Seq2SeqGenerator<E: ForwardPassEngine, T: Tokenizer> {
    engine: E,
    tokenizer: T,
    special: SpecialTokens,
}

impl<E: ForwardPassEngine, T: Tokenizer> Seq2SeqGenerator<E, T> {
    pub fn new(engine: E, tokenizer: T, special: SpecialTokens) -> Self {
        Self {
            engine,
            tokenizer,
            special,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn tokenizer(&self) -> &T {
        &self.tokenizer
    }

    /// Generates a complete string of text.
    pub fn generate(&self, input: &str, config: &GenerationConfig) -> GenerationResult<String> {
        self.generate_with_stats(input, config).map(|(text, _)| text)
    }

    /// Generates text and reports per-phase timing.
    pub fn generate_with_stats(
        &self,
        input: &str,
        config: &GenerationConfig,
    ) -> GenerationResult<(String, GenerationStats)> {
        config.validate()?;

        let prompt_ids = self
            .tokenizer
            .encode(input)
            .map_err(GenerationError::tokenizer)?;

        let t_encode = Instant::now();
        let ctx = EncoderInvoker::new(&self.engine).execute_with_default_mask(&prompt_ids)?;
        let encode_time = t_encode.elapsed();

        let orchestrator = DecodeOrchestrator::new(&self.engine, self.special);
        let t_decode = Instant::now();
        let tokens = orchestrator.generate(&ctx, config)?;
        let decode_time = t_decode.elapsed();

        let text = self
            .tokenizer
            .decode(&tokens, true)
            .map_err(GenerationError::tokenizer)?;

        let stats = GenerationStats {
            prompt_tokens: prompt_ids.len(),
            generated_tokens: tokens.len(),
            encode_time,
            decode_time,
            time_to_first_token: None,
        };
        info!(
            "generation complete: {} prompt tokens -> {} output tokens in {:?} ({:.1} tokens/sec)",
            stats.prompt_tokens,
            stats.generated_tokens,
            stats.total_time(),
            stats.tokens_per_second()
        );

        Ok((text, stats))
    }

    /// Generates with per-token callback delivery; the callback runs on the
    /// calling thread and an error from it aborts generation.
    pub fn generate_streaming(
        &self,
        input: &str,
        config: &GenerationConfig,
        callback: &mut dyn TokenCallback,
    ) -> GenerationResult<StreamingResult> {
        config.validate()?;

        let prompt_ids = self
            .tokenizer
            .encode(input)
            .map_err(GenerationError::tokenizer)?;
        let ctx = EncoderInvoker::new(&self.engine).execute_with_default_mask(&prompt_ids)?;

        let orchestrator = DecodeOrchestrator::new(&self.engine, self.special);
        StreamingController::new(&orchestrator, &self.tokenizer)
            .generate_streaming(&ctx, config, callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::common::{MockEngine, MockTokenizer, EOS};

    fn generator(script: &[u32]) -> Seq2SeqGenerator<MockEngine, MockTokenizer> {
        Seq2SeqGenerator::new(
            MockEngine::seq2seq(script),
            MockTokenizer,
            MockEngine::SPECIAL,
        )
    }

    #[test]
    fn test_text_round_trip() {
        let generator = generator(&[7, EOS]);
        let text = generator
            .generate("5 9 2", &GenerationConfig::greedy(3))
            .unwrap();
        assert_eq!(text, "7");
    }

    #[test]
    fn test_stats_reflect_token_counts() {
        let generator = generator(&[4, 6, 8, EOS]);
        let (text, stats) = generator
            .generate_with_stats("5 9 2", &GenerationConfig::greedy(10))
            .unwrap();
        assert_eq!(text, "4 6 8");
        assert_eq!(stats.prompt_tokens, 3);
        assert_eq!(stats.generated_tokens, 3);
        assert!(stats.time_to_first_token.is_none());
    }

    #[test]
    fn test_streaming_matches_batch_output() {
        let script = [4, 6, 8, EOS];

        let batch = generator(&script)
            .generate("5 9 2", &GenerationConfig::greedy(10))
            .unwrap();

        let generator = generator(&script);
        let mut streamed = String::new();
        let mut collect =
            |_id: u32, text: &str, _pos: usize, _last: bool| -> anyhow::Result<()> {
                streamed.push_str(text);
                Ok(())
            };
        let result = generator
            .generate_streaming("5 9 2", &GenerationConfig::greedy(10), &mut collect)
            .unwrap();

        assert_eq!(streamed, batch);
        assert_eq!(result.tokens, vec![4, 6, 8]);
        assert!(result.time_to_first_token.is_some());
    }

    #[test]
    fn test_tokenizer_failure_surfaces() {
        let generator = generator(&[4, EOS]);
        let result = generator.generate("not numbers", &GenerationConfig::greedy(3));
        assert!(matches!(result, Err(GenerationError::Tokenizer { .. })));
    }

    #[test]
    fn test_invalid_config_rejected_before_encoding() {
        let generator = generator(&[4, EOS]);
        let config = GenerationConfig {
            max_output_tokens: 0,
            ..Default::default()
        };
        assert!(matches!(
            generator.generate("5 9", &config),
            Err(GenerationError::InvalidConfig(_))
        ));
    }
}
