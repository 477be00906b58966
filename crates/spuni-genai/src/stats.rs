//! Per-call timing accounting.

use std::time::Duration;

/// Timing and throughput figures for one generation call.
#[derive(Debug, Clone, Default)]
pub struct GenerationStats {
    pub prompt_tokens: usize,
    pub generated_tokens: usize,
    /// Time spent in the encoder pass.
    pub encode_time: Duration,
    /// Time spent in the decode loop (engine + sampling).
    pub decode_time: Duration,
    /// Time to first token, streaming calls only.
    pub time_to_first_token: Option<Duration>,
}

impl GenerationStats {
    pub fn total_time(&self) -> Duration {
        self.encode_time + self.decode_time
    }

    /// Decode throughput; 0.0 when nothing was generated.
    pub fn tokens_per_second(&self) -> f64 {
        let secs = self.decode_time.as_secs_f64();
        if secs > 0.0 && self.generated_tokens > 0 {
            self.generated_tokens as f64 / secs
        } else {
            0.0
        }
    }
}
