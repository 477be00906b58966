//! Streaming callback types.

use std::time::Duration;

/// Receives tokens as they are accepted by the decode loop.
///
/// Callbacks run synchronously on the decode thread: a slow callback
/// directly throttles generation, and an error aborts it (the error is
/// surfaced to the caller as [`crate::error::GenerationError::Callback`]).
pub trait TokenCallback {
    /// Called once per accepted token.
    ///
    /// `text` is the textual delta contributed by this token against the
    /// cumulative decode so far. `position` is zero-based. `is_last` is true
    /// only when the token exhausts the output budget; a generation that
    /// stops on EOS afterwards will have delivered its final token with
    /// `is_last == false`.
    fn on_token(&mut self, token_id: u32, text: &str, position: usize, is_last: bool)
        -> anyhow::Result<()>;
}

impl<F> TokenCallback for F
where
    F: FnMut(u32, &str, usize, bool) -> anyhow::Result<()>,
{
    fn on_token(
        &mut self,
        token_id: u32,
        text: &str,
        position: usize,
        is_last: bool,
    ) -> anyhow::Result<()> {
        self(token_id, text, position, is_last)
    }
}

/// Outcome of a streaming generation call.
#[derive(Debug, Clone)]
pub struct StreamingResult {
    /// The accepted tokens, EOS excluded.
    pub tokens: Vec<u32>,
    /// Wall-clock time from call start to the first accepted token;
    /// `None` if nothing was generated.
    pub time_to_first_token: Option<Duration>,
}
