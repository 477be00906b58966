//! The tokenizer boundary.

use anyhow::anyhow;

/// Text/token conversion collaborator.
///
/// Decoding takes the whole cumulative sequence, not individual tokens:
/// sub-word tokenizers re-segment boundaries depending on context.
pub trait Tokenizer {
    fn encode(&self, text: &str) -> anyhow::Result<Vec<u32>>;

    fn decode(&self, ids: &[u32], skip_special: bool) -> anyhow::Result<String>;
}

impl Tokenizer for tokenizers::Tokenizer {
    fn encode(&self, text: &str) -> anyhow::Result<Vec<u32>> {
        let encoding = (**self).encode(text, false).map_err(|e| anyhow!(e))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, ids: &[u32], skip_special: bool) -> anyhow::Result<String> {
        (**self).decode(ids, skip_special).map_err(|e| anyhow!(e))
    }
}
