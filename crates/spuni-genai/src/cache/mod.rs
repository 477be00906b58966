//! Key-value cache store for the decode loop.
//!
//! Cache tensors travel under conventional names: the engine emits
//! `present.<layer>.<role>.<kind>` outputs and accepts
//! `past_key_values.<layer>.<role>.<kind>` inputs (encoder-decoder
//! topology), or the same without the role segment (decoder-only). The
//! store owns every tensor it holds — entries are cloned out of the
//! per-step output map so they survive it, and are released exactly once
//! when replaced or when the store is dropped.

mod store;

pub use store::{CacheShapeInfo, KvCacheStore};

/// Prefix of cache tensors in an engine *input* map.
pub const PAST_PREFIX: &str = "past_key_values.";
/// Prefix of cache tensors in an engine *output* map.
pub const PRESENT_PREFIX: &str = "present.";

/// Axis of the sequence-length dimension in a `[batch, heads, seq, head_dim]`
/// cache tensor.
pub const SEQ_AXIS: usize = 2;

/// Which attention the cached tensors belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheRole {
    /// The decoder's own history; grows by one position every step.
    SelfAttn,
    /// The encoder context attended to by the decoder; fixed after first
    /// population.
    CrossAttn,
}

/// Key or value half of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Key,
    Value,
}

/// Model topology, which determines cache entry naming and update rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTopology {
    /// Both `self` and `cross` roles per layer.
    EncoderDecoder,
    /// Only `self`-role entries, named without a role segment.
    DecoderOnly,
}

/// Parsed form of a cache tensor name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntryName {
    pub layer: usize,
    pub role: CacheRole,
    pub kind: CacheKind,
}

impl CacheEntryName {
    /// Parses an engine output name such as `present.0.decoder.key` or
    /// `present.3.value`. Returns `None` for anything that is not a
    /// well-formed cache output.
    pub fn parse_present(name: &str) -> Option<Self> {
        let rest = name.strip_prefix(PRESENT_PREFIX)?;
        let parts: Vec<&str> = rest.split('.').collect();
        let (layer, role, kind) = match parts.as_slice() {
            [layer, role, kind] => {
                let role = match *role {
                    "decoder" => CacheRole::SelfAttn,
                    "encoder" => CacheRole::CrossAttn,
                    _ => return None,
                };
                (*layer, role, *kind)
            }
            [layer, kind] => (*layer, CacheRole::SelfAttn, *kind),
            _ => return None,
        };
        let layer = layer.parse().ok()?;
        let kind = match kind {
            "key" => CacheKind::Key,
            "value" => CacheKind::Value,
            _ => return None,
        };
        Some(Self { layer, role, kind })
    }

    /// The matching engine *input* name under the given topology.
    pub fn input_name(&self, topology: CacheTopology) -> String {
        let kind = match self.kind {
            CacheKind::Key => "key",
            CacheKind::Value => "value",
        };
        match topology {
            CacheTopology::EncoderDecoder => {
                let role = match self.role {
                    CacheRole::SelfAttn => "decoder",
                    CacheRole::CrossAttn => "encoder",
                };
                format!("{}{}.{}.{}", PAST_PREFIX, self.layer, role, kind)
            }
            CacheTopology::DecoderOnly => format!("{}{}.{}", PAST_PREFIX, self.layer, kind),
        }
    }

    /// Whether this entry can exist under the given topology.
    pub fn fits(&self, topology: CacheTopology) -> bool {
        match topology {
            CacheTopology::EncoderDecoder => true,
            CacheTopology::DecoderOnly => self.role == CacheRole::SelfAttn,
        }
    }
}
