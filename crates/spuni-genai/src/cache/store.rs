use std::collections::BTreeMap;

use log::{debug, warn};

use crate::cache::{
    CacheEntryName, CacheKind, CacheRole, CacheTopology, PRESENT_PREFIX, SEQ_AXIS,
};
use crate::engine::{Tensor, TensorMap};

/// Geometry needed to build placeholder cache rows.
#[derive(Debug, Clone, Copy)]
pub struct CacheShapeInfo {
    pub num_layers: usize,
    pub num_kv_heads: usize,
    pub head_dim: usize,
}

/// Lifecycle state of the store: uninitialized until the first successful
/// update stores real `self`-role tensors. Placeholder rows do not count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheState {
    Uninitialized,
    Initialized,
}

/// Owns the per-layer cache tensors across decode steps.
///
/// Update rules by topology:
/// - encoder-decoder: `self`-role entries are wholly replaced every step
///   (the engine's `present` outputs carry the full history); `cross`-role
///   entries are stored once and authoritative afterwards.
/// - decoder-only: every entry is replaced every step.
pub struct KvCacheStore {
    topology: CacheTopology,
    entries: BTreeMap<String, Tensor>,
    state: CacheState,
    /// True while the entries are zero-filled placeholders; the first real
    /// update clears them wholesale.
    placeholder: bool,
}

impl KvCacheStore {
    pub fn new(topology: CacheTopology) -> Self {
        debug!("cache store created ({:?})", topology);
        Self {
            topology,
            entries: BTreeMap::new(),
            state: CacheState::Uninitialized,
            placeholder: false,
        }
    }

    pub fn topology(&self) -> CacheTopology {
        self.topology
    }

    /// Seeds the store with minimal zero-filled rows, shape
    /// `[1, kv_heads, 1, head_dim]` per layer and role.
    ///
    /// Some engines reject zero-length sequence axes but still require
    /// cache-shaped inputs on the first call; a single zero position is the
    /// workaround. The store stays uninitialized until real tensors arrive,
    /// and the first update discards the placeholders entirely.
    pub fn initialize_placeholder(&mut self, shape: &CacheShapeInfo) {
        self.entries.clear();
        let dims = [1, shape.num_kv_heads, 1, shape.head_dim];
        for layer in 0..shape.num_layers {
            for &role in self.roles() {
                for kind in [CacheKind::Key, CacheKind::Value] {
                    let name = CacheEntryName { layer, role, kind }.input_name(self.topology);
                    self.entries.insert(name, Tensor::zeros_f32(&dims));
                }
            }
        }
        self.state = CacheState::Uninitialized;
        self.placeholder = true;
        debug!(
            "placeholder cache seeded: {} tensors ({} layers, seq_len=1)",
            self.entries.len(),
            shape.num_layers
        );
    }

    fn roles(&self) -> &'static [CacheRole] {
        match self.topology {
            CacheTopology::EncoderDecoder => &[CacheRole::SelfAttn, CacheRole::CrossAttn],
            CacheTopology::DecoderOnly => &[CacheRole::SelfAttn],
        }
    }

    /// Folds the engine's `present.*` outputs into the store.
    ///
    /// Outputs that are not well-formed cache tensors for this topology are
    /// logged and skipped; generation proceeds without them.
    pub fn update_from_output(&mut self, outputs: &TensorMap) {
        if self.placeholder {
            self.entries.clear();
            self.placeholder = false;
        }

        let mut self_count = 0usize;
        let mut cross_stored = 0usize;
        let mut cross_reused = 0usize;

        for (name, tensor) in outputs {
            if !name.starts_with(PRESENT_PREFIX) {
                continue;
            }
            let Some(entry) = CacheEntryName::parse_present(name) else {
                warn!("ignoring malformed cache output '{}'", name);
                continue;
            };
            if !entry.fits(self.topology) {
                warn!(
                    "ignoring cache output '{}': role does not exist in {:?} topology",
                    name, self.topology
                );
                continue;
            }
            if !tensor.is_floating() {
                warn!(
                    "ignoring cache output '{}': expected floating tensor, got {}",
                    name,
                    tensor.dtype_name()
                );
                continue;
            }

            let input_name = entry.input_name(self.topology);
            match (self.topology, entry.role) {
                // Decoder-only and self-attention entries carry the full
                // history each step: replace, dropping the previous tensor.
                (CacheTopology::DecoderOnly, _) | (_, CacheRole::SelfAttn) => {
                    self.entries.insert(input_name, tensor.clone());
                    self_count += 1;
                }
                // Cross-attention is computed from the fixed encoder context;
                // the first copy is authoritative.
                (_, CacheRole::CrossAttn) => {
                    if self.entries.contains_key(&input_name) {
                        cross_reused += 1;
                    } else {
                        self.entries.insert(input_name, tensor.clone());
                        cross_stored += 1;
                    }
                }
            }
        }

        if self_count > 0 {
            self.state = CacheState::Initialized;
        }
        debug!(
            "cache updated: {} self tensors, {} cross stored, {} cross reused",
            self_count, cross_stored, cross_reused
        );
    }

    /// Read-only snapshot for the next engine invocation.
    pub fn inputs(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_initialized(&self) -> bool {
        self.state == CacheState::Initialized
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, input_name: &str) -> Option<&Tensor> {
        self.entries.get(input_name)
    }

    /// Sequence length of the stored `self`-role history, 0 if none.
    pub fn self_attn_len(&self) -> usize {
        self.entries
            .iter()
            .find(|(name, _)| match self.topology {
                CacheTopology::EncoderDecoder => name.contains(".decoder."),
                CacheTopology::DecoderOnly => true,
            })
            .map(|(_, t)| t.shape().get(SEQ_AXIS).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Drops every tensor and returns to the uninitialized state.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.state = CacheState::Uninitialized;
        self.placeholder = false;
    }
}
