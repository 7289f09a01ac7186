use std::path::Path;

use crate::error::Result;

/// Vocabulary token id. Signed to match the C engines this crate fronts.
pub type TokenId = i32;

/// Parameters used when loading model weights.
#[derive(Debug, Clone)]
pub struct ModelParams {
    /// Memory-map the weights instead of reading them into RAM.
    pub use_mmap: bool,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self { use_mmap: true }
    }
}

/// Parameters for a new execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextParams {
    /// Context window in tokens.
    pub n_ctx: u32,
    /// Threads used by the engine for both prompt and generation batches.
    pub n_threads: u32,
}

/// An inference engine able to load models.
///
/// Implementations wrap a native library (llama.cpp, a test double, ...).
/// Everything past this trait is treated as a black box by the runtime.
pub trait Backend: Send + Sync {
    /// Returns the name of this backend (e.g., "llama.cpp", "scripted").
    fn name(&self) -> &str;

    /// Load model weights from `path`.
    fn load_model(&self, path: &Path, params: &ModelParams) -> Result<Box<dyn NativeModel>>;
}

/// A loaded model: vocabulary plus weights.
///
/// A model may outlive any number of contexts but every context created
/// from it must be dropped first.
pub trait NativeModel: Send + Sync {
    /// Create an execution context (KV cache, scratch buffers) for this model.
    fn new_context(&self, params: &ContextParams) -> Result<Box<dyn NativeContext>>;

    /// Convert text into token ids, optionally prefixed with the BOS token.
    fn tokenize(&self, text: &str, add_bos: bool) -> Result<Vec<TokenId>>;

    /// Number of entries in the vocabulary (and in each logits row).
    fn n_vocab(&self) -> usize;

    /// End-of-sequence token id.
    fn eos(&self) -> TokenId;

    /// Raw bytes of a token's text. A piece may hold a partial UTF-8 sequence.
    fn token_to_piece(&self, token: TokenId) -> Result<Vec<u8>>;
}

/// Mutable execution state bound to one model.
pub trait NativeContext: Send {
    /// Context window size in tokens.
    fn n_ctx(&self) -> usize;

    /// Drop everything stored in the KV cache.
    fn clear_kv(&mut self);

    /// Run one forward pass over `tokens`, placed at `start_pos..`.
    ///
    /// Logits are produced for the last token of the batch only.
    fn decode(&mut self, tokens: &[TokenId], start_pos: usize) -> Result<()>;

    /// Logits for the last decoded position, `n_vocab` entries long.
    fn logits(&self) -> Result<&[f32]>;
}
