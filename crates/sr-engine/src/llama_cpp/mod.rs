pub mod ffi;

use std::ffi::CString;
use std::os::raw::c_char;
use std::path::Path;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::backend::{Backend, ContextParams, ModelParams, NativeContext, NativeModel, TokenId};
use crate::error::{EngineError, Result};
use ffi::{LlamaApi, LlamaContext, LlamaModel};

/// Initialised llama.cpp library. Freed when the last model using it drops.
struct LlamaLibrary {
    api: LlamaApi,
}

impl Drop for LlamaLibrary {
    fn drop(&mut self) {
        // SAFETY: every model and context holds an Arc<LlamaLibrary>, so none is alive.
        unsafe { (self.api.backend_free)() };
    }
}

/// Backend that drives a llama.cpp shared library loaded at runtime.
pub struct LlamaCppBackend {
    lib: Arc<LlamaLibrary>,
}

impl LlamaCppBackend {
    /// Map the shared library at `library_path` and initialise the llama backend.
    pub fn open(library_path: &Path) -> Result<Self> {
        let api = LlamaApi::open(library_path)?;
        // SAFETY: called once per mapped library before any other llama call.
        unsafe { (api.backend_init)() };
        tracing::info!(library = %library_path.display(), "llama.cpp backend initialised");
        Ok(Self {
            lib: Arc::new(LlamaLibrary { api }),
        })
    }
}

impl Backend for LlamaCppBackend {
    fn name(&self) -> &str {
        "llama.cpp"
    }

    fn load_model(&self, path: &Path, params: &ModelParams) -> Result<Box<dyn NativeModel>> {
        let api = &self.lib.api;
        let c_path = CString::new(path.to_string_lossy().as_bytes())
            .map_err(|_| EngineError::ModelLoad(format!("{}: interior NUL", path.display())))?;

        // SAFETY: plain value-returning call.
        let mut model_params = unsafe { (api.model_default_params)() };
        model_params.use_mmap = params.use_mmap;

        // SAFETY: c_path outlives the call; the params struct matches llama.h.
        let raw = unsafe { (api.load_model_from_file)(c_path.as_ptr(), model_params) };
        let ptr = NonNull::new(raw).ok_or_else(|| EngineError::ModelLoad(path.display().to_string()))?;

        // SAFETY: ptr is a live model.
        let n_vocab = unsafe { (api.n_vocab)(ptr.as_ptr()) };
        let eos = unsafe { (api.token_eos)(ptr.as_ptr()) };

        Ok(Box::new(LlamaCppModel {
            lib: Arc::clone(&self.lib),
            ptr,
            n_vocab: n_vocab.max(0) as usize,
            eos,
        }))
    }
}

pub struct LlamaCppModel {
    lib: Arc<LlamaLibrary>,
    ptr: NonNull<LlamaModel>,
    n_vocab: usize,
    eos: TokenId,
}

// SAFETY: llama.cpp models are immutable after load; tokenize, vocab queries and
// context creation may be called from any thread.
unsafe impl Send for LlamaCppModel {}
unsafe impl Sync for LlamaCppModel {}

impl NativeModel for LlamaCppModel {
    fn new_context(&self, params: &ContextParams) -> Result<Box<dyn NativeContext>> {
        let api = &self.lib.api;
        // SAFETY: plain value-returning call.
        let mut ctx_params = unsafe { (api.context_default_params)() };
        ctx_params.n_ctx = params.n_ctx;
        ctx_params.n_threads = params.n_threads;
        ctx_params.n_threads_batch = params.n_threads;

        // SAFETY: self.ptr is live for as long as self is.
        let raw = unsafe { (api.new_context_with_model)(self.ptr.as_ptr(), ctx_params) };
        let ptr = NonNull::new(raw).ok_or_else(|| {
            EngineError::ContextCreate(format!("llama_new_context_with_model returned null (n_ctx={})", params.n_ctx))
        })?;
        // SAFETY: ptr is a live context.
        let n_ctx = unsafe { (api.n_ctx)(ptr.as_ptr()) } as usize;

        Ok(Box::new(LlamaCppContext {
            lib: Arc::clone(&self.lib),
            ptr,
            n_ctx,
            n_vocab: self.n_vocab,
            has_logits: false,
        }))
    }

    fn tokenize(&self, text: &str, add_bos: bool) -> Result<Vec<TokenId>> {
        let api = &self.lib.api;
        let text_len = i32::try_from(text.len())
            .map_err(|_| EngineError::Tokenize(format!("prompt of {} bytes is too long", text.len())))?;

        let mut tokens: Vec<TokenId> = vec![0; text.len() + 2];
        for _ in 0..2 {
            // SAFETY: the buffer is tokens.len() entries; text is not required to be NUL-terminated.
            let n = unsafe {
                (api.tokenize)(
                    self.ptr.as_ptr(),
                    text.as_ptr() as *const c_char,
                    text_len,
                    tokens.as_mut_ptr(),
                    tokens.len() as i32,
                    add_bos,
                    false,
                )
            };
            if n >= 0 {
                tokens.truncate(n as usize);
                return Ok(tokens);
            }
            // A negative count is the size the buffer needed.
            tokens.resize(n.unsigned_abs() as usize, 0);
        }
        Err(EngineError::Tokenize("llama_tokenize kept reporting a short buffer".to_string()))
    }

    fn n_vocab(&self) -> usize {
        self.n_vocab
    }

    fn eos(&self) -> TokenId {
        self.eos
    }

    fn token_to_piece(&self, token: TokenId) -> Result<Vec<u8>> {
        if token < 0 || token as usize >= self.n_vocab {
            return Err(EngineError::InvalidToken(token));
        }
        let api = &self.lib.api;
        let mut buf = vec![0u8; 256];
        for _ in 0..2 {
            // SAFETY: buf has buf.len() writable bytes.
            let n = unsafe {
                (api.token_to_piece)(
                    self.ptr.as_ptr(),
                    token,
                    buf.as_mut_ptr() as *mut c_char,
                    buf.len() as i32,
                    0,
                    true,
                )
            };
            if n >= 0 {
                buf.truncate(n as usize);
                return Ok(buf);
            }
            buf.resize(n.unsigned_abs() as usize, 0);
        }
        Err(EngineError::Other(format!("token {} piece does not fit", token)))
    }
}

impl Drop for LlamaCppModel {
    fn drop(&mut self) {
        // SAFETY: contexts are dropped before their model by the owner.
        unsafe { (self.lib.api.free_model)(self.ptr.as_ptr()) };
    }
}

pub struct LlamaCppContext {
    lib: Arc<LlamaLibrary>,
    ptr: NonNull<LlamaContext>,
    n_ctx: usize,
    n_vocab: usize,
    has_logits: bool,
}

// SAFETY: a context is used by one thread at a time (`&mut self` for every
// mutating call); moving it between threads is fine.
unsafe impl Send for LlamaCppContext {}

impl NativeContext for LlamaCppContext {
    fn n_ctx(&self) -> usize {
        self.n_ctx
    }

    fn clear_kv(&mut self) {
        // SAFETY: live context, exclusive access.
        unsafe { (self.lib.api.kv_cache_clear)(self.ptr.as_ptr()) };
        self.has_logits = false;
    }

    fn decode(&mut self, tokens: &[TokenId], start_pos: usize) -> Result<()> {
        if tokens.is_empty() {
            return Err(EngineError::Other("empty decode batch".to_string()));
        }
        if start_pos + tokens.len() > self.n_ctx {
            return Err(EngineError::ContextFull {
                pos: start_pos,
                requested: tokens.len(),
                n_ctx: self.n_ctx,
            });
        }
        let api = &self.lib.api;
        let n = tokens.len() as i32;

        // SAFETY: llama_batch_init allocates n entries for every per-token array
        // and one seq id per token; all writes below stay in range.
        let status = unsafe {
            let mut batch = (api.batch_init)(n, 0, 1);
            for (i, &token) in tokens.iter().enumerate() {
                *batch.token.add(i) = token;
                *batch.pos.add(i) = (start_pos + i) as i32;
                *batch.n_seq_id.add(i) = 1;
                *(*batch.seq_id.add(i)) = 0;
                *batch.logits.add(i) = i8::from(i + 1 == tokens.len());
            }
            batch.n_tokens = n;
            let status = (api.decode)(self.ptr.as_ptr(), batch);
            (api.batch_free)(batch);
            status
        };

        if status != 0 {
            self.has_logits = false;
            return Err(EngineError::Decode { status });
        }
        self.has_logits = true;
        Ok(())
    }

    fn logits(&self) -> Result<&[f32]> {
        if !self.has_logits {
            return Err(EngineError::NoLogits("no successful decode since last clear".to_string()));
        }
        // SAFETY: after a successful decode the last row holds n_vocab floats and
        // stays valid until the next &mut call.
        let ptr = unsafe { (self.lib.api.get_logits_ith)(self.ptr.as_ptr(), -1) };
        if ptr.is_null() {
            return Err(EngineError::NoLogits("llama_get_logits_ith returned null".to_string()));
        }
        Ok(unsafe { std::slice::from_raw_parts(ptr, self.n_vocab) })
    }
}

impl Drop for LlamaCppContext {
    fn drop(&mut self) {
        // SAFETY: live context, never used again.
        unsafe { (self.lib.api.free)(self.ptr.as_ptr()) };
    }
}
