//! Raw llama.cpp C types and the function table resolved from the shared library.
//!
//! Layouts follow the mid-2024 llama.h API (`llama_load_model_from_file`,
//! `llama_new_context_with_model`, `llama_kv_cache_clear`). Only the symbols
//! the decode loop needs are bound.

use std::os::raw::{c_char, c_float, c_int, c_void};

use libloading::Library;

use crate::error::{EngineError, Result};

pub type LlamaToken = i32;
pub type LlamaPos = i32;
pub type LlamaSeqId = i32;

#[repr(C)]
pub struct LlamaModel {
    _private: [u8; 0],
}

#[repr(C)]
pub struct LlamaContext {
    _private: [u8; 0],
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LlamaModelParams {
    pub n_gpu_layers: i32,
    pub split_mode: c_int,
    pub main_gpu: i32,
    pub tensor_split: *const c_float,
    pub rpc_servers: *const c_char,
    pub progress_callback: *mut c_void,
    pub progress_callback_user_data: *mut c_void,
    pub kv_overrides: *const c_void,
    pub vocab_only: bool,
    pub use_mmap: bool,
    pub use_mlock: bool,
    pub check_tensors: bool,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LlamaContextParams {
    pub seed: u32,
    pub n_ctx: u32,
    pub n_batch: u32,
    pub n_ubatch: u32,
    pub n_seq_max: u32,
    pub n_threads: u32,
    pub n_threads_batch: u32,
    pub rope_scaling_type: c_int,
    pub pooling_type: c_int,
    pub attention_type: c_int,
    pub rope_freq_base: c_float,
    pub rope_freq_scale: c_float,
    pub yarn_ext_factor: c_float,
    pub yarn_attn_factor: c_float,
    pub yarn_beta_fast: c_float,
    pub yarn_beta_slow: c_float,
    pub yarn_orig_ctx: u32,
    pub defrag_thold: c_float,
    pub cb_eval: *mut c_void,
    pub cb_eval_user_data: *mut c_void,
    pub type_k: c_int,
    pub type_v: c_int,
    pub logits_all: bool,
    pub embeddings: bool,
    pub offload_kqv: bool,
    pub flash_attn: bool,
    pub abort_callback: *mut c_void,
    pub abort_callback_data: *mut c_void,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LlamaBatch {
    pub n_tokens: i32,
    pub token: *mut LlamaToken,
    pub embd: *mut c_float,
    pub pos: *mut LlamaPos,
    pub n_seq_id: *mut i32,
    pub seq_id: *mut *mut LlamaSeqId,
    pub logits: *mut i8,
    pub all_pos_0: LlamaPos,
    pub all_pos_1: LlamaPos,
    pub all_seq_id: LlamaSeqId,
}

/// Function pointers resolved from `libllama`.
///
/// The `Library` is kept inside so the pointers never outlive the mapping.
pub struct LlamaApi {
    pub backend_init: unsafe extern "C" fn(),
    pub backend_free: unsafe extern "C" fn(),
    pub model_default_params: unsafe extern "C" fn() -> LlamaModelParams,
    pub context_default_params: unsafe extern "C" fn() -> LlamaContextParams,
    pub load_model_from_file:
        unsafe extern "C" fn(path: *const c_char, params: LlamaModelParams) -> *mut LlamaModel,
    pub free_model: unsafe extern "C" fn(model: *mut LlamaModel),
    pub new_context_with_model:
        unsafe extern "C" fn(model: *mut LlamaModel, params: LlamaContextParams) -> *mut LlamaContext,
    pub free: unsafe extern "C" fn(ctx: *mut LlamaContext),
    pub tokenize: unsafe extern "C" fn(
        model: *const LlamaModel,
        text: *const c_char,
        text_len: i32,
        tokens: *mut LlamaToken,
        n_tokens_max: i32,
        add_special: bool,
        parse_special: bool,
    ) -> i32,
    pub token_to_piece: unsafe extern "C" fn(
        model: *const LlamaModel,
        token: LlamaToken,
        buf: *mut c_char,
        length: i32,
        lstrip: i32,
        special: bool,
    ) -> i32,
    pub n_vocab: unsafe extern "C" fn(model: *const LlamaModel) -> i32,
    pub token_eos: unsafe extern "C" fn(model: *const LlamaModel) -> LlamaToken,
    pub n_ctx: unsafe extern "C" fn(ctx: *const LlamaContext) -> u32,
    pub kv_cache_clear: unsafe extern "C" fn(ctx: *mut LlamaContext),
    pub batch_init: unsafe extern "C" fn(n_tokens: i32, embd: i32, n_seq_max: i32) -> LlamaBatch,
    pub batch_free: unsafe extern "C" fn(batch: LlamaBatch),
    pub decode: unsafe extern "C" fn(ctx: *mut LlamaContext, batch: LlamaBatch) -> i32,
    pub get_logits_ith: unsafe extern "C" fn(ctx: *mut LlamaContext, i: i32) -> *mut c_float,
    _library: Library,
}

/// Resolve one symbol as a plain function pointer.
///
/// # Safety
/// `T` must be the exact C signature of `name` in the loaded library.
unsafe fn resolve<T: Copy>(library: &Library, name: &'static str) -> Result<T> {
    library
        .get::<T>(name.as_bytes())
        .map(|symbol| *symbol)
        .map_err(|_| EngineError::MissingSymbol(name))
}

impl LlamaApi {
    /// Map `libllama` and resolve every symbol this crate calls.
    pub fn open(path: &std::path::Path) -> Result<Self> {
        // SAFETY: loading a shared library runs its initialisers; libllama has
        // no initialisers with preconditions.
        let library = unsafe { Library::new(path) }.map_err(|e| EngineError::LibraryLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            backend_init: unsafe { resolve(&library, "llama_backend_init")? },
            backend_free: unsafe { resolve(&library, "llama_backend_free")? },
            model_default_params: unsafe { resolve(&library, "llama_model_default_params")? },
            context_default_params: unsafe { resolve(&library, "llama_context_default_params")? },
            load_model_from_file: unsafe { resolve(&library, "llama_load_model_from_file")? },
            free_model: unsafe { resolve(&library, "llama_free_model")? },
            new_context_with_model: unsafe { resolve(&library, "llama_new_context_with_model")? },
            free: unsafe { resolve(&library, "llama_free")? },
            tokenize: unsafe { resolve(&library, "llama_tokenize")? },
            token_to_piece: unsafe { resolve(&library, "llama_token_to_piece")? },
            n_vocab: unsafe { resolve(&library, "llama_n_vocab")? },
            token_eos: unsafe { resolve(&library, "llama_token_eos")? },
            n_ctx: unsafe { resolve(&library, "llama_n_ctx")? },
            kv_cache_clear: unsafe { resolve(&library, "llama_kv_cache_clear")? },
            batch_init: unsafe { resolve(&library, "llama_batch_init")? },
            batch_free: unsafe { resolve(&library, "llama_batch_free")? },
            decode: unsafe { resolve(&library, "llama_decode")? },
            get_logits_ith: unsafe { resolve(&library, "llama_get_logits_ith")? },
            _library: library,
        })
    }
}
