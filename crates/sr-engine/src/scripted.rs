//! A deterministic, byte-level engine for tests.
//!
//! Every byte value is its own token, followed by [`BOS`] and [`EOS`]. The
//! "model" ignores its input and emits the bytes of a fixed script, one per
//! decode call, then end-of-sequence. Failure injection, per-step latency and
//! a decode hook let tests hold a step open or flip flags mid-run.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{Backend, ContextParams, ModelParams, NativeContext, NativeModel, TokenId};
use crate::error::{EngineError, Result};

pub const BOS: TokenId = 256;
pub const EOS: TokenId = 257;
pub const N_VOCAB: usize = 258;

/// Called at the start of every decode call with its index since the last
/// KV clear (0 is the prompt prefill).
pub type DecodeHook = Arc<dyn Fn(usize) + Send + Sync>;

/// Counters shared between a backend and everything it created.
#[derive(Debug, Default)]
pub struct BackendStats {
    models_loaded: AtomicUsize,
    models_freed: AtomicUsize,
    contexts_created: AtomicUsize,
    contexts_freed: AtomicUsize,
    decode_calls: AtomicUsize,
}

impl BackendStats {
    pub fn models_loaded(&self) -> usize {
        self.models_loaded.load(Ordering::SeqCst)
    }

    pub fn models_freed(&self) -> usize {
        self.models_freed.load(Ordering::SeqCst)
    }

    pub fn contexts_created(&self) -> usize {
        self.contexts_created.load(Ordering::SeqCst)
    }

    pub fn contexts_freed(&self) -> usize {
        self.contexts_freed.load(Ordering::SeqCst)
    }

    pub fn decode_calls(&self) -> usize {
        self.decode_calls.load(Ordering::SeqCst)
    }

    /// Models loaded and not yet freed.
    pub fn live_models(&self) -> usize {
        self.models_loaded() - self.models_freed()
    }
}

/// What the scripted model emits and how it misbehaves.
#[derive(Clone, Default)]
pub struct Script {
    output: Vec<u8>,
    trailing: Option<u8>,
    step_delay: Duration,
    fail_decode_at: Option<usize>,
    fail_tokenize: bool,
    fail_model_load: bool,
    fail_context: bool,
    hook: Option<DecodeHook>,
}

impl Script {
    /// Emit the bytes of `text`, one token each, then EOS.
    pub fn emitting(text: &str) -> Self {
        Self {
            output: text.as_bytes().to_vec(),
            ..Default::default()
        }
    }

    /// After the scripted text, emit `byte` forever instead of EOS.
    pub fn then_repeat(mut self, byte: u8) -> Self {
        self.trailing = Some(byte);
        self
    }

    /// Sleep this long inside every decode call.
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Make decode call `index` (0 = prefill) return an error.
    pub fn fail_decode_at(mut self, index: usize) -> Self {
        self.fail_decode_at = Some(index);
        self
    }

    pub fn fail_tokenize(mut self) -> Self {
        self.fail_tokenize = true;
        self
    }

    pub fn fail_model_load(mut self) -> Self {
        self.fail_model_load = true;
        self
    }

    pub fn fail_context(mut self) -> Self {
        self.fail_context = true;
        self
    }

    pub fn on_decode(mut self, hook: DecodeHook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Token the model predicts after decode call `index`.
    fn token_at(&self, index: usize) -> TokenId {
        match self.output.get(index) {
            Some(&b) => TokenId::from(b),
            None => self.trailing.map(TokenId::from).unwrap_or(EOS),
        }
    }
}

/// Backend handing out [`ScriptedModel`]s that all follow one [`Script`].
pub struct ScriptedBackend {
    script: Arc<Script>,
    stats: Arc<BackendStats>,
}

impl ScriptedBackend {
    pub fn new(script: Script) -> Self {
        Self {
            script: Arc::new(script),
            stats: Arc::new(BackendStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<BackendStats> {
        Arc::clone(&self.stats)
    }
}

impl Backend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn load_model(&self, path: &Path, _params: &ModelParams) -> Result<Box<dyn NativeModel>> {
        if self.script.fail_model_load || path.as_os_str().is_empty() {
            return Err(EngineError::ModelLoad(path.display().to_string()));
        }
        self.stats.models_loaded.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedModel {
            script: Arc::clone(&self.script),
            stats: Arc::clone(&self.stats),
        }))
    }
}

pub struct ScriptedModel {
    script: Arc<Script>,
    stats: Arc<BackendStats>,
}

impl NativeModel for ScriptedModel {
    fn new_context(&self, params: &ContextParams) -> Result<Box<dyn NativeContext>> {
        if self.script.fail_context || params.n_ctx == 0 {
            return Err(EngineError::ContextCreate(format!(
                "scripted context refused (n_ctx={})",
                params.n_ctx
            )));
        }
        self.stats.contexts_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedContext {
            script: Arc::clone(&self.script),
            stats: Arc::clone(&self.stats),
            n_ctx: params.n_ctx as usize,
            n_past: 0,
            calls: 0,
            logits: None,
        }))
    }

    fn tokenize(&self, text: &str, add_bos: bool) -> Result<Vec<TokenId>> {
        if self.script.fail_tokenize {
            return Err(EngineError::Tokenize("scripted tokenizer failure".to_string()));
        }
        let mut tokens = Vec::with_capacity(text.len() + 1);
        if add_bos {
            tokens.push(BOS);
        }
        tokens.extend(text.bytes().map(TokenId::from));
        Ok(tokens)
    }

    fn n_vocab(&self) -> usize {
        N_VOCAB
    }

    fn eos(&self) -> TokenId {
        EOS
    }

    fn token_to_piece(&self, token: TokenId) -> Result<Vec<u8>> {
        match token {
            0..=255 => Ok(vec![token as u8]),
            BOS | EOS => Ok(Vec::new()),
            _ => Err(EngineError::InvalidToken(token)),
        }
    }
}

impl Drop for ScriptedModel {
    fn drop(&mut self) {
        self.stats.models_freed.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct ScriptedContext {
    script: Arc<Script>,
    stats: Arc<BackendStats>,
    n_ctx: usize,
    n_past: usize,
    calls: usize,
    logits: Option<Vec<f32>>,
}

impl NativeContext for ScriptedContext {
    fn n_ctx(&self) -> usize {
        self.n_ctx
    }

    fn clear_kv(&mut self) {
        self.n_past = 0;
        self.calls = 0;
        self.logits = None;
    }

    fn decode(&mut self, tokens: &[TokenId], start_pos: usize) -> Result<()> {
        let index = self.calls;
        self.calls += 1;
        self.stats.decode_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(hook) = &self.script.hook {
            hook(index);
        }
        if !self.script.step_delay.is_zero() {
            std::thread::sleep(self.script.step_delay);
        }
        if self.script.fail_decode_at == Some(index) {
            return Err(EngineError::Decode { status: -1 });
        }
        if tokens.is_empty() {
            return Err(EngineError::Other("empty decode batch".to_string()));
        }
        if start_pos != self.n_past || start_pos + tokens.len() > self.n_ctx {
            return Err(EngineError::ContextFull {
                pos: start_pos,
                requested: tokens.len(),
                n_ctx: self.n_ctx,
            });
        }
        if let Some(&bad) = tokens.iter().find(|&&t| t < 0 || t as usize >= N_VOCAB) {
            return Err(EngineError::InvalidToken(bad));
        }

        self.n_past += tokens.len();
        let mut logits = vec![0.0f32; N_VOCAB];
        logits[self.script.token_at(index) as usize] = 1.0;
        self.logits = Some(logits);
        Ok(())
    }

    fn logits(&self) -> Result<&[f32]> {
        self.logits
            .as_deref()
            .ok_or_else(|| EngineError::NoLogits("nothing decoded yet".to_string()))
    }
}

impl Drop for ScriptedContext {
    fn drop(&mut self) {
        self.stats.contexts_freed.fetch_add(1, Ordering::SeqCst);
    }
}
