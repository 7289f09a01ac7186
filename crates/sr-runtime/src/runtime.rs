use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use sr_engine::{Backend, ContextParams, ModelParams};

use crate::config::{RuntimeConfig, TeardownPolicy};
use crate::decode::{DecodeLoop, Generation, GenerationRequest};
use crate::error::{InferenceError, LoadError, Result};
use crate::guard::LifetimeGuard;
use crate::handle::Handle;
use crate::registry::Registry;
use crate::session::{NativeResources, Session};

/// What [`Runtime::unload`] ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnloadOutcome {
    /// The handle did not resolve; nothing happened.
    NotFound,
    /// Native resources were released before returning.
    Freed,
    /// The in-flight call outlasted the wait; resources are never freed.
    Leaked,
    /// The in-flight call outlasted the wait; its last reference frees them.
    Deferred,
}

/// Owns the backend, the handle registry and the configuration.
///
/// Every operation is safe to call from any thread with any handle value.
pub struct Runtime {
    backend: RwLock<Option<Arc<dyn Backend>>>,
    registry: Registry<Session>,
    config: RuntimeConfig,
}

impl Runtime {
    /// A runtime with no backend yet; loads fail until one is installed.
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            backend: RwLock::new(None),
            registry: Registry::new(),
            config,
        }
    }

    pub fn with_backend(backend: Arc<dyn Backend>, config: RuntimeConfig) -> Self {
        let runtime = Self::new(config);
        runtime.set_backend(backend);
        runtime
    }

    /// Replace the registry, e.g. to resume handle counters.
    pub fn with_registry(mut self, registry: Registry<Session>) -> Self {
        self.registry = registry;
        self
    }

    /// Install the backend used by subsequent loads. Loaded sessions keep
    /// the backend that created them.
    pub fn set_backend(&self, backend: Arc<dyn Backend>) {
        tracing::info!(backend = backend.name(), "backend installed");
        *self.backend.write() = Some(backend);
    }

    pub fn has_backend(&self) -> bool {
        self.backend.read().is_some()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Number of handles that currently resolve.
    pub fn live_sessions(&self) -> usize {
        self.registry.len()
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.registry.lookup(handle).is_some()
    }

    /// Load a model and create its execution context.
    pub fn load(&self, path: &Path, n_ctx: i32, n_threads: i32) -> std::result::Result<Handle, LoadError> {
        if path.as_os_str().is_empty() {
            return Err(LoadError::InvalidArgument("empty model path".to_string()));
        }
        let n_ctx = u32::try_from(n_ctx)
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| LoadError::InvalidArgument(format!("context size must be positive, got {}", n_ctx)))?;
        let n_threads = u32::try_from(n_threads)
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| {
                LoadError::InvalidArgument(format!("thread count must be positive, got {}", n_threads))
            })?;

        let backend = self.backend.read().clone().ok_or(LoadError::NoBackend)?;

        let model_params = ModelParams {
            use_mmap: self.config.use_mmap,
        };
        let model = backend.load_model(path, &model_params).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "model load failed");
            LoadError::Model(e)
        })?;
        let context = model
            .new_context(&ContextParams { n_ctx, n_threads })
            .map_err(|e| {
                tracing::error!(n_ctx, error = %e, "context creation failed");
                LoadError::Context(e)
            })?;

        let session = Session::new(NativeResources { context, model }, n_ctx, n_threads);
        let handle = self.registry.insert(Arc::new(session))?;

        tracing::info!(
            handle = %handle,
            path = %path.display(),
            n_ctx,
            n_threads,
            backend = backend.name(),
            "session loaded"
        );
        Ok(handle)
    }

    pub fn run_inference(&self, handle: Handle, prompt: &str, request: &GenerationRequest) -> Result<Generation> {
        self.run_inference_bytes(handle, Some(prompt.as_bytes()), request)
    }

    /// Run one generation with a prompt as received from the boundary
    /// (possibly absent, possibly not UTF-8).
    ///
    /// Handle and lifecycle checks come first, so an invalid handle is
    /// reported as such even when the prompt is also bad.
    pub fn run_inference_bytes(
        &self,
        handle: Handle,
        prompt: Option<&[u8]>,
        request: &GenerationRequest,
    ) -> Result<Generation> {
        self.run_inference_with(handle, prompt, request, |_| {})
    }

    /// `after_guard` runs once the lifetime guard is held, before the
    /// poison re-check.
    fn run_inference_with(
        &self,
        handle: Handle,
        prompt: Option<&[u8]>,
        request: &GenerationRequest,
        after_guard: impl FnOnce(&Session),
    ) -> Result<Generation> {
        if handle.is_null() {
            return Err(InferenceError::NullHandle);
        }
        let session = self.registry.lookup(handle).ok_or_else(|| {
            tracing::warn!(handle = %handle, "inference on unknown handle");
            InferenceError::StaleHandle(handle)
        })?;
        if session.is_poisoned() {
            return Err(InferenceError::Poisoned);
        }
        if !session.has_resources() {
            return Err(InferenceError::NullContext);
        }

        let _guard = LifetimeGuard::acquire(&session).ok_or_else(|| {
            tracing::warn!(handle = %handle, "inference already running on handle");
            InferenceError::Busy(handle)
        })?;
        after_guard(&session);
        // Cleared before the re-check so a cancel from a racing unload is
        // either seen here as poison or survives into the loop.
        session.clear_cancel();
        if session.is_poisoned() {
            return Err(InferenceError::PoisonedDuringSetup);
        }

        // Declared after the guard so the lock is released before `running`
        // is cleared.
        let mut resources = session
            .try_lock_resources()
            .ok_or(InferenceError::Busy(handle))?;
        let resources = resources.as_mut().ok_or(InferenceError::NullContext)?;

        let prompt = prompt.ok_or(InferenceError::NullPrompt)?;
        let prompt = std::str::from_utf8(prompt).map_err(|_| InferenceError::InvalidPrompt)?;

        tracing::debug!(
            handle = %handle,
            n_ctx = session.n_ctx(),
            n_threads = session.n_threads(),
            max_tokens = request.max_tokens,
            "inference started"
        );
        let sampler = self.config.sampling.chain(&request.sampling);
        let result = DecodeLoop::new(sampler, self.config.add_bos)
            .with_context_limit(session.n_ctx() as usize)
            .run(resources, prompt, request, session.cancel_flag());
        if let Err(e) = &result {
            tracing::warn!(handle = %handle, kind = %e.kind(), error = %e, "inference rejected");
        }
        result
    }

    /// Ask the in-flight call on `handle` to stop after its current step.
    ///
    /// Returns whether the flag was set; unknown and poisoned handles are
    /// ignored.
    pub fn cancel(&self, handle: Handle) -> bool {
        let Some(session) = self.registry.lookup(handle) else {
            return false;
        };
        if session.is_poisoned() {
            return false;
        }
        session.request_cancel();
        tracing::info!(handle = %handle, "cancel requested");
        true
    }

    /// Invalidate `handle` and release its native resources.
    ///
    /// Blocks for at most the configured wait while an in-flight call winds
    /// down. If the call is still running afterwards the resources are not
    /// freed here, and the configured [`TeardownPolicy`] decides their fate.
    pub fn unload(&self, handle: Handle) -> UnloadOutcome {
        let Some(session) = self.registry.erase(handle) else {
            tracing::warn!(handle = %handle, "unload of unknown handle (already unloaded?)");
            return UnloadOutcome::NotFound;
        };

        session.poison();
        session.request_cancel();

        let wait = self.config.unload.wait();
        let poll = self.config.unload.poll_interval();
        let started = Instant::now();
        loop {
            if !session.is_running() {
                if let Ok(resources) = session.try_take_resources() {
                    drop(resources);
                    tracing::info!(
                        handle = %handle,
                        waited_ms = started.elapsed().as_millis() as u64,
                        "session unloaded"
                    );
                    return UnloadOutcome::Freed;
                }
            }
            let elapsed = started.elapsed();
            if elapsed >= wait {
                break;
            }
            std::thread::sleep(poll.min(wait - elapsed).max(Duration::from_millis(1)));
        }

        match self.config.unload.on_timeout {
            TeardownPolicy::Leak => {
                session.abandon();
                tracing::error!(
                    handle = %handle,
                    wait_ms = self.config.unload.wait_ms,
                    "inference still running after wait, leaking native resources"
                );
                UnloadOutcome::Leaked
            }
            TeardownPolicy::ReleaseOnLastReference => {
                tracing::warn!(
                    handle = %handle,
                    wait_ms = self.config.unload.wait_ms,
                    "inference still running after wait, deferring release to its last reference"
                );
                UnloadOutcome::Deferred
            }
        }
    }
}
