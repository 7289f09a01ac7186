#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sr_engine::scripted::{BackendStats, Script, ScriptedBackend};
use sr_runtime::{GenerationRequest, Handle, Runtime, RuntimeConfig};

/// Holds one decode call open until released.
pub struct Gate {
    at: usize,
    entered: AtomicBool,
    released: AtomicBool,
    calls: AtomicUsize,
}

impl Gate {
    pub fn at(index: usize) -> Arc<Self> {
        Arc::new(Self {
            at: index,
            entered: AtomicBool::new(false),
            released: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    /// Attach to `script` as its decode hook.
    pub fn install(self: &Arc<Self>, script: Script) -> Script {
        let gate = Arc::clone(self);
        script.on_decode(Arc::new(move |index: usize| {
            gate.calls.fetch_add(1, Ordering::SeqCst);
            if index != gate.at || gate.released.load(Ordering::SeqCst) {
                return;
            }
            gate.entered.store(true, Ordering::SeqCst);
            while !gate.released.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(1));
            }
        }))
    }

    pub fn wait_entered(&self) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !self.entered.load(Ordering::SeqCst) {
            assert!(Instant::now() < deadline, "decode step never reached the gate");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    pub fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

pub fn runtime_with(script: Script, config: RuntimeConfig) -> (Arc<Runtime>, Arc<BackendStats>) {
    let backend = ScriptedBackend::new(script);
    let stats = backend.stats();
    (Arc::new(Runtime::with_backend(Arc::new(backend), config)), stats)
}

pub fn runtime(script: Script) -> (Arc<Runtime>, Arc<BackendStats>) {
    runtime_with(script, RuntimeConfig::default())
}

pub fn load(rt: &Runtime) -> Handle {
    rt.load(Path::new("model.gguf"), 256, 2).unwrap()
}

pub fn request(max_tokens: i32) -> GenerationRequest {
    GenerationRequest::from_raw(max_tokens, 0.0, 1.0, 30_000)
}
