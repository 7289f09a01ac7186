use std::path::Path;

use sr_engine::scripted::ScriptedBackend;
use sr_engine::{Backend, ContextParams, ModelParams};

use crate::session::{NativeResources, Session};

pub(crate) fn scripted_resources(backend: &ScriptedBackend, n_ctx: u32) -> NativeResources {
    let model = backend
        .load_model(Path::new("m.gguf"), &ModelParams::default())
        .unwrap();
    let context = model
        .new_context(&ContextParams { n_ctx, n_threads: 1 })
        .unwrap();
    NativeResources { context, model }
}

pub(crate) fn scripted_session(backend: &ScriptedBackend) -> Session {
    Session::new(scripted_resources(backend, 32), 32, 1)
}
