//! C ABI over a process-wide [`Runtime`].
//!
//! Every exported function accepts any argument values, catches panics, and
//! reports failures as values: a 0 handle plus `sr_last_error` for loads, an
//! `ERR|KIND|message` string for inference.

mod error;
mod types;

pub use error::*;
pub use types::*;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Arc, OnceLock};

use sr_engine::Backend;
use sr_runtime::{encode_error, encode_result, ErrorKind, GenerationRequest, Handle, Runtime, RuntimeConfig};
use tracing_subscriber::EnvFilter;

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Run `f`, turning a panic into `fallback`.
fn catch_panic<T, F: FnOnce() -> T>(fallback: T, f: F) -> T {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            set_last_error("internal panic".to_string());
            fallback
        }
    }
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    // A subscriber installed by the host wins.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

#[cfg(feature = "llama-cpp")]
fn install_default_backend(runtime: &Runtime) -> Result<(), InitError> {
    let Some(path) = runtime.config().llama_library.clone() else {
        return Ok(());
    };
    let backend = sr_engine::LlamaCppBackend::open(&path)?;
    runtime.set_backend(Arc::new(backend));
    Ok(())
}

#[cfg(not(feature = "llama-cpp"))]
fn install_default_backend(runtime: &Runtime) -> Result<(), InitError> {
    if let Some(path) = &runtime.config().llama_library {
        tracing::warn!(
            library = %path.display(),
            "llama library configured but this build has no llama-cpp backend"
        );
    }
    Ok(())
}

fn build_runtime(config: RuntimeConfig) -> (Runtime, Result<(), InitError>) {
    init_tracing(&config.log_filter);
    let runtime = Runtime::new(config);
    let backend = install_default_backend(&runtime);
    if let Err(e) = &backend {
        tracing::error!(error = %e, "default backend not installed");
    }
    (runtime, backend)
}

/// The global runtime, created from the environment on first use.
fn runtime() -> &'static Runtime {
    RUNTIME.get_or_init(|| {
        let config = RuntimeConfig::from_env().unwrap_or_else(|e| {
            set_last_error(format!("ignoring invalid environment config: {}", e));
            RuntimeConfig::default()
        });
        let (runtime, backend) = build_runtime(config);
        if let Err(e) = backend {
            set_last_error(e.to_string());
        }
        runtime
    })
}

/// Install the backend used by subsequent `sr_load` calls.
///
/// Rust hosts embedding this crate use this instead of the llama.cpp default.
pub fn install_backend(backend: Arc<dyn Backend>) {
    runtime().set_backend(backend);
}

unsafe fn c_str<'a>(ptr: *const c_char) -> Option<&'a CStr> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr))
    }
}

fn into_c_string(s: String) -> *mut c_char {
    let bytes: Vec<u8> = s.into_bytes().into_iter().filter(|&b| b != 0).collect();
    CString::new(bytes)
        .map(CString::into_raw)
        .unwrap_or(std::ptr::null_mut())
}

/// Initialise the library.
///
/// `config_json` may be null, in which case configuration comes from the
/// `SR_*` environment variables. Once the runtime exists, whether from an
/// earlier `sr_init` or from first use by another call, a repeat call with
/// the same configuration returns `SRStatus::Ok`; a different configuration
/// is not applied and returns `SRStatus::ErrorAlreadyInitialised`.
#[no_mangle]
pub unsafe extern "C" fn sr_init(config_json: *const c_char) -> SRStatus {
    catch_panic(SRStatus::ErrorInternal, || {
        let config = match c_str(config_json) {
            None => RuntimeConfig::from_env().map_err(InitError::from),
            Some(json) => match json.to_str() {
                Ok(json) => RuntimeConfig::from_json_str(json).map_err(InitError::from),
                Err(e) => Err(InitError::InvalidArgument(format!("config is not UTF-8: {}", e))),
            },
        };
        let config = match config {
            Ok(c) => c,
            Err(e) => {
                set_last_error(e.to_string());
                return e.status();
            }
        };

        let mut status = SRStatus::Ok;
        let mut created = false;
        let runtime = RUNTIME.get_or_init(|| {
            created = true;
            let (runtime, backend) = build_runtime(config.clone());
            if let Err(e) = backend {
                set_last_error(e.to_string());
                status = e.status();
            }
            runtime
        });
        if !created && runtime.config() != &config {
            let e = InitError::AlreadyInitialised;
            tracing::warn!(error = %e, "sr_init config differs from the running one");
            set_last_error(e.to_string());
            return e.status();
        }
        status
    })
}

/// Load a model and create its context.
///
/// Returns an opaque non-zero handle, or 0 on failure with the reason in
/// `sr_last_error`.
#[no_mangle]
pub unsafe extern "C" fn sr_load(path: *const c_char, n_ctx: i32, n_threads: i32) -> u64 {
    catch_panic(SR_NULL_HANDLE, || {
        let Some(path) = c_str(path) else {
            set_last_error("null model path".to_string());
            return SR_NULL_HANDLE;
        };
        let path = match path.to_str() {
            Ok(p) => p,
            Err(e) => {
                set_last_error(format!("invalid path: {}", e));
                return SR_NULL_HANDLE;
            }
        };

        match runtime().load(Path::new(path), n_ctx, n_threads) {
            Ok(handle) => handle.as_raw(),
            Err(e) => {
                set_last_error(e.to_string());
                SR_NULL_HANDLE
            }
        }
    })
}

/// Run one generation.
///
/// Always returns a string the caller must free with `sr_free_string`:
/// `TOKEN_COUNT|TTFT_MS|text` on success, `ERR|KIND|message` otherwise.
#[no_mangle]
pub unsafe extern "C" fn sr_run_inference(
    handle: u64,
    prompt: *const c_char,
    max_tokens: i32,
    temperature: f32,
    top_p: f32,
    timeout_ms: i64,
) -> *mut c_char {
    let response = catch_panic(encode_error(ErrorKind::Internal, "internal panic"), || {
        let request = GenerationRequest::from_raw(max_tokens, temperature, top_p, timeout_ms);
        let prompt = c_str(prompt).map(CStr::to_bytes);
        let result = runtime().run_inference_bytes(Handle::from_raw(handle), prompt, &request);
        encode_result(&result)
    });
    into_c_string(response)
}

/// Ask the in-flight inference on `handle` to stop. Unknown handles are ignored.
#[no_mangle]
pub extern "C" fn sr_cancel_inference(handle: u64) {
    catch_panic((), || {
        runtime().cancel(Handle::from_raw(handle));
    })
}

/// Invalidate `handle` and release its resources. Safe to call repeatedly.
#[no_mangle]
pub extern "C" fn sr_unload(handle: u64) {
    catch_panic((), || {
        let outcome = runtime().unload(Handle::from_raw(handle));
        tracing::debug!(handle, ?outcome, "sr_unload");
    })
}

/// Retrieve the last error message.
///
/// Returns a pointer to a C string describing the most recent error on this
/// thread, or null if there is none. The caller must free the returned string
/// with `sr_free_string`.
#[no_mangle]
pub extern "C" fn sr_last_error() -> *mut c_char {
    match error::take_last_error() {
        Some(e) => e.into_raw(),
        None => std::ptr::null_mut(),
    }
}

/// Free a string previously returned by `sr_run_inference` or `sr_last_error`.
#[no_mangle]
pub unsafe extern "C" fn sr_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}
