//! `sr-engine` - the native inference engine seen as a black box.
//!
//! This crate provides:
//! - The `Backend` / `NativeModel` / `NativeContext` traits the session runtime drives
//! - `EngineError`, the error type shared by every backend
//! - A runtime-loaded llama.cpp backend (feature `llama-cpp`)
//! - A deterministic scripted backend for tests (feature `testing`)

pub mod backend;
pub mod error;
#[cfg(feature = "llama-cpp")]
pub mod llama_cpp;
#[cfg(any(test, feature = "testing"))]
pub mod scripted;

pub use backend::{Backend, ContextParams, ModelParams, NativeContext, NativeModel, TokenId};
pub use error::{EngineError, Result};
#[cfg(feature = "llama-cpp")]
pub use llama_cpp::LlamaCppBackend;
