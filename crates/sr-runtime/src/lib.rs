//! `sr-runtime` - guarded lifetime management for native inference sessions.
//!
//! Callers only ever see opaque generational [`Handle`]s. A [`Runtime`] maps
//! them to shared [`Session`]s, runs cancellable, deadline-bounded decode
//! loops against them, and tears them down without freeing anything an
//! in-flight call may still touch.

pub mod brace;
pub mod config;
pub mod control;
pub mod decode;
pub mod error;
pub mod guard;
pub mod handle;
pub mod registry;
pub mod runtime;
pub mod session;
pub mod wire;

#[cfg(test)]
mod test_support;

pub use brace::{closes_object, BraceScanner};
pub use config::{RuntimeConfig, TeardownPolicy, UnloadConfig};
pub use control::{Interrupt, StopControl};
pub use decode::{DecodeLoop, Generation, GenerationRequest, StopReason};
pub use error::{ConfigError, ErrorKind, HandleSpaceExhausted, InferenceError, LoadError, Result};
pub use guard::LifetimeGuard;
pub use handle::Handle;
pub use registry::Registry;
pub use runtime::{Runtime, UnloadOutcome};
pub use session::{NativeResources, Session};
pub use wire::{encode_error, encode_result, encode_success, parse_response, ParseError, Response};
