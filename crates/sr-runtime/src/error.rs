use std::fmt;

use sr_engine::EngineError;
use thiserror::Error;

use crate::handle::Handle;

/// Machine-readable error class, rendered as the code in `ERR|CODE|message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NullHandle,
    StaleHandle,
    Poisoned,
    NullCtx,
    NullPrompt,
    InvalidPrompt,
    Tokenize,
    CtxOverflow,
    Decode,
    Busy,
    Internal,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 11] = [
        ErrorKind::NullHandle,
        ErrorKind::StaleHandle,
        ErrorKind::Poisoned,
        ErrorKind::NullCtx,
        ErrorKind::NullPrompt,
        ErrorKind::InvalidPrompt,
        ErrorKind::Tokenize,
        ErrorKind::CtxOverflow,
        ErrorKind::Decode,
        ErrorKind::Busy,
        ErrorKind::Internal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NullHandle => "NULL_HANDLE",
            ErrorKind::StaleHandle => "STALE_HANDLE",
            ErrorKind::Poisoned => "POISONED",
            ErrorKind::NullCtx => "NULL_CTX",
            ErrorKind::NullPrompt => "NULL_PROMPT",
            ErrorKind::InvalidPrompt => "INVALID_PROMPT",
            ErrorKind::Tokenize => "TOKENIZE",
            ErrorKind::CtxOverflow => "CTX_OVERFLOW",
            ErrorKind::Decode => "DECODE",
            ErrorKind::Busy => "BUSY",
            ErrorKind::Internal => "INTERNAL",
        }
    }

    pub fn parse(code: &str) -> Option<ErrorKind> {
        Self::ALL.into_iter().find(|k| k.as_str() == code)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an inference call was rejected before producing any output.
///
/// Failures after the first generated token are not errors: the loop stops
/// and returns what it has.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("null handle")]
    NullHandle,
    #[error("invalid or expired handle {0} (session not found in registry)")]
    StaleHandle(Handle),
    #[error("session has been unloaded (poisoned handle)")]
    Poisoned,
    #[error("session unloaded during inference setup")]
    PoisonedDuringSetup,
    #[error("model or context is null")]
    NullContext,
    #[error("null prompt")]
    NullPrompt,
    #[error("prompt is not valid UTF-8")]
    InvalidPrompt,
    #[error("tokenization failed: {0}")]
    Tokenize(#[source] EngineError),
    #[error("prompt exceeds context window ({prompt_tokens} tokens, n_ctx={n_ctx})")]
    ContextOverflow { prompt_tokens: usize, n_ctx: usize },
    #[error("prompt decode failed: {0}")]
    Decode(#[source] EngineError),
    #[error("another inference is already running on handle {0}")]
    Busy(Handle),
    #[error("internal error: {0}")]
    Internal(String),
}

impl InferenceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InferenceError::NullHandle => ErrorKind::NullHandle,
            InferenceError::StaleHandle(_) => ErrorKind::StaleHandle,
            InferenceError::Poisoned | InferenceError::PoisonedDuringSetup => ErrorKind::Poisoned,
            InferenceError::NullContext => ErrorKind::NullCtx,
            InferenceError::NullPrompt => ErrorKind::NullPrompt,
            InferenceError::InvalidPrompt => ErrorKind::InvalidPrompt,
            InferenceError::Tokenize(_) => ErrorKind::Tokenize,
            InferenceError::ContextOverflow { .. } => ErrorKind::CtxOverflow,
            InferenceError::Decode(_) => ErrorKind::Decode,
            InferenceError::Busy(_) => ErrorKind::Busy,
            InferenceError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// The registry ran out of handle space. Permanent for the process.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("handle counters exhausted (generation={generation}, slot={slot}); restart to reset")]
pub struct HandleSpaceExhausted {
    pub generation: u32,
    pub slot: u32,
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("no inference backend installed")]
    NoBackend,
    #[error("failed to load model: {0}")]
    Model(#[source] EngineError),
    #[error("failed to create context: {0}")]
    Context(#[source] EngineError),
    #[error(transparent)]
    HandleSpace(#[from] HandleSpaceExhausted),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
}

pub type Result<T> = std::result::Result<T, InferenceError>;
