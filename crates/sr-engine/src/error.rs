use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to load engine library {path}: {reason}")]
    LibraryLoad { path: String, reason: String },
    #[error("engine library is missing symbol `{0}`")]
    MissingSymbol(&'static str),
    #[error("failed to load model from {0}")]
    ModelLoad(String),
    #[error("failed to create execution context: {0}")]
    ContextCreate(String),
    #[error("tokenization failed: {0}")]
    Tokenize(String),
    #[error("decode step failed with status {status}")]
    Decode { status: i32 },
    #[error("decode batch of {requested} tokens at position {pos} exceeds context window of {n_ctx}")]
    ContextFull {
        pos: usize,
        requested: usize,
        n_ctx: usize,
    },
    #[error("no logits available: {0}")]
    NoLogits(String),
    #[error("token id {0} is outside the vocabulary")]
    InvalidToken(i32),
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
