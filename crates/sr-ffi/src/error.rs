use std::cell::RefCell;
use std::ffi::CString;

use sr_engine::EngineError;
use sr_runtime::ConfigError;
use thiserror::Error;

use crate::types::SRStatus;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Store an error message for later retrieval via `sr_last_error`.
pub fn set_last_error(msg: String) {
    let msg = msg.replace('\0', "");
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Take the last error message, leaving `None` in its place.
pub fn take_last_error() -> Option<CString> {
    LAST_ERROR.with(|e| e.borrow_mut().take())
}

#[derive(Error, Debug)]
pub enum InitError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),
    #[error("backend unavailable: {0}")]
    Backend(#[from] EngineError),
    #[error("runtime already initialised with a different config; config not applied")]
    AlreadyInitialised,
}

impl InitError {
    pub fn status(&self) -> SRStatus {
        match self {
            InitError::InvalidArgument(_) => SRStatus::ErrorInvalidArgument,
            InitError::Config(_) => SRStatus::ErrorConfig,
            InitError::Backend(_) => SRStatus::ErrorBackend,
            InitError::AlreadyInitialised => SRStatus::ErrorAlreadyInitialised,
        }
    }
}
