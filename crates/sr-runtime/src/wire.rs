//! The string formats handed back across the boundary.
//!
//! Success: `TOKEN_COUNT|TTFT_MS|text`. Error: `ERR|KIND|message`. The text
//! part may itself contain `|`; only the leading fields are split off.

use thiserror::Error;

use crate::decode::Generation;
use crate::error::{ErrorKind, InferenceError};

const ERR_MARKER: &str = "ERR|";

pub fn encode_success(generation: &Generation) -> String {
    format!(
        "{}|{}|{}",
        generation.tokens, generation.ttft_ms, generation.text
    )
}

pub fn encode_error(kind: ErrorKind, message: &str) -> String {
    format!("{}{}|{}", ERR_MARKER, kind.as_str(), message)
}

pub fn encode_result(result: &Result<Generation, InferenceError>) -> String {
    match result {
        Ok(generation) => encode_success(generation),
        Err(e) => encode_error(e.kind(), &e.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Success {
        tokens: u32,
        ttft_ms: u64,
        text: String,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown error kind {0:?}")]
    UnknownKind(String),
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("invalid {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
}

/// Split a response string. The error marker is checked before any metric
/// parsing, so an error is never misread as a success.
pub fn parse_response(raw: &str) -> Result<Response, ParseError> {
    if let Some(rest) = raw.strip_prefix(ERR_MARKER) {
        let (code, message) = rest.split_once('|').unwrap_or((rest, ""));
        let kind = ErrorKind::parse(code).ok_or_else(|| ParseError::UnknownKind(code.to_string()))?;
        return Ok(Response::Error {
            kind,
            message: message.to_string(),
        });
    }

    let mut parts = raw.splitn(3, '|');
    let tokens = parts.next().ok_or(ParseError::MissingField("token count"))?;
    let ttft = parts.next().ok_or(ParseError::MissingField("ttft"))?;
    let text = parts.next().ok_or(ParseError::MissingField("text"))?;

    Ok(Response::Success {
        tokens: tokens.parse().map_err(|_| ParseError::InvalidNumber {
            field: "token count",
            value: tokens.to_string(),
        })?,
        ttft_ms: ttft.parse().map_err(|_| ParseError::InvalidNumber {
            field: "ttft",
            value: ttft.to_string(),
        })?,
        text: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::StopReason;

    #[test]
    fn test_success_text_may_contain_pipes() {
        let g = Generation {
            tokens: 4,
            ttft_ms: 12,
            text: "a|b||c".to_string(),
            stop: StopReason::Eos,
        };
        let raw = encode_success(&g);
        assert_eq!(raw, "4|12|a|b||c");
        assert_eq!(
            parse_response(&raw).unwrap(),
            Response::Success {
                tokens: 4,
                ttft_ms: 12,
                text: "a|b||c".to_string()
            }
        );
    }

    #[test]
    fn test_empty_text() {
        assert_eq!(
            parse_response("0|0|").unwrap(),
            Response::Success {
                tokens: 0,
                ttft_ms: 0,
                text: String::new()
            }
        );
    }

    #[test]
    fn test_error_checked_first() {
        let raw = encode_error(ErrorKind::CtxOverflow, "prompt exceeds context window");
        assert_eq!(raw, "ERR|CTX_OVERFLOW|prompt exceeds context window");
        match parse_response(&raw).unwrap() {
            Response::Error { kind, message } => {
                assert_eq!(kind, ErrorKind::CtxOverflow);
                assert_eq!(message, "prompt exceeds context window");
            }
            other => panic!("parsed as {:?}", other),
        }
    }

    #[test]
    fn test_error_result_uses_kind_code() {
        let raw = encode_result(&Err(InferenceError::NullPrompt));
        assert_eq!(raw, "ERR|NULL_PROMPT|null prompt");
    }

    #[test]
    fn test_malformed_inputs() {
        assert!(matches!(
            parse_response("ERR|WHAT|x"),
            Err(ParseError::UnknownKind(_))
        ));
        assert!(matches!(
            parse_response("12"),
            Err(ParseError::MissingField("ttft"))
        ));
        assert!(matches!(
            parse_response("x|1|t"),
            Err(ParseError::InvalidNumber { field: "token count", .. })
        ));
    }
}
