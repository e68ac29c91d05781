//! Router error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RouterError>;

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("invalid route pattern: {0}")]
    InvalidPattern(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("transport error: {0}")]
    Transport(#[from] clock_transport::TransportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a matched OSC message could not be turned into a command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("expected {expected} arguments, got {got}")]
    Arity { expected: usize, got: usize },

    #[error("argument {index}: expected {expected}, got {got}")]
    ArgType {
        index: usize,
        expected: &'static str,
        got: String,
    },

    #[error("index out of range: {0}")]
    Index(String),
}
