//! Bridge error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("invalid ignore pattern: {0}")]
    InvalidPattern(String),

    #[error("invalid cue time: {0}")]
    InvalidCueTime(String),

    #[error("decode error: {0}")]
    Decode(#[from] clock_router::DecodeError),
}
