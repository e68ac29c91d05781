//! Engine error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("unknown time zone: {0}")]
    UnknownTimeZone(String),

    #[error("invalid color: {0}")]
    InvalidColor(#[from] clock_core::Error),

    #[error("counter {counter} out of range for {what} (have {available})")]
    CounterOutOfRange {
        what: String,
        counter: usize,
        available: usize,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("system clock error: {0}")]
    ClockSet(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for EngineError {
    fn from(e: toml::de::Error) -> Self {
        EngineError::Config(e.to_string())
    }
}
