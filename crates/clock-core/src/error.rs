//! Error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid timecode: {0}")]
    InvalidTimecode(String),

    #[error("invalid time of day: {0}")]
    InvalidTimeOfDay(String),

    #[error("invalid color: {0}")]
    InvalidColor(String),

    #[error("counter out of range: {0}")]
    OutOfRange(String),
}
