//! Clock Engine
//!
//! The state side of the clock:
//! - Configuration ([`EngineConfig`], [`SourceConfig`])
//! - Display sources and their priority rules ([`Source`], [`Engine`])
//! - The single-writer command loop with expiry timers and state
//!   feedback ([`EngineService`])

pub mod clock_setter;
pub mod config;
pub mod engine;
pub mod error;
pub mod service;
pub mod source;

pub use clock_setter::{DateCommandSetter, LogOnlySetter, SystemClockSetter};
pub use config::{EngineConfig, SourceConfig};
pub use engine::{Engine, Expiry};
pub use error::{EngineError, Result};
pub use service::EngineService;
pub use source::Source;
