//! Display sources
//!
//! A source is one clock face slot. Which inputs it may show is fixed at
//! construction; only the title, colors and the hidden flag change at runtime.

use chrono_tz::Tz;
use clock_core::{Color, NUM_COUNTERS};

use crate::config::SourceConfig;
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    counter: usize,
    ltc: bool,
    network_time: bool,
    timer: bool,
    tod: bool,
    time_zone: Tz,
    pub title: String,
    pub text_color: Color,
    pub background: Color,
    pub hidden: bool,
}

impl Source {
    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        if config.counter >= NUM_COUNTERS {
            return Err(EngineError::CounterOutOfRange {
                what: format!("source {}", config.title),
                counter: config.counter,
                available: NUM_COUNTERS,
            });
        }

        let time_zone: Tz = config
            .time_zone
            .parse()
            .map_err(|_| EngineError::UnknownTimeZone(config.time_zone.clone()))?;

        Ok(Self {
            counter: config.counter,
            ltc: config.ltc,
            network_time: config.network_time,
            timer: config.timer,
            tod: config.tod,
            time_zone,
            title: config.title.clone(),
            text_color: Color::from_hex(&config.text_color)?,
            background: Color::from_hex(&config.background)?,
            hidden: config.hidden,
        })
    }

    /// Index of the bound counter
    pub fn counter(&self) -> usize {
        self.counter
    }

    pub fn shows_ltc(&self) -> bool {
        self.ltc
    }

    pub fn shows_network_time(&self) -> bool {
        self.network_time
    }

    pub fn shows_timer(&self) -> bool {
        self.timer
    }

    pub fn shows_tod(&self) -> bool {
        self.tod
    }

    pub fn time_zone(&self) -> Tz {
        self.time_zone
    }
}
