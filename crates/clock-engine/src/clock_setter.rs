//! System clock setting
//!
//! `/clock/time/set` asks the host to change its wall clock. Hosts that may
//! not touch their clock keep the default [`LogOnlySetter`].

use std::process::Command;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use clock_core::TimeOfDay;
use tracing::{debug, info};

use crate::error::{EngineError, Result};

/// Sets the host clock to a time of day in a zone
pub trait SystemClockSetter: Send + Sync {
    fn set_time(&self, time: TimeOfDay, zone: Tz, now: DateTime<Utc>) -> Result<()>;
}

/// Only logs the request
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlySetter;

impl SystemClockSetter for LogOnlySetter {
    fn set_time(&self, time: TimeOfDay, zone: Tz, _now: DateTime<Utc>) -> Result<()> {
        info!("System clock set to {} ({}) requested, not applied", time, zone);
        Ok(())
    }
}

/// Runs `date --set` with `TZ` set to the zone. Keeps today's date in that zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct DateCommandSetter;

impl DateCommandSetter {
    /// Argument passed to `date --set`
    pub fn date_argument(time: TimeOfDay, zone: Tz, now: DateTime<Utc>) -> String {
        format!("{} {}", now.with_timezone(&zone).format("%Y-%m-%d"), time)
    }
}

impl SystemClockSetter for DateCommandSetter {
    fn set_time(&self, time: TimeOfDay, zone: Tz, now: DateTime<Utc>) -> Result<()> {
        let date = Self::date_argument(time, zone, now);
        debug!("Running date --set {:?}", date);

        let status = Command::new("date")
            .arg("--set")
            .arg(&date)
            .env("TZ", zone.name())
            .status()?;

        if !status.success() {
            return Err(EngineError::ClockSet(format!("date exited with {}", status)));
        }
        info!("System clock set to {} ({})", date, zone);
        Ok(())
    }
}
