//! Engine configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file gives a
//! working four source clock:
//!
//! ```toml
//! timeout_ms = 1000
//! ltc_follow = true
//!
//! [[sources]]
//! title = "Stage"
//! counter = 0
//! ltc = true
//! timer = true
//! tod = true
//! time_zone = "Europe/Helsinki"
//! ```

use std::path::Path;
use std::time::Duration;

use clock_bridge::BridgeConfig;
use clock_core::{DEFAULT_FEEDBACK_ADDR, DEFAULT_LISTEN_ADDR, NUM_SOURCES};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One display source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Label shown with the clock
    #[serde(default)]
    pub title: String,
    /// Counter shown when the timer input is enabled
    #[serde(default)]
    pub counter: usize,
    #[serde(default)]
    pub ltc: bool,
    #[serde(default)]
    pub network_time: bool,
    #[serde(default)]
    pub timer: bool,
    #[serde(default)]
    pub tod: bool,
    /// IANA zone name for time of day
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
    #[serde(default)]
    pub hidden: bool,
    /// `#RRGGBB`
    #[serde(default = "default_text_color")]
    pub text_color: String,
    /// `#RRGGBB`
    #[serde(default = "default_background")]
    pub background: String,
}

impl SourceConfig {
    /// Source bound to `counter` showing only that timer
    pub fn timer(counter: usize) -> Self {
        Self {
            counter,
            timer: true,
            ..Default::default()
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            title: String::new(),
            counter: 0,
            ltc: false,
            network_time: false,
            timer: false,
            tod: false,
            time_zone: default_time_zone(),
            hidden: false,
            text_color: default_text_color(),
            background: default_background(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Address to receive OSC commands on
    #[serde(default = "default_listen")]
    pub listen: String,
    /// State feedback destination, `255.255.255.255:port` broadcasts on every interface
    #[serde(default = "default_feedback")]
    pub feedback: String,
    #[serde(default)]
    pub disable_feedback: bool,
    /// Flash phase length within each second for expired timers, 0 disables
    #[serde(default = "default_flash_ms")]
    pub flash_ms: u32,
    /// Timeout for tally messages, timecode and network time
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub disable_ltc: bool,
    /// Keep counting on the internal clock when timecode is lost
    #[serde(default)]
    pub ltc_follow: bool,
    #[serde(default)]
    pub format_12h: bool,
    /// Counter mirroring the cue player
    #[serde(default = "default_mitti_counter")]
    pub mitti_counter: usize,
    /// Counter mirroring the layer compositor
    #[serde(default = "default_millumin_counter")]
    pub millumin_counter: usize,
    /// Compositor layers to skip, case-insensitive regular expression
    #[serde(default = "default_ignore")]
    pub ignore_layers: String,
    /// Remote media is reset when no update arrives within this time
    #[serde(default = "default_media_timeout_ms")]
    pub media_timeout_ms: u64,
    /// Display snapshot interval
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// State feedback interval
    #[serde(default = "default_feedback_interval_ms")]
    pub feedback_interval_ms: u64,
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
}

fn default_listen() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

fn default_feedback() -> String {
    DEFAULT_FEEDBACK_ADDR.to_string()
}

fn default_flash_ms() -> u32 {
    500
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_mitti_counter() -> usize {
    8
}

fn default_millumin_counter() -> usize {
    9
}

fn default_ignore() -> String {
    "ignore".to_string()
}

fn default_media_timeout_ms() -> u64 {
    1000
}

fn default_tick_ms() -> u64 {
    100
}

fn default_feedback_interval_ms() -> u64 {
    500
}

fn default_time_zone() -> String {
    "Europe/Helsinki".to_string()
}

fn default_text_color() -> String {
    "#FFFFFF".to_string()
}

fn default_background() -> String {
    "#000000".to_string()
}

/// Primary source shows everything, the rest show their own counter
fn default_sources() -> Vec<SourceConfig> {
    (0..NUM_SOURCES)
        .map(|i| {
            if i == 0 {
                SourceConfig {
                    ltc: true,
                    tod: true,
                    ..SourceConfig::timer(0)
                }
            } else {
                SourceConfig::timer(i)
            }
        })
        .collect()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            feedback: default_feedback(),
            disable_feedback: false,
            flash_ms: default_flash_ms(),
            timeout_ms: default_timeout_ms(),
            disable_ltc: false,
            ltc_follow: false,
            format_12h: false,
            mitti_counter: default_mitti_counter(),
            millumin_counter: default_millumin_counter(),
            ignore_layers: default_ignore(),
            media_timeout_ms: default_media_timeout_ms(),
            tick_ms: default_tick_ms(),
            feedback_interval_ms: default_feedback_interval_ms(),
            sources: default_sources(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn media_timeout(&self) -> Duration {
        Duration::from_millis(self.media_timeout_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn feedback_interval(&self) -> Duration {
        Duration::from_millis(self.feedback_interval_ms.max(1))
    }

    /// Settings for the media player bridge
    pub fn bridge(&self) -> BridgeConfig {
        BridgeConfig {
            ignore_pattern: self.ignore_layers.clone(),
            cue_timeout: self.media_timeout(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = EngineConfig::from_toml("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.sources.len(), NUM_SOURCES);
        assert!(config.sources[0].ltc);
        assert_eq!(config.sources[3].counter, 3);
        assert_eq!((config.mitti_counter, config.millumin_counter), (8, 9));
    }

    #[test]
    fn test_partial_sources() {
        let config = EngineConfig::from_toml(
            r##"
            ltc_follow = true
            timeout_ms = 2500

            [[sources]]
            title = "Main"
            counter = 2
            timer = true
            background = "#202020"
            "##,
        )
        .unwrap();

        assert!(config.ltc_follow);
        assert_eq!(config.timeout(), Duration::from_millis(2500));
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].title, "Main");
        assert_eq!(config.sources[0].time_zone, "Europe/Helsinki");
        assert_eq!(config.sources[0].text_color, "#FFFFFF");
    }

    #[test]
    fn test_bad_toml() {
        assert!(EngineConfig::from_toml("timeout_ms = \"soon\"").is_err());
    }

    #[test]
    fn test_bridge_settings() {
        let config = EngineConfig {
            ignore_layers: "^bg".into(),
            ..Default::default()
        };
        let bridge = config.bridge();
        assert_eq!(bridge.ignore_pattern, "^bg");
        assert_eq!(bridge.cue_timeout, Duration::from_secs(1));
    }
}
