//! Core scheduling configuration.
//!
//! # Responsibility
//! - Hold operating hours, bucket width, slot capacity and week start.
//! - Load overrides from a TOML file; absent keys keep defaults.
//!
//! # Invariants
//! - `opening_time < closing_time`.
//! - The operating window divides into whole buckets.
//! - `max_per_slot >= 1`.

use chrono::{Duration, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

pub const DEFAULT_MAX_PER_SLOT: usize = 10;
pub const DEFAULT_BUCKET_MINUTES: u32 = 60;
const DEFAULT_OPENING: (u32, u32) = (16, 0);
const DEFAULT_CLOSING: (u32, u32) = (22, 0);

/// First day of the week used by weekly views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekStart {
    #[default]
    Monday,
    Sunday,
}

impl WeekStart {
    pub fn weekday(self) -> Weekday {
        match self {
            Self::Monday => Weekday::Mon,
            Self::Sunday => Weekday::Sun,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read config: {err}"),
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::Parse(value)
    }
}

/// Scheduling constants consumed by the calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    #[serde(with = "hh_mm")]
    pub opening_time: NaiveTime,
    #[serde(with = "hh_mm")]
    pub closing_time: NaiveTime,
    pub bucket_minutes: u32,
    pub max_per_slot: usize,
    pub week_start: WeekStart,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            opening_time: hour_minute(DEFAULT_OPENING),
            closing_time: hour_minute(DEFAULT_CLOSING),
            bucket_minutes: DEFAULT_BUCKET_MINUTES,
            max_per_slot: DEFAULT_MAX_PER_SLOT,
            week_start: WeekStart::default(),
        }
    }
}

impl CoreConfig {
    pub fn bucket_width(&self) -> Duration {
        Duration::minutes(i64::from(self.bucket_minutes))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.opening_time >= self.closing_time {
            return Err(ConfigError::Invalid(format!(
                "opening_time {} must be before closing_time {}",
                self.opening_time.format("%H:%M"),
                self.closing_time.format("%H:%M")
            )));
        }
        if self.bucket_minutes == 0 {
            return Err(ConfigError::Invalid(
                "bucket_minutes must be positive".to_string(),
            ));
        }
        if self.max_per_slot == 0 {
            return Err(ConfigError::Invalid(
                "max_per_slot must be positive".to_string(),
            ));
        }
        let window_minutes = (self.closing_time - self.opening_time).num_minutes();
        if window_minutes % i64::from(self.bucket_minutes) != 0 {
            return Err(ConfigError::Invalid(format!(
                "operating window of {window_minutes} minutes is not a multiple of bucket_minutes {}",
                self.bucket_minutes
            )));
        }
        Ok(())
    }
}

/// Loads and validates configuration from a TOML file.
pub fn load_config(path: impl AsRef<Path>) -> Result<CoreConfig, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    parse_config(&text)
}

/// Parses and validates configuration from TOML text.
pub fn parse_config(text: &str) -> Result<CoreConfig, ConfigError> {
    let config: CoreConfig = toml::from_str(text)?;
    config.validate()?;
    Ok(config)
}

fn hour_minute((hour, minute): (u32, u32)) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

mod hh_mm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(value: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let text = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(text.trim(), FORMAT).map_err(serde::de::Error::custom)
    }
}
