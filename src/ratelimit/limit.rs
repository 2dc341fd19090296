//! Limit and frequency model.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while parsing a limit specification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LimitError {
    /// The input is not of the form `<quantity>/<frequency>`.
    #[error("{0} is not a valid limit")]
    Malformed(String),
    /// The left side is not a non-negative integer.
    #[error("{0} is not a valid quantity")]
    InvalidQuantity(String),
    /// The right side is not a known frequency.
    #[error("{0} is not a valid frequency for a rate")]
    InvalidFrequency(String),
}

/// Named time unit of a rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frequency {
    /// Per-minute rate limiting
    Minute,
    /// Per-hour rate limiting
    Hour,
    /// Per-day rate limiting
    Day,
}

impl Frequency {
    /// Get the duration of this frequency.
    pub fn duration(&self) -> Duration {
        match self {
            Frequency::Minute => Duration::from_secs(60),
            Frequency::Hour => Duration::from_secs(3600),
            Frequency::Day => Duration::from_secs(86400),
        }
    }

    /// Canonical textual name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Minute => "minute",
            Frequency::Hour => "hour",
            Frequency::Day => "day",
        }
    }

    fn from_duration(duration: Duration) -> Option<Self> {
        [Frequency::Minute, Frequency::Hour, Frequency::Day]
            .into_iter()
            .find(|f| f.duration() == duration)
    }
}

impl FromStr for Frequency {
    type Err = LimitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "day" | "d" => Ok(Frequency::Day),
            "hour" | "h" => Ok(Frequency::Hour),
            "minute" | "m" => Ok(Frequency::Minute),
            _ => Err(LimitError::InvalidFrequency(s.to_string())),
        }
    }
}

impl From<Frequency> for Duration {
    fn from(frequency: Frequency) -> Self {
        frequency.duration()
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A number of hits allowed per unit of time.
///
/// Limits are immutable once built. They can be created from a duration and a
/// quantity, or parsed from text such as `"100/day"`, `"50/minute"` or `"1/m"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Limit {
    unit: Duration,
    quantity: u64,
}

impl Limit {
    /// Create a limit of `quantity` hits per `unit`.
    pub fn new(unit: impl Into<Duration>, quantity: u64) -> Self {
        Self {
            unit: unit.into(),
            quantity,
        }
    }

    /// Length of the trailing window.
    pub fn unit(&self) -> Duration {
        self.unit
    }

    /// Maximum hits admitted within one window.
    pub fn quantity(&self) -> u64 {
        self.quantity
    }
}

impl FromStr for Limit {
    type Err = LimitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        let [quantity, frequency] = parts.as_slice() else {
            return Err(LimitError::Malformed(s.to_string()));
        };

        let frequency: Frequency = frequency.parse()?;
        let quantity: u64 = quantity
            .parse()
            .map_err(|_| LimitError::InvalidQuantity(quantity.to_string()))?;

        Ok(Limit::new(frequency, quantity))
    }
}

impl TryFrom<String> for Limit {
    type Error = LimitError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Limit> for String {
    fn from(limit: Limit) -> Self {
        limit.to_string()
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Frequency::from_duration(self.unit) {
            Some(frequency) => write!(f, "{}/{}", self.quantity, frequency),
            None => write!(f, "{}/{:?}", self.quantity, self.unit),
        }
    }
}
