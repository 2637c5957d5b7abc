use crate::error::{ReflexError, Result};
use crate::scoring::FeedbackCategory;
use rand::Rng;
use serde::{Serialize, Serializer};
use std::str::FromStr;
use std::time::Duration;

/// Screen region a stimulus occupies, and the key that answers it
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        if rng.gen_bool(0.5) {
            Side::Left
        } else {
            Side::Right
        }
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" | "l" => Ok(Side::Left),
            "right" | "r" => Ok(Side::Right),
            other => Err(format!("unknown side '{other}'")),
        }
    }
}

pub(crate) fn as_secs<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Timing and placement of one trial. Immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrialConfig {
    #[serde(serialize_with = "as_secs")]
    pub(crate) delay: Duration,
    #[serde(rename = "duration", serialize_with = "as_secs")]
    pub(crate) display_duration: Duration,
    pub(crate) side: Option<Side>,
}

impl TrialConfig {
    pub fn new(delay: Duration, display_duration: Duration, side: Option<Side>) -> Result<Self> {
        if display_duration.is_zero() {
            return Err(ReflexError::InvalidTiming(display_duration));
        }
        Ok(Self {
            delay,
            display_duration,
            side,
        })
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn display_duration(&self) -> Duration {
        self.display_duration
    }

    pub fn side(&self) -> Option<Side> {
        self.side
    }
}

/// Outcome of one trial, appended to the session once and never changed
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialResult {
    #[serde(rename = "responseTime")]
    pub response_time_secs: f64,
    pub success: bool,
    pub key_correct: bool,
    pub accuracy: f64,
    pub category: FeedbackCategory,
}

impl TrialResult {
    pub fn responded(&self) -> bool {
        self.response_time_secs > 0.0
    }
}
