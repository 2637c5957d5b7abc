use crate::error::{ReflexError, Result};
use crate::scoring::{GameVariant, ScoringStrategy};
use crate::trial::{as_secs, Side, TrialConfig};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Attribute-style key/value pairs describing one session element
pub type Attributes = BTreeMap<String, Value>;

/// Global timing rules shared by every trial of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(serialize_with = "as_secs")]
    guess_time_limit: Duration,
    #[serde(serialize_with = "as_secs")]
    response_time_limit: Duration,
    #[serde(serialize_with = "as_secs")]
    feedback_duration: Duration,
}

impl SessionConfig {
    /// Zero disables the guess check; a zero response limit means "use the
    /// trial's display duration".
    pub fn new(
        guess_time_limit: Duration,
        response_time_limit: Duration,
        feedback_duration: Duration,
    ) -> Result<Self> {
        if !guess_time_limit.is_zero()
            && !response_time_limit.is_zero()
            && guess_time_limit >= response_time_limit
        {
            return Err(ReflexError::InvalidLimits {
                guess: guess_time_limit,
                response: response_time_limit,
            });
        }
        Ok(Self {
            guess_time_limit,
            response_time_limit,
            feedback_duration,
        })
    }

    pub fn guess_time_limit(&self) -> Duration {
        self.guess_time_limit
    }

    pub fn response_time_limit(&self) -> Duration {
        self.response_time_limit
    }

    pub fn feedback_duration(&self) -> Duration {
        self.feedback_duration
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            guess_time_limit: Duration::ZERO,
            response_time_limit: Duration::ZERO,
            feedback_duration: Duration::ZERO,
        }
    }
}

/// Values used when a session is generated, or when a description leaves an
/// attribute out or gets it wrong. All durations in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionDefaults {
    pub trials: usize,
    pub delay_range_secs: (f64, f64),
    pub display_duration_secs: f64,
    pub guess_time_limit_secs: f64,
    pub response_time_limit_secs: f64,
    pub feedback_duration_secs: f64,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            trials: 10,
            delay_range_secs: (1.0, 3.0),
            display_duration_secs: 2.0,
            guess_time_limit_secs: 0.1,
            response_time_limit_secs: 0.0,
            feedback_duration_secs: 1.0,
        }
    }
}

const FALLBACK_DISPLAY_SECS: f64 = 2.0;

/// Zero for negative, NaN or unrepresentably large values
fn non_negative(secs: f64) -> Duration {
    if secs > 0.0 {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    } else {
        Duration::ZERO
    }
}

impl SessionDefaults {
    fn display_duration(&self) -> Duration {
        let d = non_negative(self.display_duration_secs);
        if d.is_zero() {
            Duration::from_secs_f64(FALLBACK_DISPLAY_SECS)
        } else {
            d
        }
    }

    fn random_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let (a, b) = self.delay_range_secs;
        let lo = non_negative(a.min(b)).as_secs_f64();
        let hi = non_negative(a.max(b)).as_secs_f64();
        if lo >= hi {
            Duration::from_secs_f64(lo)
        } else {
            Duration::try_from_secs_f64(rng.gen_range(lo..=hi)).unwrap_or(Duration::ZERO)
        }
    }

    pub fn session_config(&self) -> Result<SessionConfig> {
        SessionConfig::new(
            non_negative(self.guess_time_limit_secs),
            non_negative(self.response_time_limit_secs),
            non_negative(self.feedback_duration_secs),
        )
    }
}

#[derive(Debug, Deserialize)]
struct RawDescription {
    #[serde(default)]
    session: Attributes,
    #[serde(default)]
    trials: Vec<Attributes>,
}

/// Reads a duration attribute in seconds. `None` when absent, `Err` with the
/// offending text when present but unusable.
fn read_secs(attrs: &Attributes, key: &str) -> Option<std::result::Result<Duration, String>> {
    let value = attrs.get(key)?;
    let secs = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Some(match secs {
        Some(s) if s >= 0.0 => Duration::try_from_secs_f64(s).map_err(|_| value.to_string()),
        _ => Err(value.to_string()),
    })
}

fn read_side(attrs: &Attributes) -> Option<std::result::Result<Side, String>> {
    let value = attrs.get("side")?;
    Some(match value {
        Value::String(s) => s.parse::<Side>(),
        other => Err(other.to_string()),
    })
}

/// Ordered trials plus the session rules, ready to hand to a trial runner
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDescription {
    variant: GameVariant,
    config: SessionConfig,
    trials: Vec<TrialConfig>,
}

impl SessionDescription {
    pub fn new(variant: GameVariant, config: SessionConfig, trials: Vec<TrialConfig>) -> Self {
        Self {
            variant,
            config,
            trials,
        }
    }

    /// Random session of `defaults.trials` trials
    pub fn generate<R: Rng + ?Sized>(
        variant: GameVariant,
        defaults: &SessionDefaults,
        rng: &mut R,
    ) -> Result<Self> {
        let config = defaults.session_config()?;
        let trials = (0..defaults.trials)
            .map(|_| TrialConfig {
                delay: defaults.random_delay(rng),
                display_duration: defaults.display_duration(),
                side: variant.uses_sides().then(|| Side::random(rng)),
            })
            .collect();
        debug!(%variant, trials = defaults.trials, "generated session");
        Ok(Self::new(variant, config, trials))
    }

    pub fn load<P: AsRef<Path>, R: Rng + ?Sized>(
        path: P,
        variant: GameVariant,
        defaults: &SessionDefaults,
        rng: &mut R,
    ) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text, variant, defaults, rng)
    }

    pub fn from_json_str<R: Rng + ?Sized>(
        text: &str,
        variant: GameVariant,
        defaults: &SessionDefaults,
        rng: &mut R,
    ) -> Result<Self> {
        let raw: RawDescription = serde_json::from_str(text)?;
        Self::from_attributes(&raw.session, &raw.trials, variant, defaults, rng)
    }

    /// Builds a session from attribute maps. Bad trial attributes are replaced
    /// with generated defaults; session limits that contradict each other are
    /// an error.
    pub fn from_attributes<R: Rng + ?Sized>(
        session: &Attributes,
        trials: &[Attributes],
        variant: GameVariant,
        defaults: &SessionDefaults,
        rng: &mut R,
    ) -> Result<Self> {
        let fallback = defaults.session_config()?;
        let session_secs = |key: &str, default: Duration| match read_secs(session, key) {
            Some(Ok(d)) => d,
            Some(Err(raw)) => {
                warn!(attribute = key, value = %raw, "malformed session attribute, using default");
                default
            }
            None => default,
        };
        let config = SessionConfig::new(
            session_secs("guessTimeLimit", fallback.guess_time_limit()),
            session_secs("responseTimeLimit", fallback.response_time_limit()),
            session_secs("feedbackDuration", fallback.feedback_duration()),
        )?;

        let trials = trials
            .iter()
            .enumerate()
            .map(|(index, attrs)| Self::trial_from_attributes(index, attrs, variant, defaults, rng))
            .collect();

        Ok(Self::new(variant, config, trials))
    }

    fn trial_from_attributes<R: Rng + ?Sized>(
        index: usize,
        attrs: &Attributes,
        variant: GameVariant,
        defaults: &SessionDefaults,
        rng: &mut R,
    ) -> TrialConfig {
        let delay = match read_secs(attrs, "delay") {
            Some(Ok(d)) => d,
            other => {
                if let Some(Err(raw)) = other {
                    warn!(trial = index, attribute = "delay", value = %raw, "malformed trial attribute, generating default");
                }
                defaults.random_delay(rng)
            }
        };

        let display_duration = match read_secs(attrs, "duration") {
            Some(Ok(d)) if !d.is_zero() => d,
            other => {
                if let Some(raw) = other {
                    let raw = raw.map_or_else(|e| e, |d| format!("{}", d.as_secs_f64()));
                    warn!(trial = index, attribute = "duration", value = %raw, "malformed trial attribute, generating default");
                }
                defaults.display_duration()
            }
        };

        let side = if variant.uses_sides() {
            Some(match read_side(attrs) {
                Some(Ok(side)) => side,
                other => {
                    if let Some(Err(raw)) = other {
                        warn!(trial = index, attribute = "side", value = %raw, "malformed trial attribute, generating default");
                    }
                    Side::random(rng)
                }
            })
        } else {
            None
        };

        // display_duration is positive on every path above
        TrialConfig {
            delay,
            display_duration,
            side,
        }
    }

    pub fn variant(&self) -> GameVariant {
        self.variant
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn trials(&self) -> &[TrialConfig] {
        &self.trials
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }
}
