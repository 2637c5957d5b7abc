use crate::session::SessionConfig;
use crate::trial::{Side, TrialConfig, TrialResult};
use serde::{Deserialize, Serialize};

/// Outcome class of a scored trial, relayed to the presenter and the logs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, strum_macros::Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum FeedbackCategory {
    Correct,
    Guess,
    WrongKey,
    TooSlow,
    Timeout,
}

impl FeedbackCategory {
    pub const ALL: [FeedbackCategory; 5] = [
        FeedbackCategory::Correct,
        FeedbackCategory::Guess,
        FeedbackCategory::WrongKey,
        FeedbackCategory::TooSlow,
        FeedbackCategory::Timeout,
    ];

    /// Canned feedback shown to the player
    pub fn message(self) -> &'static str {
        match self {
            FeedbackCategory::Correct => "Correct!",
            FeedbackCategory::Guess => "Too early! Wait for the target.",
            FeedbackCategory::WrongKey => "Wrong key!",
            FeedbackCategory::TooSlow => "Too slow!",
            FeedbackCategory::Timeout => "Missed! No response.",
        }
    }

    /// One line for the trace log
    pub fn trace_line(self, response_time_secs: f64) -> String {
        match self {
            FeedbackCategory::Correct => {
                format!("Success! responseTime = {response_time_secs:.3}")
            }
            FeedbackCategory::Guess => {
                format!("Fail! Guess response! responseTime = {response_time_secs:.3}")
            }
            FeedbackCategory::WrongKey => {
                format!("Fail! Wrong key! responseTime = {response_time_secs:.3}")
            }
            FeedbackCategory::TooSlow => {
                format!("Fail! Too slow! responseTime = {response_time_secs:.3}")
            }
            FeedbackCategory::Timeout => "Fail! No response!".to_string(),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.to_string() == name)
    }
}

/// A player response as seen by scoring: elapsed seconds since stimulus onset
/// (0 for "never answered") and the side the key maps to, if any.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Response {
    pub time_secs: f64,
    pub side: Option<Side>,
}

impl Response {
    pub fn new(time_secs: f64, side: Option<Side>) -> Self {
        Self { time_secs, side }
    }

    pub fn timeout() -> Self {
        Self {
            time_secs: 0.0,
            side: None,
        }
    }
}

/// Closeness-in-time score for a successful response.
///
/// The window is the session response limit when set, else the trial's display
/// duration. A window equal to the guess limit yields 1.0.
pub fn compute_accuracy(config: &TrialConfig, session: &SessionConfig, response_time: f64) -> f64 {
    let guess = session.guess_time_limit().as_secs_f64();
    let window = if session.response_time_limit().is_zero() {
        config.display_duration().as_secs_f64()
    } else {
        session.response_time_limit().as_secs_f64()
    };

    let span = window - guess;
    if span == 0.0 {
        return 1.0;
    }
    1.0 - (response_time - guess) / span
}

/// Scores one trial. First matching rule wins; boundary values fall to the
/// slower branch because every comparison is strict.
pub fn score(
    config: &TrialConfig,
    session: &SessionConfig,
    response_time: f64,
    responding_side: Option<Side>,
) -> (TrialResult, FeedbackCategory) {
    let failed = |category, key_correct| {
        (
            TrialResult {
                response_time_secs: response_time,
                success: false,
                key_correct,
                accuracy: 0.0,
                category,
            },
            category,
        )
    };

    if response_time == 0.0 {
        return failed(FeedbackCategory::Timeout, false);
    }

    let guess_limit = session.guess_time_limit().as_secs_f64();
    if guess_limit > 0.0 && response_time < guess_limit {
        let on_side = matches!(
            (config.side(), responding_side),
            (Some(required), Some(got)) if required == got
        );
        return failed(FeedbackCategory::Guess, on_side);
    }

    let response_limit = session.response_time_limit().as_secs_f64();
    if response_limit <= 0.0 || response_time < response_limit {
        let side_matches = match config.side() {
            None => true,
            Some(required) => responding_side == Some(required),
        };
        if !side_matches {
            return failed(FeedbackCategory::WrongKey, false);
        }
        let category = FeedbackCategory::Correct;
        return (
            TrialResult {
                response_time_secs: response_time,
                success: true,
                key_correct: true,
                accuracy: compute_accuracy(config, session, response_time),
                category,
            },
            category,
        );
    }

    failed(FeedbackCategory::TooSlow, false)
}

/// Variant-specific scoring rule plugged into the trial runner
pub trait ScoringStrategy {
    fn score(
        &self,
        config: &TrialConfig,
        session: &SessionConfig,
        response: &Response,
    ) -> (TrialResult, FeedbackCategory);

    /// Whether trials of this game carry a side
    fn uses_sides(&self) -> bool;
}

/// Base game: any key answers the stimulus.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReactScoring;

impl ScoringStrategy for ReactScoring {
    fn score(
        &self,
        config: &TrialConfig,
        session: &SessionConfig,
        response: &Response,
    ) -> (TrialResult, FeedbackCategory) {
        // no side concept: score against a side-less copy of the trial
        let sideless = TrialConfig {
            side: None,
            ..config.clone()
        };
        score(&sideless, session, response.time_secs, None)
    }

    fn uses_sides(&self) -> bool {
        false
    }
}

/// Side game: the key must match the stimulus side.
#[derive(Clone, Copy, Debug, Default)]
pub struct TippingPointScoring;

impl ScoringStrategy for TippingPointScoring {
    fn score(
        &self,
        config: &TrialConfig,
        session: &SessionConfig,
        response: &Response,
    ) -> (TrialResult, FeedbackCategory) {
        score(config, session, response.time_secs, response.side)
    }

    fn uses_sides(&self) -> bool {
        true
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum GameVariant {
    #[default]
    React,
    TippingPoint,
}

impl ScoringStrategy for GameVariant {
    fn score(
        &self,
        config: &TrialConfig,
        session: &SessionConfig,
        response: &Response,
    ) -> (TrialResult, FeedbackCategory) {
        match self {
            GameVariant::React => ReactScoring.score(config, session, response),
            GameVariant::TippingPoint => TippingPointScoring.score(config, session, response),
        }
    }

    fn uses_sides(&self) -> bool {
        match self {
            GameVariant::React => ReactScoring.uses_sides(),
            GameVariant::TippingPoint => TippingPointScoring.uses_sides(),
        }
    }
}
