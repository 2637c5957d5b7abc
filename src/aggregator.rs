use crate::error::{ReflexError, Result};
use crate::export::{SessionLog, TrialLogEntry};
use crate::scoring::{FeedbackCategory, GameVariant};
use crate::session::SessionConfig;
use crate::trial::{TrialConfig, TrialResult};
use chrono::{DateTime, Local};
use itertools::Itertools;
use std::collections::HashMap;

/// Collects trial configs and their results, in order, for export
#[derive(Debug, Clone, Default)]
pub struct SessionAggregator {
    trials: Vec<TrialConfig>,
    results: Vec<TrialResult>,
}

impl SessionAggregator {
    pub fn new(trials: Vec<TrialConfig>) -> Self {
        let results = Vec::with_capacity(trials.len());
        Self { trials, results }
    }

    pub fn trials(&self) -> &[TrialConfig] {
        &self.trials
    }

    pub fn results(&self) -> &[TrialResult] {
        &self.results
    }

    /// The first trial still waiting for a result
    pub fn next_trial(&self) -> Option<(usize, &TrialConfig)> {
        let idx = self.results.len();
        self.trials.get(idx).map(|t| (idx, t))
    }

    /// Appends the result of the next pending trial and returns its index
    pub fn append(&mut self, result: TrialResult) -> Result<usize> {
        if self.is_complete() {
            return Err(ReflexError::SessionComplete);
        }
        self.results.push(result);
        Ok(self.results.len() - 1)
    }

    pub fn is_complete(&self) -> bool {
        self.results.len() >= self.trials.len()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary::from_results(self.trials.len(), &self.results)
    }

    /// Pairs every resolved trial with its result. Trials never reached (an
    /// aborted session) are left out.
    pub fn into_log(
        self,
        variant: GameVariant,
        session: SessionConfig,
        started_at: DateTime<Local>,
    ) -> SessionLog {
        let entries = self
            .trials
            .into_iter()
            .zip(self.results)
            .enumerate()
            .map(|(trial, (config, result))| TrialLogEntry {
                trial,
                config,
                result,
            })
            .collect();

        SessionLog {
            variant,
            started_at,
            session,
            entries,
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// End-of-session numbers shown to the player
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub planned_trials: usize,
    pub completed_trials: usize,
    pub successes: usize,
    pub by_category: HashMap<FeedbackCategory, usize>,
    pub mean_response_secs: Option<f64>,
    pub response_std_dev_secs: Option<f64>,
    pub mean_accuracy: Option<f64>,
}

impl SessionSummary {
    pub fn from_results(planned_trials: usize, results: &[TrialResult]) -> Self {
        let hits: Vec<&TrialResult> = results.iter().filter(|r| r.success).collect();
        let times: Vec<f64> = hits.iter().map(|r| r.response_time_secs).collect();
        let accuracies: Vec<f64> = hits.iter().map(|r| r.accuracy).collect();

        Self {
            planned_trials,
            completed_trials: results.len(),
            successes: hits.len(),
            by_category: results.iter().map(|r| r.category).counts(),
            mean_response_secs: mean(&times),
            response_std_dev_secs: std_dev(&times),
            mean_accuracy: mean(&accuracies),
        }
    }

    pub fn count(&self, category: FeedbackCategory) -> usize {
        self.by_category.get(&category).copied().unwrap_or(0)
    }

    /// Percentage of completed trials that succeeded
    pub fn success_rate(&self) -> f64 {
        if self.completed_trials == 0 {
            0.0
        } else {
            self.successes as f64 / self.completed_trials as f64 * 100.0
        }
    }
}
