use crate::aggregator::SessionAggregator;
use crate::export::SessionLog;
use crate::scoring::{FeedbackCategory, GameVariant, Response, ScoringStrategy};
use crate::session::{SessionConfig, SessionDescription};
use crate::trial::{Side, TrialConfig, TrialResult};
use chrono::{DateTime, Local};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Delaying,
    AwaitingResponse,
    Resolved,
    SessionFinished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeadlineKind {
    StimulusOnset,
    ResponseTimeout,
    NextTrial,
}

/// A pending transition at a point in session time
#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Duration,
    kind: DeadlineKind,
}

/// What the runner did, in order, for the presenter and the logs
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerEvent {
    TrialStarted {
        trial: usize,
    },
    StimulusShown {
        trial: usize,
        side: Option<Side>,
    },
    TrialResolved {
        trial: usize,
        result: TrialResult,
        category: FeedbackCategory,
    },
    SessionFinished,
}

/// Sequences the trials of one session.
///
/// Time only enters through `advance` and `on_response`, as an offset from the
/// session's start. Each transition happens at its deadline, not at the moment
/// it is observed, so late polling never skews onsets or response times.
#[derive(Debug)]
pub struct TrialRunner<S: ScoringStrategy> {
    variant: GameVariant,
    config: SessionConfig,
    strategy: S,
    aggregator: SessionAggregator,
    state: RunnerState,
    deadline: Option<Deadline>,
    onset: Option<Duration>,
    current: Option<usize>,
}

impl TrialRunner<GameVariant> {
    /// Runner scored by the description's own game variant
    pub fn for_variant(description: SessionDescription) -> Self {
        let variant = description.variant();
        Self::new(description, variant)
    }
}

impl<S: ScoringStrategy> TrialRunner<S> {
    pub fn new(description: SessionDescription, strategy: S) -> Self {
        let variant = description.variant();
        let config = description.config().clone();
        let trials: Vec<TrialConfig> = description.trials().to_vec();
        Self {
            variant,
            config,
            strategy,
            aggregator: SessionAggregator::new(trials),
            state: RunnerState::Idle,
            deadline: None,
            onset: None,
            current: None,
        }
    }

    /// Starts the first trial. Calling it again is a no-op.
    pub fn start(&mut self, now: Duration) -> Vec<RunnerEvent> {
        let mut events = Vec::new();
        if self.state == RunnerState::Idle && self.current.is_none() {
            self.begin_next(now, &mut events);
            self.fire_due(now, &mut events);
        }
        events
    }

    /// Fires every deadline at or before `now`
    pub fn advance(&mut self, now: Duration) -> Vec<RunnerEvent> {
        let mut events = Vec::new();
        self.fire_due(now, &mut events);
        events
    }

    /// Handles a player response arriving at `now`.
    ///
    /// Deadlines due at `now` fire first, so a response landing exactly on the
    /// timeout loses to it. Outside the response window the response is dropped.
    pub fn on_response(&mut self, side: Option<Side>, now: Duration) -> Vec<RunnerEvent> {
        let mut events = Vec::new();
        self.fire_due(now, &mut events);

        match (self.state, self.onset) {
            (RunnerState::AwaitingResponse, Some(onset)) => {
                // cancel the pending timeout
                self.deadline = None;
                // a zero time would read as "no response"
                let elapsed = now.saturating_sub(onset).as_secs_f64().max(f64::EPSILON);
                self.resolve(Response::new(elapsed, side), now, &mut events);
                self.fire_due(now, &mut events);
            }
            (state, _) => {
                debug!(?state, ?side, "response outside the listening window ignored");
            }
        }
        events
    }

    /// Ends the session early. Trials not yet resolved get no result.
    pub fn abort(&mut self) -> Vec<RunnerEvent> {
        if self.state == RunnerState::SessionFinished {
            return Vec::new();
        }
        debug!(
            resolved = self.aggregator.results().len(),
            planned = self.aggregator.trials().len(),
            "session aborted"
        );
        self.finish();
        vec![RunnerEvent::SessionFinished]
    }

    fn fire_due(&mut self, now: Duration, events: &mut Vec<RunnerEvent>) {
        while let Some(deadline) = self.deadline {
            if deadline.at > now {
                break;
            }
            self.deadline = None;
            self.fire(deadline, events);
        }
    }

    fn fire(&mut self, deadline: Deadline, events: &mut Vec<RunnerEvent>) {
        let Some(index) = self.current else {
            return;
        };
        match deadline.kind {
            DeadlineKind::StimulusOnset => {
                let trial = &self.aggregator.trials()[index];
                let side = trial.side();
                self.deadline = Some(Deadline {
                    at: deadline.at.saturating_add(trial.display_duration()),
                    kind: DeadlineKind::ResponseTimeout,
                });
                self.onset = Some(deadline.at);
                self.state = RunnerState::AwaitingResponse;
                debug!(trial = index, ?side, "stimulus shown, listening");
                events.push(RunnerEvent::StimulusShown { trial: index, side });
            }
            DeadlineKind::ResponseTimeout => {
                self.resolve(Response::timeout(), deadline.at, events);
            }
            DeadlineKind::NextTrial => {
                self.begin_next(deadline.at, events);
            }
        }
    }

    fn begin_next(&mut self, at: Duration, events: &mut Vec<RunnerEvent>) {
        self.onset = None;
        match self.aggregator.next_trial() {
            Some((index, trial)) => {
                self.deadline = Some(Deadline {
                    at: at.saturating_add(trial.delay()),
                    kind: DeadlineKind::StimulusOnset,
                });
                self.current = Some(index);
                self.state = RunnerState::Delaying;
                debug!(trial = index, delay = ?trial.delay(), "trial started");
                events.push(RunnerEvent::TrialStarted { trial: index });
            }
            None => {
                self.finish();
                events.push(RunnerEvent::SessionFinished);
            }
        }
    }

    fn resolve(&mut self, response: Response, at: Duration, events: &mut Vec<RunnerEvent>) {
        let Some(index) = self.current else {
            return;
        };
        let (result, category) = self
            .strategy
            .score(&self.aggregator.trials()[index], &self.config, &response);

        if let Err(err) = self.aggregator.append(result.clone()) {
            // only reachable if the runner and aggregator disagree on the trial
            tracing::error!(trial = index, %err, "result dropped");
        }

        self.onset = None;
        self.state = RunnerState::Resolved;
        self.deadline = Some(Deadline {
            at: at.saturating_add(self.config.feedback_duration()),
            kind: DeadlineKind::NextTrial,
        });
        events.push(RunnerEvent::TrialResolved {
            trial: index,
            result,
            category,
        });
    }

    fn finish(&mut self) {
        self.state = RunnerState::SessionFinished;
        self.deadline = None;
        self.onset = None;
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state == RunnerState::SessionFinished
    }

    /// True only while a response would be scored
    pub fn is_listening(&self) -> bool {
        self.state == RunnerState::AwaitingResponse
    }

    /// Session time of the next pending transition
    pub fn next_deadline(&self) -> Option<Duration> {
        self.deadline.map(|d| d.at)
    }

    pub fn current_trial(&self) -> Option<(usize, &TrialConfig)> {
        let index = self.current?;
        self.aggregator.trials().get(index).map(|t| (index, t))
    }

    pub fn variant(&self) -> GameVariant {
        self.variant
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn aggregator(&self) -> &SessionAggregator {
        &self.aggregator
    }

    pub fn into_aggregator(self) -> SessionAggregator {
        self.aggregator
    }

    pub fn into_log(self, started_at: DateTime<Local>) -> SessionLog {
        self.aggregator.into_log(self.variant, self.config, started_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::{ReactScoring, TippingPointScoring};
    use assert_matches::assert_matches;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn trial(delay: u64, display: u64, side: Option<Side>) -> TrialConfig {
        TrialConfig::new(ms(delay), ms(display), side).unwrap()
    }

    fn description(
        variant: GameVariant,
        guess: u64,
        feedback: u64,
        trials: Vec<TrialConfig>,
    ) -> SessionDescription {
        let config = SessionConfig::new(ms(guess), Duration::ZERO, ms(feedback)).unwrap();
        SessionDescription::new(variant, config, trials)
    }

    fn resolved(events: &[RunnerEvent]) -> Vec<FeedbackCategory> {
        events
            .iter()
            .filter_map(|e| match e {
                RunnerEvent::TrialResolved { category, .. } => Some(*category),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn huge_durations_saturate_instead_of_overflowing() {
        let desc = description(
            GameVariant::React,
            0,
            0,
            vec![TrialConfig::new(Duration::MAX, Duration::MAX, None).unwrap()],
        );
        let mut runner = TrialRunner::new(desc, ReactScoring);
        runner.start(ms(1000));
        assert_eq!(runner.next_deadline(), Some(Duration::MAX));

        // onset lands at Duration::MAX; the timeout saturates there as well
        let events = runner.advance(Duration::MAX);
        assert_matches!(
            events.as_slice(),
            [
                RunnerEvent::StimulusShown { trial: 0, .. },
                RunnerEvent::TrialResolved { trial: 0, .. },
                RunnerEvent::SessionFinished
            ]
        );
        assert!(runner.is_finished());
    }

    #[test]
    fn walks_states_for_a_single_trial() {
        let desc = description(GameVariant::React, 0, 500, vec![trial(1000, 2000, None)]);
        let mut runner = TrialRunner::new(desc, ReactScoring);
        assert_eq!(runner.state(), RunnerState::Idle);

        let events = runner.start(ms(0));
        assert_eq!(events, vec![RunnerEvent::TrialStarted { trial: 0 }]);
        assert_eq!(runner.state(), RunnerState::Delaying);
        assert_eq!(runner.next_deadline(), Some(ms(1000)));

        assert!(runner.advance(ms(999)).is_empty());
        let events = runner.advance(ms(1000));
        assert_eq!(
            events,
            vec![RunnerEvent::StimulusShown {
                trial: 0,
                side: None
            }]
        );
        assert!(runner.is_listening());

        let events = runner.on_response(None, ms(1400));
        assert_eq!(resolved(&events), vec![FeedbackCategory::Correct]);
        assert_eq!(runner.state(), RunnerState::Resolved);
        match &events[0] {
            RunnerEvent::TrialResolved { result, .. } => {
                assert!((result.response_time_secs - 0.4).abs() < 1e-9);
            }
            other => panic!("unexpected event {other:?}"),
        }

        // feedback holds until 1900ms, then the session ends
        assert!(runner.advance(ms(1899)).is_empty());
        assert_eq!(runner.advance(ms(1900)), vec![RunnerEvent::SessionFinished]);
        assert!(runner.is_finished());
        assert_eq!(runner.aggregator().results().len(), 1);
    }

    #[test]
    fn timeout_produces_zero_response_time() {
        let desc = description(GameVariant::React, 0, 0, vec![trial(100, 300, None)]);
        let mut runner = TrialRunner::new(desc, ReactScoring);
        runner.start(ms(0));

        let events = runner.advance(ms(10_000));
        assert_eq!(resolved(&events), vec![FeedbackCategory::Timeout]);
        assert_matches!(events.last(), Some(RunnerEvent::SessionFinished));
        let result = &runner.aggregator().results()[0];
        assert_eq!(result.response_time_secs, 0.0);
        assert!(!result.success);
    }

    #[test]
    fn response_before_stimulus_is_ignored() {
        let desc = description(GameVariant::React, 0, 0, vec![trial(1000, 1000, None)]);
        let mut runner = TrialRunner::new(desc, ReactScoring);
        runner.start(ms(0));

        assert!(runner.on_response(None, ms(500)).is_empty());
        assert_eq!(runner.state(), RunnerState::Delaying);
        assert!(runner.aggregator().results().is_empty());
    }

    #[test]
    fn only_first_response_counts() {
        let desc = description(
            GameVariant::React,
            0,
            1000,
            vec![trial(0, 1000, None), trial(0, 1000, None)],
        );
        let mut runner = TrialRunner::new(desc, ReactScoring);
        runner.start(ms(0));

        let first = runner.on_response(None, ms(200));
        assert_eq!(resolved(&first), vec![FeedbackCategory::Correct]);
        // still in feedback; second press is dropped
        let second = runner.on_response(None, ms(300));
        assert!(second.is_empty());
        assert_eq!(runner.aggregator().results().len(), 1);
    }

    #[test]
    fn response_at_timeout_instant_is_timeout() {
        let desc = description(GameVariant::React, 0, 0, vec![trial(0, 500, None)]);
        let mut runner = TrialRunner::new(desc, ReactScoring);
        runner.start(ms(0));
        assert!(runner.is_listening());

        let events = runner.on_response(None, ms(500));
        assert_eq!(resolved(&events), vec![FeedbackCategory::Timeout]);
        assert_eq!(runner.aggregator().results().len(), 1);
    }

    #[test]
    fn zero_delay_shows_stimulus_on_start() {
        let desc = description(GameVariant::React, 0, 0, vec![trial(0, 500, None)]);
        let mut runner = TrialRunner::new(desc, ReactScoring);
        let events = runner.start(ms(0));
        assert_eq!(events.len(), 2);
        assert_matches!(events[1], RunnerEvent::StimulusShown { trial: 0, .. });
    }

    #[test]
    fn late_advance_crosses_several_trials() {
        let trials = vec![trial(100, 200, None); 3];
        let desc = description(GameVariant::React, 0, 50, trials);
        let mut runner = TrialRunner::new(desc, ReactScoring);
        runner.start(ms(0));

        let events = runner.advance(ms(60_000));
        assert_eq!(resolved(&events).len(), 3);
        assert!(runner.is_finished());
    }

    #[test]
    fn onset_uses_deadline_not_observation_time() {
        let desc = description(GameVariant::React, 0, 0, vec![trial(1000, 5000, None)]);
        let mut runner = TrialRunner::new(desc, ReactScoring);
        runner.start(ms(0));

        // nobody polled between 0 and 1300
        let events = runner.on_response(None, ms(1300));
        match events.last() {
            Some(RunnerEvent::SessionFinished) => {}
            other => panic!("expected session end, got {other:?}"),
        }
        let rt = runner.aggregator().results()[0].response_time_secs;
        assert!((rt - 0.3).abs() < 1e-9);
    }

    #[test]
    fn tipping_point_scores_sides() {
        let trials = vec![
            trial(0, 1000, Some(Side::Left)),
            trial(0, 1000, Some(Side::Right)),
        ];
        let desc = description(GameVariant::TippingPoint, 0, 0, trials);
        let mut runner = TrialRunner::new(desc, TippingPointScoring);
        runner.start(ms(0));

        let a = runner.on_response(Some(Side::Left), ms(300));
        let b = runner.on_response(Some(Side::Left), ms(700));
        assert_eq!(resolved(&a), vec![FeedbackCategory::Correct]);
        assert_eq!(resolved(&b), vec![FeedbackCategory::WrongKey]);
        assert!(runner.is_finished());
    }

    #[test]
    fn guesses_are_scored_but_never_succeed() {
        let desc = description(GameVariant::React, 200, 0, vec![trial(0, 1000, None)]);
        let mut runner = TrialRunner::for_variant(desc);
        runner.start(ms(0));
        let events = runner.on_response(None, ms(50));
        assert_eq!(resolved(&events), vec![FeedbackCategory::Guess]);
        assert!(!runner.aggregator().results()[0].success);
    }

    #[test]
    fn empty_session_finishes_on_start() {
        let desc = description(GameVariant::React, 0, 0, vec![]);
        let mut runner = TrialRunner::for_variant(desc);
        assert_eq!(runner.start(ms(0)), vec![RunnerEvent::SessionFinished]);
        assert!(runner.is_finished());
        assert!(runner.start(ms(5)).is_empty());
    }

    #[test]
    fn abort_keeps_resolved_results() {
        let desc = description(GameVariant::React, 0, 0, vec![trial(0, 1000, None); 3]);
        let mut runner = TrialRunner::for_variant(desc);
        runner.start(ms(0));
        runner.on_response(None, ms(250));

        assert_eq!(runner.abort(), vec![RunnerEvent::SessionFinished]);
        assert!(runner.abort().is_empty());
        assert!(runner.on_response(None, ms(300)).is_empty());

        let log = runner.into_log(Local::now());
        assert_eq!(log.entries.len(), 1);
    }

    #[test]
    fn one_result_per_trial_in_order() {
        let trials: Vec<TrialConfig> = (0..6).map(|i| trial(100 * i, 400, None)).collect();
        let desc = description(GameVariant::React, 0, 100, trials.clone());
        let mut runner = TrialRunner::for_variant(desc);
        let mut now = ms(0);
        runner.start(now);

        // answer the even trials, let the odd ones time out
        while !runner.is_finished() {
            now += ms(10);
            let answer = runner.current_trial().is_some_and(|(i, _)| i % 2 == 0);
            if answer && runner.is_listening() {
                runner.on_response(None, now);
            } else {
                runner.advance(now);
            }
        }

        let agg = runner.into_aggregator();
        assert_eq!(agg.results().len(), trials.len());
        assert_eq!(agg.trials(), trials.as_slice());
        for (i, result) in agg.results().iter().enumerate() {
            let expected = if i % 2 == 0 {
                FeedbackCategory::Correct
            } else {
                FeedbackCategory::Timeout
            };
            assert_eq!(result.category, expected, "trial {i}");
        }
    }
}
