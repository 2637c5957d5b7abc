use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossterm::event::{self, Event as CtEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::runner::{RunnerEvent, TrialRunner};
use crate::scoring::ScoringStrategy;
use crate::trial::Side;

/// A response key press; `side` is `None` for keys without a side
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResponseKey {
    pub side: Option<Side>,
}

/// Unified event type consumed by the session driver
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GameEvent {
    Response(ResponseKey),
    Quit,
    Tick,
}

impl GameEvent {
    pub fn response(side: Option<Side>) -> Self {
        GameEvent::Response(ResponseKey { side })
    }

    /// Maps a terminal key press to a game event. Arrow keys and the
    /// home-row pairs (a/d, f/j) carry a side; Esc, q and Ctrl-C quit; any
    /// other key is a side-less response.
    pub fn from_key(key: KeyEvent) -> Option<Self> {
        if key.kind != KeyEventKind::Press {
            return None;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Some(GameEvent::Quit);
        }
        Some(match key.code {
            KeyCode::Esc | KeyCode::Char('q') => GameEvent::Quit,
            KeyCode::Left | KeyCode::Char('a') | KeyCode::Char('f') => {
                GameEvent::response(Some(Side::Left))
            }
            KeyCode::Right | KeyCode::Char('d') | KeyCode::Char('j') => {
                GameEvent::response(Some(Side::Right))
            }
            _ => GameEvent::response(None),
        })
    }
}

/// Source of player input events
pub trait GameEventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> Result<GameEvent, RecvTimeoutError>;
}

/// Production event source reading the terminal on a helper thread
pub struct CrosstermEventSource {
    rx: Receiver<GameEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || loop {
            match event::read() {
                Ok(CtEvent::Key(key)) => {
                    if let Some(ev) = GameEvent::from_key(key) {
                        if tx.send(ev).is_err() {
                            break;
                        }
                    }
                }
                Ok(_) => {}
                Err(_) => break,
            }
        });

        Self { rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl GameEventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<GameEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Channel-fed event source for tests and scripted play
pub struct TestEventSource {
    rx: Receiver<GameEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<GameEvent>) -> Self {
        Self { rx }
    }
}

impl GameEventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<GameEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Pulls one event at a time, yielding Tick when the interval passes quietly
pub struct Runner<E: GameEventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: GameEventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    pub fn step(&self) -> GameEvent {
        match self.event_source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => GameEvent::Tick,
        }
    }
}

/// Session time source: elapsed time since the clock was created
pub trait Clock {
    fn now(&self) -> Duration;
}

#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Clock moved by hand; clones share the same time
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }

    pub fn set(&self, to: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now = to;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.lock().map(|now| *now).unwrap_or_default()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    Aborted,
}

/// Runs a session to the end: waits on the event channel for at most one
/// tick, feeds responses to the runner, and advances it with the clock.
pub fn drive_session<S, E, T, C, F>(
    trial_runner: &mut TrialRunner<S>,
    events: &Runner<E, T>,
    clock: &C,
    mut on_event: F,
) -> SessionOutcome
where
    S: ScoringStrategy,
    E: GameEventSource,
    T: Ticker,
    C: Clock,
    F: FnMut(&RunnerEvent),
{
    let mut emit = |batch: Vec<RunnerEvent>| batch.iter().for_each(&mut on_event);

    emit(trial_runner.start(clock.now()));
    while !trial_runner.is_finished() {
        match events.step() {
            GameEvent::Response(key) => emit(trial_runner.on_response(key.side, clock.now())),
            GameEvent::Quit => {
                emit(trial_runner.abort());
                return SessionOutcome::Aborted;
            }
            GameEvent::Tick => {}
        }
        emit(trial_runner.advance(clock.now()));
    }
    SessionOutcome::Completed
}
