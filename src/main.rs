use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute,
    style::Print,
    terminal::{
        disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
    tty::IsTty,
};
use rand::{rngs::StdRng, SeedableRng};
use reflex::{
    aggregator::SessionSummary,
    app_dirs::AppDirs,
    config::{Config, ConfigStore, FileConfigStore},
    export::{write_session_log, ExportFormat},
    runner::{RunnerEvent, TrialRunner},
    runtime::{
        drive_session, CrosstermEventSource, FixedTicker, MonotonicClock, Runner, SessionOutcome,
    },
    scoring::{FeedbackCategory, GameVariant},
    session::SessionDescription,
    stats::ResultsDb,
    trace_log::TraceLog,
    trial::Side,
};
use std::{
    error::Error,
    io::{self, stdin, Write},
    path::PathBuf,
    time::Duration,
};
use tracing_subscriber::EnvFilter;

const RECENT_TRIALS: usize = 10;

/// terminal reaction-time games
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Reaction-time games for the terminal. React: press any key as soon as the stimulus appears. Tipping point: press the key on the side the arrow points to."
)]
pub struct Cli {
    /// game to play
    #[clap(short = 'v', long, value_enum)]
    variant: Option<GameVariant>,

    /// number of trials in a generated session
    #[clap(short = 'n', long = "trials")]
    trials: Option<usize>,

    /// play a session described in a JSON file instead of a generated one
    #[clap(short = 's', long)]
    session: Option<PathBuf>,

    /// responses faster than this many seconds count as guesses (0 disables)
    #[clap(long)]
    guess_limit: Option<f64>,

    /// responses slower than this many seconds are too slow (0 uses the display duration)
    #[clap(long)]
    response_limit: Option<f64>,

    /// write the session log here instead of the state directory
    #[clap(short = 'o', long)]
    out: Option<PathBuf>,

    /// session log format
    #[clap(short = 'f', long, value_enum)]
    format: Option<ExportFormat>,

    /// append a line per trial to this trace file
    #[clap(long)]
    trace: Option<PathBuf>,

    /// seed for reproducible generated sessions
    #[clap(long)]
    seed: Option<u64>,

    /// print stored results for the selected game and exit
    #[clap(long)]
    history: bool,

    /// persist the given options as the new defaults
    #[clap(long)]
    save_config: bool,

    /// delete every stored result and exit
    #[clap(long)]
    clear_history: bool,
}

impl Cli {
    /// Flags given on the command line win over the stored config
    fn apply(&self, config: &mut Config) {
        if let Some(variant) = self.variant {
            config.variant = variant;
        }
        if let Some(trials) = self.trials {
            config.session.trials = trials;
        }
        if let Some(guess) = self.guess_limit {
            config.session.guess_time_limit_secs = guess;
        }
        if let Some(response) = self.response_limit {
            config.session.response_time_limit_secs = response;
        }
        if let Some(format) = self.format {
            config.export_format = format;
        }
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let cli = Cli::parse();

    let store = FileConfigStore::new();
    let mut config = store.load();
    cli.apply(&mut config);
    if cli.save_config {
        store.save(&config)?;
        println!("saved defaults to {}", store.path().display());
    }

    if cli.clear_history {
        ResultsDb::open(AppDirs::db_path())?.clear_all()?;
        println!("history cleared");
        return Ok(());
    }

    if cli.history {
        return print_history(config.variant);
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let mut rng = cli.rng();
    let description = match &cli.session {
        Some(path) => SessionDescription::load(path, config.variant, &config.session, &mut rng)?,
        None => SessionDescription::generate(config.variant, &config.session, &mut rng)?,
    };
    if description.is_empty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::InvalidValue, "session has no trials").exit();
    }

    let mut trace = match &cli.trace {
        Some(path) => TraceLog::open(path)?,
        None => TraceLog::disabled(),
    };
    trace.line(&format!(
        "session start: {} with {} trials",
        description.variant(),
        description.len()
    ))?;

    let started_at = chrono::Local::now();
    let mut trial_runner = TrialRunner::for_variant(description);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, Hide)?;

    let played = play(&mut trial_runner, &mut stdout, &mut trace, config.tick_ms);

    disable_raw_mode()?;
    execute!(stdout, Show, LeaveAlternateScreen)?;
    let outcome = played?;

    let summary = trial_runner.aggregator().summary();
    trace.line(&format!(
        "session {}: {}/{} trials",
        match outcome {
            SessionOutcome::Completed => "complete",
            SessionOutcome::Aborted => "aborted",
        },
        summary.completed_trials,
        summary.planned_trials
    ))?;
    trace.flush()?;

    print_summary(&summary);
    if summary.completed_trials == 0 {
        return Ok(());
    }

    let log = trial_runner.into_log(started_at);
    let out = cli.out.clone().unwrap_or_else(|| {
        AppDirs::sessions_dir().join(format!(
            "{}-{}.{}",
            log.variant,
            started_at.format("%Y%m%d-%H%M%S"),
            config.export_format.extension()
        ))
    });
    write_session_log(&log, &out, config.export_format)?;
    println!("session log: {}", out.display());

    if config.keep_history {
        match ResultsDb::open(AppDirs::db_path()).and_then(|mut db| db.record_session(&log)) {
            Ok(rows) => tracing::debug!(rows, "recorded session history"),
            Err(err) => tracing::warn!(%err, "could not record session history"),
        }
    }

    Ok(())
}

/// Runs the session against the terminal. The first drawing or trace error
/// silences further output and is returned when the session ends.
fn play<W: Write>(
    trial_runner: &mut TrialRunner<GameVariant>,
    out: &mut W,
    trace: &mut TraceLog,
    tick_ms: u64,
) -> Result<SessionOutcome, Box<dyn Error>> {
    let variant = trial_runner.variant();
    let planned = trial_runner.aggregator().trials().len();
    let events = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::new(Duration::from_millis(tick_ms.max(1))),
    );
    let clock = MonotonicClock::new();

    let mut failure: Option<Box<dyn Error>> = None;
    let outcome = drive_session(trial_runner, &events, &clock, |event| {
        if failure.is_some() {
            return;
        }
        let drawn = draw(&mut *out, event, variant, planned).map_err(Box::<dyn Error>::from);
        let traced = match event {
            RunnerEvent::TrialResolved {
                trial,
                result,
                category,
            } => trace
                .trial(*trial, *category, result.response_time_secs)
                .map_err(Box::<dyn Error>::from),
            _ => Ok(()),
        };
        if let Err(err) = drawn.and(traced) {
            failure = Some(err);
        }
    });

    match failure {
        Some(err) => Err(err),
        None => Ok(outcome),
    }
}

fn stimulus(variant: GameVariant, side: Option<Side>) -> &'static str {
    match (variant, side) {
        (GameVariant::TippingPoint, Some(Side::Left)) => "<",
        (GameVariant::TippingPoint, Some(Side::Right)) => ">",
        _ => "*",
    }
}

fn draw<W: Write>(
    out: &mut W,
    event: &RunnerEvent,
    variant: GameVariant,
    planned: usize,
) -> io::Result<()> {
    match event {
        RunnerEvent::TrialStarted { trial } => execute!(
            out,
            Clear(ClearType::All),
            MoveTo(0, 0),
            Print(format!("{variant}  trial {}/{planned}  (esc to quit)", trial + 1)),
            MoveTo(0, 2),
            Print("wait for it...")
        ),
        RunnerEvent::StimulusShown { side, .. } => execute!(
            out,
            MoveTo(0, 2),
            Clear(ClearType::CurrentLine),
            Print(stimulus(variant, *side))
        ),
        RunnerEvent::TrialResolved {
            result, category, ..
        } => {
            let detail = if *category == FeedbackCategory::Timeout {
                String::new()
            } else {
                format!("  {:.3}s", result.response_time_secs)
            };
            execute!(
                out,
                MoveTo(0, 2),
                Clear(ClearType::CurrentLine),
                Print(format!("{}{detail}", category.message()))
            )
        }
        RunnerEvent::SessionFinished => {
            execute!(out, MoveTo(0, 4), Print("session finished"))
        }
    }
}

fn print_summary(summary: &SessionSummary) {
    println!(
        "trials: {}/{}  successes: {} ({:.0}%)",
        summary.completed_trials,
        summary.planned_trials,
        summary.successes,
        summary.success_rate()
    );
    if let Some(mean) = summary.mean_response_secs {
        let sd = summary.response_std_dev_secs.unwrap_or(0.0);
        println!("mean response: {mean:.3}s (sd {sd:.3}s)");
    }
    if let Some(accuracy) = summary.mean_accuracy {
        println!("mean accuracy: {:.1}%", accuracy * 100.0);
    }
    for category in FeedbackCategory::ALL {
        let n = summary.count(category);
        if n > 0 {
            println!("  {category}: {n}");
        }
    }
}

fn print_history(variant: GameVariant) -> Result<(), Box<dyn Error>> {
    let db = ResultsDb::open(AppDirs::db_path())?;
    let history = db.summary(variant)?;
    println!(
        "{variant}: {} sessions, {} trials, {} successes ({:.0}%)",
        history.sessions,
        history.trials,
        history.successes,
        history.success_rate()
    );
    if let (Some(mean), Some(best)) = (history.mean_success_secs, history.best_success_secs) {
        println!("mean response: {mean:.3}s  best: {best:.3}s");
    }
    for trial in db.recent_trials(variant, RECENT_TRIALS)? {
        println!(
            "{}  trial {:>2}  {:>8}  {:.3}s",
            trial.session_started.format("%Y-%m-%d %H:%M"),
            trial.trial + 1,
            trial
                .category
                .map(|c| c.to_string())
                .unwrap_or_else(|| "?".to_string()),
            trial.response_secs
        );
    }
    Ok(())
}
