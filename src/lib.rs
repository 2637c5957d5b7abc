// Library surface for the binary, headless integration tests and reuse.
pub mod aggregator;
pub mod app_dirs;
pub mod config;
pub mod error;
pub mod export;
pub mod runner;
pub mod runtime;
pub mod scoring;
pub mod session;
pub mod stats;
pub mod trace_log;
pub mod trial;

pub use error::{ReflexError, Result};
pub use runner::{RunnerEvent, RunnerState, TrialRunner};
pub use scoring::{FeedbackCategory, GameVariant, ScoringStrategy};
pub use session::{SessionConfig, SessionDescription};
pub use trial::{Side, TrialConfig, TrialResult};
