use directories::ProjectDirs;
use std::path::PathBuf;

const APP: &str = "reflex";

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    fn project() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", APP)
    }

    /// State lives under $HOME/.local/state/reflex when HOME is set
    fn state_dir() -> PathBuf {
        if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home).join(".local").join("state").join(APP)
        } else if let Some(pd) = Self::project() {
            pd.data_local_dir().to_path_buf()
        } else {
            PathBuf::from(".")
        }
    }

    pub fn config_path() -> PathBuf {
        Self::project()
            .map(|pd| pd.config_dir().join("config.json"))
            .unwrap_or_else(|| PathBuf::from("reflex_config.json"))
    }

    pub fn db_path() -> PathBuf {
        Self::state_dir().join("history.db")
    }

    pub fn trace_path() -> PathBuf {
        Self::state_dir().join("trace.log")
    }

    /// Where session logs go when no explicit output path is given
    pub fn sessions_dir() -> PathBuf {
        Self::state_dir().join("sessions")
    }
}
