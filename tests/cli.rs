use assert_cmd::Command;

fn reflex(home: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("reflex").unwrap();
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn history_on_fresh_home_reports_nothing() {
    let home = tempfile::tempdir().unwrap();
    let output = reflex(home.path())
        .args(["--history", "--variant", "react"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("react: 0 sessions, 0 trials"), "{stdout}");
}

#[test]
fn save_config_persists_flags() {
    let home = tempfile::tempdir().unwrap();
    reflex(home.path())
        .args(["--save-config", "--history", "-n", "7", "--format", "csv"])
        .assert()
        .success();

    let path = home.path().join(".config").join("reflex").join("config.json");
    let text = std::fs::read_to_string(&path).unwrap();
    let saved: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(saved["session"]["trials"], 7);
    assert_eq!(saved["export_format"], "csv");
}

#[test]
fn bad_variant_is_a_usage_error() {
    let home = tempfile::tempdir().unwrap();
    reflex(home.path())
        .args(["--variant", "simon"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn session_without_tty_is_refused() {
    let home = tempfile::tempdir().unwrap();
    reflex(home.path()).write_stdin("").assert().failure();
}

#[test]
fn clear_history_empties_stored_results() {
    use reflex::aggregator::SessionAggregator;
    use reflex::scoring::{FeedbackCategory, GameVariant};
    use reflex::session::SessionConfig;
    use reflex::stats::ResultsDb;
    use reflex::trial::{TrialConfig, TrialResult};
    use std::time::Duration;

    let home = tempfile::tempdir().unwrap();
    let db_path = home
        .path()
        .join(".local")
        .join("state")
        .join("reflex")
        .join("history.db");
    {
        let trial = TrialConfig::new(Duration::from_secs(1), Duration::from_secs(2), None).unwrap();
        let mut agg = SessionAggregator::new(vec![trial]);
        agg.append(TrialResult {
            response_time_secs: 0.3,
            success: true,
            key_correct: true,
            accuracy: 0.8,
            category: FeedbackCategory::Correct,
        })
        .unwrap();
        let log = agg.into_log(GameVariant::React, SessionConfig::default(), chrono::Local::now());
        ResultsDb::open(&db_path).unwrap().record_session(&log).unwrap();
    }

    let before = reflex(home.path()).args(["--history"]).output().unwrap();
    assert!(String::from_utf8_lossy(&before.stdout).starts_with("react: 1 sessions, 1 trials"));

    reflex(home.path()).arg("--clear-history").assert().success();

    let after = reflex(home.path()).args(["--history"]).output().unwrap();
    assert!(String::from_utf8_lossy(&after.stdout).starts_with("react: 0 sessions, 0 trials"));
    assert_eq!(
        ResultsDb::open(&db_path).unwrap().summary(GameVariant::React).unwrap().trials,
        0
    );
}
