use crate::error::Result;
use crate::scoring::GameVariant;
use crate::session::SessionConfig;
use crate::trial::{TrialConfig, TrialResult};
use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// One trial row of the session log: config fields, then result fields
#[derive(Debug, Clone, Serialize)]
pub struct TrialLogEntry {
    pub trial: usize,
    #[serde(flatten)]
    pub config: TrialConfig,
    #[serde(flatten)]
    pub result: TrialResult,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLog {
    pub variant: GameVariant,
    pub started_at: DateTime<Local>,
    pub session: SessionConfig,
    #[serde(rename = "trials")]
    pub entries: Vec<TrialLogEntry>,
}

/// Flattens any serializable record into ordered attribute pairs.
///
/// Field order follows declaration order. `None` becomes an empty string.
pub fn to_attributes<T: Serialize>(record: &T) -> Result<Vec<(String, String)>> {
    let Value::Object(map) = serde_json::to_value(record)? else {
        return Err(<serde_json::Error as serde::ser::Error>::custom(
            "attribute export needs a struct or map",
        )
        .into());
    };

    Ok(map
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                Value::Null => String::new(),
                Value::String(s) => s,
                other => other.to_string(),
            };
            (key, text)
        })
        .collect())
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize, Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn exporter(self) -> Box<dyn SessionExporter> {
        match self {
            ExportFormat::Json => Box::new(JsonExporter),
            ExportFormat::Csv => Box::new(CsvExporter),
        }
    }
}

/// Writes a finished session log in some concrete format
pub trait SessionExporter {
    fn export(&self, log: &SessionLog, out: &mut dyn Write) -> Result<()>;
}

/// Pretty JSON document with the session header and one object per trial
pub struct JsonExporter;

impl SessionExporter for JsonExporter {
    fn export(&self, log: &SessionLog, out: &mut dyn Write) -> Result<()> {
        serde_json::to_writer_pretty(&mut *out, log)?;
        writeln!(out)?;
        Ok(())
    }
}

/// Header row of attribute names, then one row per trial
pub struct CsvExporter;

impl SessionExporter for CsvExporter {
    fn export(&self, log: &SessionLog, out: &mut dyn Write) -> Result<()> {
        let mut writer = csv::Writer::from_writer(out);
        for (i, entry) in log.entries.iter().enumerate() {
            let attrs = to_attributes(entry)?;
            if i == 0 {
                writer.write_record(attrs.iter().map(|(k, _)| k.as_str()))?;
            }
            writer.write_record(attrs.iter().map(|(_, v)| v.as_str()))?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Exports to a file, creating parent directories as needed
pub fn write_session_log<P: AsRef<Path>>(
    log: &SessionLog,
    path: P,
    format: ExportFormat,
) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut out = BufWriter::new(File::create(path)?);
    format.exporter().export(log, &mut out)?;
    out.flush()?;
    tracing::info!(path = %path.display(), trials = log.entries.len(), "session log written");
    Ok(())
}
