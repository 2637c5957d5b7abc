use crate::error::Result;
use crate::scoring::FeedbackCategory;
use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Append-only, line-per-event record of a session. Nothing reads it back.
pub struct TraceLog {
    out: Box<dyn Write + Send>,
    lines: usize,
}

impl std::fmt::Debug for TraceLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceLog").field("lines", &self.lines).finish()
    }
}

impl TraceLog {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().append(true).create(true).open(path)?;
        Ok(Self::from_writer(BufWriter::new(file)))
    }

    pub fn from_writer<W: Write + Send + 'static>(out: W) -> Self {
        Self {
            out: Box::new(out),
            lines: 0,
        }
    }

    /// Discards everything; used when no trace file was asked for
    pub fn disabled() -> Self {
        Self::from_writer(io::sink())
    }

    pub fn line(&mut self, text: &str) -> Result<()> {
        writeln!(
            self.out,
            "{} {}",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            text
        )?;
        self.lines += 1;
        Ok(())
    }

    /// Logs a scored trial, mirrored to tracing
    pub fn trial(
        &mut self,
        index: usize,
        category: FeedbackCategory,
        response_time_secs: f64,
    ) -> Result<()> {
        let text = category.trace_line(response_time_secs);
        tracing::info!(trial = index, %category, response_time_secs, "{text}");
        self.line(&format!("trial {index}: {text}"))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    pub fn lines_written(&self) -> usize {
        self.lines
    }
}

impl Drop for TraceLog {
    fn drop(&mut self) {
        let _ = self.out.flush();
    }
}
