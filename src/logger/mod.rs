//! Per-process run log: append-only, line-oriented, severity-tagged.
//!
//! One log file per invocation, named with the process start timestamp
//! (`recording_log_<YYMMDD_HHMMSS>.log`). Each line is
//! `<RFC3339 ts> - <SEVERITY> - <message>`. When `--print-logs` is set every
//! line is mirrored to stdout. Logging failures degrade to stderr; the
//! recorder must never abort a capture because a log line could not be
//! written.

#![allow(missing_docs)]

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use colored::Colorize;

/// Severity level for run-log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
}

impl Severity {
    const fn label(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
        }
    }
}

/// Append-only run log with optional console mirror.
pub struct RunLog {
    writer: Option<BufWriter<File>>,
    path: PathBuf,
    echo: bool,
}

impl RunLog {
    /// Open the run log under `log_dir`, named with `start_label`
    /// (the `YYMMDD_HHMMSS` process start timestamp).
    ///
    /// Falls back to stderr-only operation when the file cannot be created.
    pub fn open(log_dir: &Path, start_label: &str, echo: bool) -> Self {
        let path = log_dir.join(format!("recording_log_{start_label}.log"));
        let writer = match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => Some(BufWriter::new(file)),
            Err(e) => {
                eprintln!(
                    "[CSR-LOG] could not open {}: {e}; logging to stderr only",
                    path.display()
                );
                None
            }
        };
        Self { writer, path, echo }
    }

    /// Current timestamp label used for log and session directory names.
    #[must_use]
    pub fn timestamp_label() -> String {
        chrono::Local::now().format("%y%m%d_%H%M%S").to_string()
    }

    pub fn info(&mut self, message: &str) {
        self.write_line(Severity::Info, message);
    }

    pub fn warn(&mut self, message: &str) {
        self.write_line(Severity::Warning, message);
    }

    /// Path of the log file (even if it failed to open).
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flush(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
        }
    }

    fn write_line(&mut self, severity: Severity, message: &str) {
        let ts = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let line = format!("{ts} - {} - {message}\n", severity.label());

        match self.writer.as_mut() {
            Some(w) => {
                if w.write_all(line.as_bytes()).is_err() {
                    // Drop the file writer; keep the run alive on stderr.
                    self.writer = None;
                    let _ = write!(io::stderr(), "[CSR-LOG] {line}");
                }
            }
            None => {
                let _ = write!(io::stderr(), "[CSR-LOG] {line}");
            }
        }

        if self.echo {
            match severity {
                Severity::Info => println!("{message}"),
                Severity::Warning => println!("{}", message.yellow()),
            }
        }
    }
}

impl Drop for RunLog {
    fn drop(&mut self) {
        self.flush();
    }
}
