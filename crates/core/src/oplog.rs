//! Append-only record of every merge-oracle invocation.
//!
//! The log is handed to [`crate::git::GitRunner`] at construction time. The
//! file-backed implementation is opened when a run starts and flushed and
//! closed when it ends; entries are never rewritten.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

/// How an invocation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "code", rename_all = "snake_case")]
pub enum ExitStatus {
    Exited(i32),
    /// Terminated by a signal (no exit code).
    Signalled,
    TimedOut,
    /// The process could not be started at all.
    SpawnFailed,
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }
}

impl std::fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exit {}", code),
            Self::Signalled => write!(f, "killed by signal"),
            Self::TimedOut => write!(f, "timed out"),
            Self::SpawnFailed => write!(f, "spawn failed"),
        }
    }
}

/// One recorded invocation.
#[derive(Debug, Clone, Serialize)]
pub struct OperationRecord {
    pub timestamp: DateTime<Utc>,
    pub workdir: PathBuf,
    pub command: String,
    pub status: ExitStatus,
    pub elapsed: Duration,
    pub stdout: String,
    pub stderr: String,
}

/// Sink for [`OperationRecord`]s.
///
/// Implementations must be safe to share between parallel trial workers.
pub trait OperationLog: Send + Sync {
    fn record(&self, entry: &OperationRecord);

    /// Flush buffered entries. Called once when the run ends.
    fn close(&self) {}
}

/// Keeps records in memory; used by tests and by callers that want to
/// inspect what the oracle did.
#[derive(Debug, Default)]
pub struct MemoryOperationLog {
    entries: Mutex<Vec<OperationRecord>>,
}

impl MemoryOperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<OperationRecord> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// The literal commands recorded so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.command).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OperationLog for MemoryOperationLog {
    fn record(&self, entry: &OperationRecord) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry.clone());
        }
    }
}

/// Plain-text log file opened in append mode.
pub struct FileOperationLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl FileOperationLog {
    /// Open (creating if needed) the log at `path` for appending.
    pub fn open<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OperationLog for FileOperationLog {
    fn record(&self, entry: &OperationRecord) {
        let Ok(mut writer) = self.writer.lock() else {
            return;
        };
        if let Err(e) = write_record(&mut *writer, entry) {
            warn!(path = %self.path.display(), error = %e, "failed to write operation log entry");
        }
    }

    fn close(&self) {
        if let Ok(mut writer) = self.writer.lock() {
            if let Err(e) = writer.flush() {
                warn!(path = %self.path.display(), error = %e, "failed to flush operation log");
            }
        }
    }
}

impl Drop for FileOperationLog {
    fn drop(&mut self) {
        self.close();
    }
}

fn write_record<W: Write>(out: &mut W, entry: &OperationRecord) -> std::io::Result<()> {
    writeln!(
        out,
        "[{}] ({}) $ {}",
        entry.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        entry.workdir.display(),
        entry.command
    )?;
    writeln!(
        out,
        "status: {} ({} ms)",
        entry.status,
        entry.elapsed.as_millis()
    )?;
    write_stream(out, "stdout", &entry.stdout)?;
    write_stream(out, "stderr", &entry.stderr)?;
    writeln!(out)?;
    Ok(())
}

fn write_stream<W: Write>(out: &mut W, name: &str, text: &str) -> std::io::Result<()> {
    if text.trim().is_empty() {
        return Ok(());
    }
    writeln!(out, "{}:", name)?;
    for line in text.lines() {
        writeln!(out, "  {}", line)?;
    }
    Ok(())
}
