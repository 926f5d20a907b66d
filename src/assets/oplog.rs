/// Append-only trail of create/delete attempts in the managed directories
///
/// Each line is `<timestamp>\t<OP>\t<outcome>\t<path>[\t<reason>]`. The log
/// exists for diagnosing filesystem races after the fact, so writing to it
/// never fails from the caller's point of view.
use chrono::{SecondsFormat, Utc};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// What was attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Copy,
    DeleteCopy,
    Thumbnail,
    DeleteThumbnail,
    Reconcile,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Operation::Copy => "COPY",
            Operation::DeleteCopy => "DELETE_COPY",
            Operation::Thumbnail => "THUMBNAIL",
            Operation::DeleteThumbnail => "DELETE_THUMBNAIL",
            Operation::Reconcile => "RECONCILE",
        };
        f.write_str(label)
    }
}

/// How it went
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    /// Nothing to do, e.g. the target already existed
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct OperationLog {
    path: Option<PathBuf>,
}

impl OperationLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        OperationLog {
            path: Some(path.into()),
        }
    }

    /// A log that only forwards to tracing
    pub fn disabled() -> Self {
        OperationLog { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn record(&self, operation: Operation, target: &Path, outcome: &Outcome) {
        let line = format_line(operation, target, outcome);
        tracing::debug!(target: "oplog", "{}", line.trim_end());

        let Some(path) = &self.path else {
            return;
        };

        // One write per line keeps concurrent appends from interleaving
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(line.as_bytes()));

        if let Err(e) = written {
            tracing::warn!("could not append to {}: {}", path.display(), e);
        }
    }

    pub fn ok(&self, operation: Operation, target: &Path) {
        self.record(operation, target, &Outcome::Ok);
    }

    pub fn skipped(&self, operation: Operation, target: &Path, reason: impl Into<String>) {
        self.record(operation, target, &Outcome::Skipped(reason.into()));
    }

    pub fn failed(&self, operation: Operation, target: &Path, reason: impl Into<String>) {
        self.record(operation, target, &Outcome::Failed(reason.into()));
    }
}

fn format_line(operation: Operation, target: &Path, outcome: &Outcome) -> String {
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let (status, reason) = match outcome {
        Outcome::Ok => ("ok", None),
        Outcome::Skipped(reason) => ("skipped", Some(reason)),
        Outcome::Failed(reason) => ("failed", Some(reason)),
    };

    let mut line = format!(
        "{}\t{}\t{}\t{}",
        timestamp,
        operation,
        status,
        target.display()
    );
    if let Some(reason) = reason {
        // Reasons come from io/image errors and may span lines
        line.push('\t');
        line.push_str(&reason.replace(['\n', '\r'], " "));
    }
    line.push('\n');
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn appends_one_line_per_record() {
        let temp = tempfile::tempdir().unwrap();
        let log = OperationLog::new(temp.path().join("deletion.log"));

        log.ok(Operation::Copy, Path::new("/copies/copy_a.png"));
        log.failed(Operation::DeleteCopy, Path::new("/copies/copy_b.png"), "denied:\nlocked");

        let contents = fs::read_to_string(temp.path().join("deletion.log")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: Vec<&str> = lines[0].split('\t').collect();
        assert_eq!(&first[1..], &["COPY", "ok", "/copies/copy_a.png"]);

        let second: Vec<&str> = lines[1].split('\t').collect();
        assert_eq!(second[1], "DELETE_COPY");
        assert_eq!(second[2], "failed");
        assert_eq!(second[4], "denied: locked");
    }

    #[test]
    fn unwritable_log_is_swallowed() {
        let temp = tempfile::tempdir().unwrap();
        // A directory cannot be opened for appending
        let log = OperationLog::new(temp.path());
        log.ok(Operation::Thumbnail, Path::new("/thumbs/t.jpg"));
    }

    #[test]
    fn disabled_log_has_no_path() {
        let log = OperationLog::disabled();
        assert!(log.path().is_none());
        log.skipped(Operation::Reconcile, Path::new("/x"), "kept");
    }
}
