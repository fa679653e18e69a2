//! Session bookkeeping: which inputs ran, which succeeded, which failed and why.
//!
//! Each run gets a unique session id that namespaces every output directory and
//! status file, so concurrent or repeated runs never collide.

use crate::types::{FailureKind, PipelineResult};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One failed input with its captured reason
#[derive(Debug, Clone, Serialize)]
pub struct FailedItem {
    pub path: PathBuf,
    pub kind: FailureKind,
    pub message: String,
}

/// Aggregate outcome of a finalized session
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: String,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<FailedItem>,
}

/// Tracks per-item outcomes for a single run.
///
/// Successes are appended to an on-disk log immediately, one path per line, so
/// a run interrupted after N successes leaves exactly N entries visible.
/// Failures accumulate in memory and are flushed once at `finalize`.
pub struct SessionLedger {
    session_id: String,
    status_dir: PathBuf,
    success_count: usize,
    failures: Vec<FailedItem>,
}

impl SessionLedger {
    /// Start a new session under the given status directory
    pub fn begin<P: AsRef<Path>>(status_dir: P) -> PipelineResult<Self> {
        let status_dir = status_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&status_dir)?;

        let session_id = Uuid::new_v4().to_string();
        log::info!("Current session id: {}", session_id);

        Ok(Self {
            session_id,
            status_dir,
            success_count: 0,
            failures: Vec::new(),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Path of the append-only success log
    pub fn success_log_path(&self) -> PathBuf {
        self.status_dir
            .join(format!("successes_{}.status.txt", self.session_id))
    }

    /// Path of the error list written at finalize
    pub fn error_list_path(&self) -> PathBuf {
        self.status_dir
            .join(format!("error_paths_{}.json", self.session_id))
    }

    /// Durably append a completed input to the success log.
    ///
    /// The file is opened in append mode on every call; no handle is held
    /// between items.
    pub fn record_success(&mut self, path: &Path) -> PipelineResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.success_log_path())?;
        writeln!(file, "{}", path.display())?;
        self.success_count += 1;
        Ok(())
    }

    /// Record a failed input; kept in memory until `finalize`
    pub fn record_failure(&mut self, path: &Path, kind: FailureKind, message: String) {
        log::error!("Error ({}) for {}: {}", kind, path.display(), message);
        self.failures.push(FailedItem {
            path: path.to_path_buf(),
            kind,
            message,
        });
    }

    /// Flush the error list and report aggregate counts.
    ///
    /// Unlike per-item errors, a failure here propagates: the run's
    /// bookkeeping is unrecoverable at this point.
    pub fn finalize(self) -> PipelineResult<SessionReport> {
        let error_paths: Vec<String> = self
            .failures
            .iter()
            .map(|f| f.path.display().to_string())
            .collect();
        std::fs::write(self.error_list_path(), serde_json::to_string(&error_paths)?)?;

        log::info!(
            "Successfully finished {} inputs with {} errors",
            self.success_count,
            self.failures.len()
        );
        log::info!("Session ID: {}", self.session_id);

        Ok(SessionReport {
            session_id: self.session_id,
            succeeded: self.success_count,
            failed: self.failures.len(),
            failures: self.failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_success_log_appends_incrementally() {
        let dir = TempDir::new().unwrap();
        let mut ledger = SessionLedger::begin(dir.path()).unwrap();

        ledger.record_success(&PathBuf::from("a.tif")).unwrap();
        ledger.record_success(&PathBuf::from("b.tif")).unwrap();

        // Visible on disk before finalize
        let contents = std::fs::read_to_string(ledger.success_log_path()).unwrap();
        assert_eq!(contents, "a.tif\nb.tif\n");
    }

    #[test]
    fn test_error_list_written_at_finalize() {
        let dir = TempDir::new().unwrap();
        let mut ledger = SessionLedger::begin(dir.path()).unwrap();
        let error_list = ledger.error_list_path();

        ledger.record_failure(
            &PathBuf::from("bad.tif"),
            FailureKind::Configuration,
            "unrecognized sensor".to_string(),
        );
        assert!(!error_list.exists());

        let report = ledger.finalize().unwrap();
        let contents = std::fs::read_to_string(&error_list).unwrap();
        let paths: Vec<String> = serde_json::from_str(&contents).unwrap();
        assert_eq!(paths, vec!["bad.tif"]);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].kind, FailureKind::Configuration);
    }

    #[test]
    fn test_counts_cover_every_input() {
        let dir = TempDir::new().unwrap();
        let mut ledger = SessionLedger::begin(dir.path()).unwrap();

        let inputs = ["a.tif", "b.tif", "c.tif", "d.tif", "e.tif"];
        for (i, input) in inputs.iter().enumerate() {
            if i == 2 {
                ledger.record_failure(
                    &PathBuf::from(input),
                    FailureKind::Io,
                    "open failed".to_string(),
                );
            } else {
                ledger.record_success(&PathBuf::from(input)).unwrap();
            }
        }

        let report = ledger.finalize().unwrap();
        assert_eq!(report.succeeded + report.failed, inputs.len());
        assert_eq!(report.succeeded, 4);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn test_empty_session_still_writes_error_list() {
        let dir = TempDir::new().unwrap();
        let ledger = SessionLedger::begin(dir.path()).unwrap();
        let error_list = ledger.error_list_path();

        let report = ledger.finalize().unwrap();
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.failed, 0);
        assert_eq!(std::fs::read_to_string(error_list).unwrap(), "[]");
    }

    #[test]
    fn test_session_ids_are_unique() {
        let dir = TempDir::new().unwrap();
        let a = SessionLedger::begin(dir.path()).unwrap();
        let b = SessionLedger::begin(dir.path()).unwrap();
        assert_ne!(a.session_id(), b.session_id());
    }
}
