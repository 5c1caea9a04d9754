//! Sync progress reporting.
//!
//! Progress goes to **stderr** so stdout stays parseable for scripts:
//!
//! ```text
//! sync alice  planned  12 to process, 1 to delete, 240 unchanged
//! sync alice  [3/12]  notes/q3.md  indexed (8 chunks)
//! ```
//!
//! `--progress json` emits one JSON object per line instead.

use std::io::Write;

use ragsync_core::sync::{DeletionStatus, FileStatus, SyncEvent, SyncObserver, SyncPhase};

/// Human-friendly progress lines on stderr.
pub struct StderrProgress {
    label: String,
}

impl StderrProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    fn line(&self, event: &SyncEvent<'_>) -> Option<String> {
        let body = match event {
            SyncEvent::Phase(SyncPhase::Diffing) => "diffing against sync state".to_string(),
            SyncEvent::Phase(SyncPhase::Failed) => "failed".to_string(),
            SyncEvent::Phase(SyncPhase::Done) => "done".to_string(),
            SyncEvent::Phase(_) => return None,
            SyncEvent::Planned {
                to_process,
                to_delete,
                unchanged,
            } => format!(
                "planned  {} to process, {} to delete, {} unchanged",
                format_number(*to_process as u64),
                format_number(*to_delete as u64),
                format_number(*unchanged as u64)
            ),
            // The outcome line carries the file name.
            SyncEvent::FileStarted { .. } => return None,
            SyncEvent::FileFinished(outcome) => {
                let status = match &outcome.status {
                    FileStatus::Indexed { chunks, .. } => {
                        format!("indexed ({} chunks)", format_number(*chunks as u64))
                    }
                    FileStatus::Skipped { reason } => format!("skipped: {}", reason),
                    FileStatus::Failed { stage, reason } => {
                        format!("FAILED at {}: {}", stage, reason)
                    }
                };
                format!("{}  {}", outcome.file_id, status)
            }
            SyncEvent::DeletionFinished(outcome) => match &outcome.status {
                DeletionStatus::Deleted { chunks_removed } => format!(
                    "{}  removed ({} chunks)",
                    outcome.file_id,
                    format_number(*chunks_removed as u64)
                ),
                DeletionStatus::Failed { reason } => {
                    format!("{}  FAILED to remove: {}", outcome.file_id, reason)
                }
            },
        };
        Some(format!("sync {}  {}\n", self.label, body))
    }
}

impl SyncObserver for StderrProgress {
    fn on_event(&self, event: &SyncEvent<'_>) {
        if let Some(line) = self.line(event) {
            let mut stderr = std::io::stderr().lock();
            let _ = stderr.write_all(line.as_bytes());
            let _ = stderr.flush();
        }
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress {
    label: String,
}

impl JsonProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    fn object(&self, event: &SyncEvent<'_>) -> serde_json::Value {
        match event {
            SyncEvent::Phase(phase) => serde_json::json!({
                "event": "phase",
                "owner": self.label,
                "phase": phase,
            }),
            SyncEvent::Planned {
                to_process,
                to_delete,
                unchanged,
            } => serde_json::json!({
                "event": "planned",
                "owner": self.label,
                "to_process": to_process,
                "to_delete": to_delete,
                "unchanged": unchanged,
            }),
            SyncEvent::FileStarted {
                position,
                total,
                file_id,
                name,
            } => serde_json::json!({
                "event": "file_started",
                "owner": self.label,
                "n": position,
                "total": total,
                "file_id": file_id,
                "name": name,
            }),
            SyncEvent::FileFinished(outcome) => serde_json::json!({
                "event": "file_finished",
                "owner": self.label,
                "outcome": outcome,
            }),
            SyncEvent::DeletionFinished(outcome) => serde_json::json!({
                "event": "deletion_finished",
                "owner": self.label,
                "outcome": outcome,
            }),
        }
    }
}

impl SyncObserver for JsonProgress {
    fn on_event(&self, event: &SyncEvent<'_>) {
        if let Ok(line) = serde_json::to_string(&self.object(event)) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn observer(&self, label: &str) -> Box<dyn SyncObserver> {
        match self {
            ProgressMode::Off => Box::new(ragsync_core::sync::NoopObserver),
            ProgressMode::Human => Box::new(StderrProgress::new(label)),
            ProgressMode::Json => Box::new(JsonProgress::new(label)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragsync_core::error::FileStage;
    use ragsync_core::sync::{DeletionOutcome, FileOutcome};

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn human_lines_describe_outcomes() {
        let progress = StderrProgress::new("alice");
        let failed = FileOutcome {
            file_id: "a.pdf".into(),
            name: "a.pdf".into(),
            status: FileStatus::Failed {
                stage: FileStage::Extract,
                reason: "bad xref".into(),
            },
        };
        assert_eq!(
            progress.line(&SyncEvent::FileFinished(&failed)).unwrap(),
            "sync alice  a.pdf  FAILED at extract: bad xref\n"
        );
        let planned = SyncEvent::Planned {
            to_process: 1200,
            to_delete: 0,
            unchanged: 3,
        };
        assert_eq!(
            progress.line(&planned).unwrap(),
            "sync alice  planned  1,200 to process, 0 to delete, 3 unchanged\n"
        );
        assert!(progress.line(&SyncEvent::Phase(SyncPhase::Start)).is_none());
    }

    #[test]
    fn json_objects_carry_outcome_fields() {
        let progress = JsonProgress::new("alice");
        let deleted = DeletionOutcome {
            file_id: "old.md".into(),
            status: DeletionStatus::Deleted { chunks_removed: 4 },
        };
        let obj = progress.object(&SyncEvent::DeletionFinished(&deleted));
        assert_eq!(obj["event"], "deletion_finished");
        assert_eq!(obj["outcome"]["status"], "deleted");
        assert_eq!(obj["outcome"]["chunks_removed"], 4);

        let phase = progress.object(&SyncEvent::Phase(SyncPhase::PerFileProcessing));
        assert_eq!(phase["phase"], "per_file_processing");
    }
}
