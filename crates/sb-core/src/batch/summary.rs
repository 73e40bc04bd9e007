//! End-of-batch summary.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use sb_common::{CompressionFormat, RunId};
use serde::Serialize;

/// Per-format outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FormatTally {
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// A scene (or scene record) that could not be handled, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SceneIssue {
    pub source: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnavailableFormat {
    pub format: CompressionFormat,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub run_id: RunId,
    pub source_root: PathBuf,
    pub output_root: PathBuf,
    pub formats: Vec<CompressionFormat>,
    pub scenes_discovered: u64,
    pub scenes_processed: u64,
    pub scenes_skipped: u64,
    pub per_format: BTreeMap<CompressionFormat, FormatTally>,
    pub archive_failures: Vec<SceneIssue>,
    pub duplicate_scenes: Vec<SceneIssue>,
    pub unavailable_formats: Vec<UnavailableFormat>,
    /// Backups of corrupt records that were replaced.
    pub record_corruptions: Vec<PathBuf>,
    pub record_errors: Vec<SceneIssue>,
    /// Tarball of the output tree, when requested and written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_archive: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_archive_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BatchSummary {
    pub fn new(run_id: RunId, source_root: PathBuf, output_root: PathBuf) -> Self {
        Self {
            run_id,
            source_root,
            output_root,
            formats: Vec::new(),
            scenes_discovered: 0,
            scenes_processed: 0,
            scenes_skipped: 0,
            per_format: BTreeMap::new(),
            archive_failures: Vec::new(),
            duplicate_scenes: Vec::new(),
            unavailable_formats: Vec::new(),
            record_corruptions: Vec::new(),
            record_errors: Vec::new(),
            output_archive: None,
            output_archive_error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn tally(&mut self, format: CompressionFormat) -> &mut FormatTally {
        self.per_format.entry(format).or_default()
    }

    pub fn total_failed(&self) -> u64 {
        self.per_format.values().map(|t| t.failed).sum()
    }

    pub fn total_succeeded(&self) -> u64 {
        self.per_format.values().map(|t| t.succeeded).sum()
    }

    /// Multi-line report for terminals.
    pub fn render_human(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Batch {} finished", self.run_id);
        let _ = writeln!(
            out,
            "  scenes: {} discovered, {} processed, {} skipped",
            self.scenes_discovered, self.scenes_processed, self.scenes_skipped
        );
        for (format, tally) in &self.per_format {
            let _ = writeln!(
                out,
                "  {:<5} {} ok, {} failed, {} skipped",
                format.as_str(),
                tally.succeeded,
                tally.failed,
                tally.skipped
            );
        }
        for missing in &self.unavailable_formats {
            let _ = writeln!(out, "  unavailable: {} ({})", missing.format, missing.reason);
        }
        for issue in &self.archive_failures {
            let _ = writeln!(out, "  archive skipped: {} ({})", issue.source.display(), issue.reason);
        }
        for issue in &self.duplicate_scenes {
            let _ = writeln!(out, "  duplicate skipped: {} ({})", issue.source.display(), issue.reason);
        }
        for backup in &self.record_corruptions {
            let _ = writeln!(out, "  corrupt record backed up to {}", backup.display());
        }
        for issue in &self.record_errors {
            let _ = writeln!(out, "  record not written: {} ({})", issue.source.display(), issue.reason);
        }
        if let Some(archive) = &self.output_archive {
            let _ = writeln!(out, "  output archived to {}", archive.display());
        }
        if let Some(error) = &self.output_archive_error {
            let _ = writeln!(out, "  output not archived: {error}");
        }
        out
    }
}
