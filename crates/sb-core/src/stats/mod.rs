//! Stats aggregator: merges round-trip results into per-scene records.
//!
//! A record is read, the entry for one format replaced wholesale, and the
//! whole record written back atomically while holding the record lock.

pub mod lock;
pub mod record;

use std::path::{Path, PathBuf};
use std::time::Duration;

use sb_common::CompressionFormat;
use sb_config::RecordSettings;
use thiserror::Error;
use tracing::{debug, warn};

use crate::roundtrip::RoundTripResult;
use crate::scene::Scene;

pub use lock::{lock_path, RecordLock};
pub use record::{backup_corrupt, SceneMetadata, SceneStatsRecord};

#[derive(Debug, Error)]
pub enum StatsError {
    /// The record exists but cannot be used.
    #[error("record {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("record I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("timed out after {waited_ms}ms waiting for record lock {path}")]
    LockTimeout { path: PathBuf, waited_ms: u64 },
}

impl From<StatsError> for sb_common::Error {
    fn from(err: StatsError) -> Self {
        let message = err.to_string();
        match err {
            StatsError::Corrupt { .. } => Self::RecordCorrupt(message),
            StatsError::Io { source, .. } => Self::Io(source),
            StatsError::Serialize(e) => Self::Json(e),
            StatsError::LockTimeout { .. } => {
                Self::Io(std::io::Error::new(std::io::ErrorKind::WouldBlock, message))
            }
        }
    }
}

/// What a merge did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub record_path: PathBuf,
    /// An existing entry for the format was replaced.
    pub replaced: bool,
    /// A corrupt record was moved to this backup before writing.
    pub corruption: Option<PathBuf>,
}

/// Owns the record file naming and locking policy.
#[derive(Debug, Clone)]
pub struct StatsAggregator {
    file_name: String,
    lock_wait: Duration,
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new(&RecordSettings::default())
    }
}

impl StatsAggregator {
    pub fn new(settings: &RecordSettings) -> Self {
        Self {
            file_name: settings.file_name.clone(),
            lock_wait: Duration::from_millis(settings.lock_wait_ms),
        }
    }

    pub fn record_path(&self, record_dir: &Path) -> PathBuf {
        record_dir.join(&self.file_name)
    }

    /// Load the record in `record_dir`, if any. Corruption is an error here.
    pub fn load(&self, record_dir: &Path) -> Result<Option<SceneStatsRecord>, StatsError> {
        SceneStatsRecord::load(&self.record_path(record_dir))
    }

    /// Whether the record already holds a successful entry for `format`.
    /// Unreadable records count as "no".
    pub fn has_success(&self, record_dir: &Path, format: CompressionFormat) -> bool {
        match self.load(record_dir) {
            Ok(Some(record)) => record
                .entry(format)
                .is_some_and(|entry| entry.is_success()),
            _ => false,
        }
    }

    /// Replace the result's format entry in the scene record and persist it.
    pub fn merge_and_persist(
        &self,
        scene: &Scene,
        record_dir: &Path,
        result: RoundTripResult,
    ) -> Result<MergeOutcome, StatsError> {
        std::fs::create_dir_all(record_dir).map_err(|source| StatsError::Io {
            path: record_dir.to_path_buf(),
            source,
        })?;
        let path = self.record_path(record_dir);
        let _lock = RecordLock::acquire(&lock_path(&path), self.lock_wait)?;

        let mut corruption = None;
        let mut record = match SceneStatsRecord::load(&path) {
            Ok(Some(record)) => record,
            Ok(None) => SceneStatsRecord::new(scene),
            Err(StatsError::Corrupt { reason, .. }) => {
                let backup = backup_corrupt(&path)?;
                warn!(
                    record = %path.display(),
                    backup = %backup.display(),
                    reason = %reason,
                    "record was corrupt, backed up and starting fresh"
                );
                corruption = Some(backup);
                SceneStatsRecord::new(scene)
            }
            Err(e) => return Err(e),
        };

        let format = result.format;
        let replaced = record.replace(result)?;
        record.write_atomic(&path)?;
        debug!(record = %path.display(), format = %format, replaced, "record updated");

        Ok(MergeOutcome {
            record_path: path,
            replaced,
            corruption,
        })
    }
}
