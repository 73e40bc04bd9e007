//! On-disk per-scene statistics record.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use sb_common::schema::is_compatible;
use sb_common::{CompressionFormat, RunId, SceneId, RECORD_SCHEMA_VERSION};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;

use super::StatsError;
use crate::roundtrip::RoundTripResult;
use crate::scene::{Scene, SceneKind};

/// Scene metadata stored at the top of each record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SceneMetadata {
    pub name: String,
    pub scene_id: SceneId,
    pub source_path: PathBuf,
    pub kind: SceneKind,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_id: Option<RunId>,
}

/// Latest result per format for one scene.
///
/// Format entries are top-level keys named by the format, next to
/// `schema_version` and `scene`. Entries stay raw JSON until read, so a key
/// this build cannot parse (a newer format, extra fields) is carried through
/// a merge unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SceneStatsRecord {
    pub schema_version: String,
    pub scene: SceneMetadata,
    #[serde(flatten)]
    #[schemars(with = "BTreeMap<String, RoundTripResult>")]
    pub results: BTreeMap<String, Value>,
}

impl SceneStatsRecord {
    /// An empty record for a scene.
    pub fn new(scene: &Scene) -> Self {
        Self {
            schema_version: RECORD_SCHEMA_VERSION.to_string(),
            scene: SceneMetadata {
                name: scene.name.clone(),
                scene_id: scene.id.clone(),
                source_path: scene.source_path.clone(),
                kind: scene.kind,
                updated_at: Utc::now(),
                last_run_id: None,
            },
            results: BTreeMap::new(),
        }
    }

    /// The typed entry for `format`; `None` when absent or unparseable.
    pub fn entry(&self, format: CompressionFormat) -> Option<RoundTripResult> {
        self.results
            .get(format.as_str())
            .and_then(|raw| serde_json::from_value(raw.clone()).ok())
    }

    /// Every entry keyed by name, parsed where this build understands it.
    pub fn entries(&self) -> impl Iterator<Item = (&str, Option<RoundTripResult>)> + '_ {
        self.results
            .iter()
            .map(|(key, raw)| (key.as_str(), serde_json::from_value(raw.clone()).ok()))
    }

    /// Replace the entry for the result's format. Returns whether one existed.
    pub fn replace(&mut self, result: RoundTripResult) -> Result<bool, StatsError> {
        let raw = serde_json::to_value(&result)?;
        self.scene.updated_at = Utc::now();
        self.scene.last_run_id = Some(result.run_id);
        Ok(self
            .results
            .insert(result.format.as_str().to_string(), raw)
            .is_some())
    }

    /// Parse a record, rejecting incompatible schema versions.
    ///
    /// Only the top-level shape and `scene` are checked; format entries are
    /// not validated here.
    pub fn parse(path: &Path, content: &str) -> Result<Self, StatsError> {
        let record: Self = serde_json::from_str(content).map_err(|e| StatsError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if !is_compatible(&record.schema_version) {
            return Err(StatsError::Corrupt {
                path: path.to_path_buf(),
                reason: format!(
                    "unsupported schema version {} (expected {})",
                    record.schema_version, RECORD_SCHEMA_VERSION
                ),
            });
        }
        Ok(record)
    }

    /// Load a record; `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>, StatsError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                return Err(StatsError::Corrupt {
                    path: path.to_path_buf(),
                    reason: "record is not valid UTF-8".to_string(),
                })
            }
            Err(source) => {
                return Err(StatsError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::parse(path, &content).map(Some)
    }

    /// Write the record atomically: temp file in the same directory,
    /// fsync, then rename over `path`.
    pub fn write_atomic(&self, path: &Path) -> Result<(), StatsError> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let io_err = |source| StatsError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        serde_json::to_writer_pretty(&mut tmp, self)?;
        tmp.write_all(b"\n").map_err(io_err)?;
        tmp.flush().map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

/// Move an unreadable record aside as `<name>.corrupt-<timestamp>`.
pub fn backup_corrupt(path: &Path) -> Result<PathBuf, StatsError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "record".to_string());
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
    let mut backup = path.with_file_name(format!("{name}.corrupt-{stamp}"));
    let mut n = 1;
    while backup.exists() {
        backup = path.with_file_name(format!("{name}.corrupt-{stamp}-{n}"));
        n += 1;
    }
    fs::rename(path, &backup).map_err(|source| StatsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(backup)
}
