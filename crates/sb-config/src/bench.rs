//! Benchmark configuration types.
//!
//! Every field has a default so that an empty `{}` config file, or no file
//! at all, yields a working setup that invokes the stock tools from `PATH`.

use schemars::JsonSchema;
use sb_common::CompressionFormat;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::validate::ValidationError;

/// Complete benchmark configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct BenchConfig {
    pub schema_version: String,

    /// External tool settings per format.
    pub codecs: CodecSettings,

    /// Ask GPU-capable tools to run on the CPU instead.
    pub use_cpu: bool,

    /// Re-run (scene, format) pairs that already have a successful entry.
    pub overwrite: bool,

    /// Keep archive extraction directories after each scene.
    pub keep_extracted: bool,

    /// Where archives are extracted. Defaults to `<output>/.splat-bench-scratch`.
    pub scratch_dir: Option<PathBuf>,

    /// After a batch, pack the output tree into `<output>/<output name>.tar`.
    pub archive_output: bool,

    pub scan: ScanSettings,
    pub metrics: MetricSettings,
    pub gpu: GpuSettings,
    pub record: RecordSettings,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            codecs: CodecSettings::default(),
            use_cpu: false,
            overwrite: false,
            keep_extracted: false,
            scratch_dir: None,
            archive_output: false,
            scan: ScanSettings::default(),
            metrics: MetricSettings::default(),
            gpu: GpuSettings::default(),
            record: RecordSettings::default(),
        }
    }
}

impl BenchConfig {
    /// Load a config from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ValidationError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::parse_json(&content)
    }

    /// Parse a config from a JSON string.
    pub fn parse_json(json: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(json)
            .map_err(|e| ValidationError::ParseError(format!("Invalid JSON: {}", e)))
    }

    /// Tool settings for one format.
    pub fn tool(&self, format: CompressionFormat) -> &ToolSettings {
        match format {
            CompressionFormat::Spz => &self.codecs.spz,
            CompressionFormat::Sog => &self.codecs.sog,
            CompressionFormat::Cply => &self.codecs.cply,
        }
    }
}

/// External tool settings for each supported format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct CodecSettings {
    pub spz: ToolSettings,
    pub sog: ToolSettings,
    pub cply: ToolSettings,
}

impl Default for CodecSettings {
    fn default() -> Self {
        Self {
            spz: ToolSettings::new("spz"),
            sog: ToolSettings::new("splat-transform"),
            cply: ToolSettings::new("splat-transform"),
        }
    }
}

/// How to invoke one external codec tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ToolSettings {
    /// Program name (looked up on `PATH`) or path to the binary.
    pub binary: String,

    /// Extra arguments appended to every compress invocation.
    #[serde(default)]
    pub compress_args: Vec<String>,

    /// Extra arguments appended to every decompress invocation.
    #[serde(default)]
    pub decompress_args: Vec<String>,

    /// Wall-clock budget per invocation; `None` waits indefinitely.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ToolSettings {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            compress_args: Vec::new(),
            decompress_args: Vec::new(),
            timeout_secs: None,
        }
    }

    pub fn timeout(&self) -> Option<std::time::Duration> {
        self.timeout_secs.map(std::time::Duration::from_secs)
    }
}

/// Source tree scanning options.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ScanSettings {
    /// Keep a scene only if its relative path contains any of these
    /// substrings (e.g. `iteration_40000`). Empty keeps everything.
    pub path_filter: Vec<String>,

    /// Only treat files with exactly this name as point clouds
    /// (e.g. `point_cloud.ply`). `None` accepts any `.ply`.
    pub cloud_file_name: Option<String>,

    /// Follow symbolic links while walking the source tree.
    pub follow_links: bool,
}

/// Point correspondence used for fidelity metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Identity when it demonstrably holds, nearest-neighbor otherwise.
    #[default]
    Auto,
    /// Point `i` of the restored cloud is point `i` of the original.
    Identity,
    /// Each restored point is matched to the nearest original position.
    NearestNeighbor,
}

impl std::fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchStrategy::Auto => write!(f, "auto"),
            MatchStrategy::Identity => write!(f, "identity"),
            MatchStrategy::NearestNeighbor => write!(f, "nearest_neighbor"),
        }
    }
}

/// Fidelity metric options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct MetricSettings {
    pub match_strategy: MatchStrategy,

    /// Largest index-aligned position error, as a fraction of the original
    /// bounding-box diagonal, for `auto` to accept identity matching.
    pub identity_tolerance: f64,
}

impl Default for MetricSettings {
    fn default() -> Self {
        Self {
            match_strategy: MatchStrategy::Auto,
            identity_tolerance: 0.01,
        }
    }
}

/// GPU observation options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GpuSettings {
    /// Sample per-process GPU memory of codec tools via nvidia-smi.
    pub monitor: bool,

    /// Interval between GPU memory samples.
    pub sample_interval_ms: u64,
}

impl Default for GpuSettings {
    fn default() -> Self {
        Self {
            monitor: true,
            sample_interval_ms: 250,
        }
    }
}

/// Statistics record options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RecordSettings {
    /// Record file name inside each scene's output directory.
    pub file_name: String,

    /// How long to wait for another writer's lock on the same record.
    pub lock_wait_ms: u64,
}

impl Default for RecordSettings {
    fn default() -> Self {
        Self {
            file_name: "compression_stats.json".to_string(),
            lock_wait_ms: 10_000,
        }
    }
}
