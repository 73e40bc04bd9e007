//! The outcome of one (scene, format) round trip as stored in records.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use sb_common::{CompressionFormat, RunId};
use serde::{Deserialize, Serialize};

use crate::codec::CodecError;
use crate::collect::HostInfo;
use crate::metrics::{FidelitySummary, MetricError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failed,
}

/// Round-trip stage that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Prepare,
    Compress,
    Decompress,
    Evaluate,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Prepare => "prepare",
            Stage::Compress => "compress",
            Stage::Decompress => "decompress",
            Stage::Evaluate => "evaluate",
        };
        f.write_str(s)
    }
}

/// Error class of a failure, stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    CodecNotFound,
    CodecInvocation,
    CodecTimeout,
    MetricComputation,
    Io,
    InvalidInput,
    MissingOutput,
}

impl From<&CodecError> for FailureKind {
    fn from(err: &CodecError) -> Self {
        match err {
            CodecError::NotFound { .. } => FailureKind::CodecNotFound,
            CodecError::Invocation { .. } => FailureKind::CodecInvocation,
            CodecError::Timeout { .. } => FailureKind::CodecTimeout,
            CodecError::MissingOutput { .. } => FailureKind::MissingOutput,
            CodecError::InvalidInput(_) => FailureKind::InvalidInput,
            CodecError::Io(_) => FailureKind::Io,
        }
    }
}

impl From<&MetricError> for FailureKind {
    fn from(_: &MetricError) -> Self {
        FailureKind::MetricComputation
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StageFailure {
    pub stage: Stage,
    pub kind: FailureKind,
    /// Human-readable reason; never empty.
    pub reason: String,
}

/// Absolute paths of the files involved in a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Artifacts {
    pub input: PathBuf,
    pub compressed: PathBuf,
    pub decompressed: PathBuf,
}

/// Outcome of one (scene, format) round trip. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RoundTripResult {
    pub format: CompressionFormat,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<StageFailure>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compressed_size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restored_size_bytes: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression_time_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decompression_time_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_gpu_memory_mib: Option<u64>,

    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fidelity: Option<FidelitySummary>,

    pub artifacts: Artifacts,
    pub host: HostInfo,
    pub run_id: RunId,
    pub recorded_at: DateTime<Utc>,
}

impl RoundTripResult {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}
