//! GPU device information and per-process memory sampling.
//!
//! Uses `nvidia-smi` for NVIDIA GPUs (CUDA). Codec tools such as
//! `splat-transform` run their encoders on the GPU, so the peak device memory
//! of the tool's process is sampled while it runs.
//!
//! # Graceful Degradation
//! - nvidia-smi is optional; when missing, GPU fields are simply absent
//! - Parse failures are logged at debug level, never hard errors

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sb_config::GpuSettings;
use std::process::Command;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

use crate::codec::process::binary_available;

const NVIDIA_SMI: &str = "nvidia-smi";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from GPU detection operations.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("GPU tool not found: {0}")]
    ToolNotFound(String),

    #[error("GPU tool execution failed: {0}")]
    ExecutionFailed(String),

    #[error("failed to parse GPU tool output: {0}")]
    ParseError(String),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Information about a single GPU device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GpuDevice {
    /// Device index (e.g. 0, 1, 2).
    pub index: u32,
    /// Device name (e.g. "NVIDIA A100-SXM4-40GB").
    pub name: String,
    /// Total VRAM in MiB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_total_mib: Option<u64>,
}

// ---------------------------------------------------------------------------
// Tool availability
// ---------------------------------------------------------------------------

/// Check if nvidia-smi is on `PATH`.
pub fn is_nvidia_available() -> bool {
    binary_available(NVIDIA_SMI)
}

// ---------------------------------------------------------------------------
// nvidia-smi parsing
// ---------------------------------------------------------------------------

/// Run nvidia-smi and collect GPU device information.
pub fn query_nvidia_devices() -> Result<Vec<GpuDevice>, GpuError> {
    let stdout = run_nvidia_smi(&[
        "--query-gpu=index,name,memory.total",
        "--format=csv,noheader,nounits",
    ])?;
    parse_nvidia_device_csv(&stdout)
}

/// Parse nvidia-smi CSV device output.
///
/// Expected format (one row per GPU): `index, name, memory.total [MiB]`
pub fn parse_nvidia_device_csv(csv: &str) -> Result<Vec<GpuDevice>, GpuError> {
    let mut devices = Vec::new();
    for line in csv.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() < 3 {
            return Err(GpuError::ParseError(format!(
                "expected 3 CSV fields, got {}: {line}",
                fields.len()
            )));
        }
        let index = fields[0]
            .parse::<u32>()
            .map_err(|e| GpuError::ParseError(format!("bad GPU index '{}': {e}", fields[0])))?;
        devices.push(GpuDevice {
            index,
            name: fields[1].to_string(),
            memory_total_mib: fields[2].parse::<u64>().ok(),
        });
    }
    Ok(devices)
}

/// Query GPU memory (MiB) currently held by each compute process.
pub fn query_process_memory() -> Result<Vec<(u32, u64)>, GpuError> {
    let stdout = run_nvidia_smi(&[
        "--query-compute-apps=pid,used_memory",
        "--format=csv,noheader,nounits",
    ])?;
    parse_nvidia_process_csv(&stdout)
}

/// Parse nvidia-smi per-process CSV output (`pid, used_memory [MiB]`).
///
/// A process on several GPUs appears once per device; rows are returned as-is.
pub fn parse_nvidia_process_csv(csv: &str) -> Result<Vec<(u32, u64)>, GpuError> {
    let mut rows = Vec::new();
    for line in csv.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("No running") {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() < 2 {
            return Err(GpuError::ParseError(format!("expected pid,used_memory: {line}")));
        }
        let pid = fields[0]
            .parse::<u32>()
            .map_err(|e| GpuError::ParseError(format!("bad pid '{}': {e}", fields[0])))?;
        // "[N/A]" shows up on some drivers for processes in other containers.
        if let Ok(mib) = fields[1].parse::<u64>() {
            rows.push((pid, mib));
        }
    }
    Ok(rows)
}

fn run_nvidia_smi(args: &[&str]) -> Result<String, GpuError> {
    let output = Command::new(NVIDIA_SMI).args(args).output().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            GpuError::ToolNotFound(NVIDIA_SMI.to_string())
        } else {
            GpuError::ExecutionFailed(format!("nvidia-smi: {e}"))
        }
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GpuError::ExecutionFailed(format!(
            "nvidia-smi exited {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

/// Samples the GPU memory of a running codec process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuSampler {
    pub interval: Duration,
}

impl GpuSampler {
    /// Build a sampler if monitoring is enabled and nvidia-smi is present.
    pub fn detect(settings: &GpuSettings) -> Option<Self> {
        if !settings.monitor {
            return None;
        }
        if !is_nvidia_available() {
            debug!("nvidia-smi not available, GPU memory will not be sampled");
            return None;
        }
        Some(Self {
            interval: Duration::from_millis(settings.sample_interval_ms),
        })
    }

    /// Current GPU memory of `pid` in MiB summed over devices, if it holds any.
    pub fn sample(&self, pid: u32) -> Option<u64> {
        match query_process_memory() {
            Ok(rows) => memory_for_pid(&rows, pid),
            Err(e) => {
                trace!(error = %e, "GPU memory sample failed");
                None
            }
        }
    }
}

/// Sum the memory rows belonging to one process.
pub fn memory_for_pid(rows: &[(u32, u64)], pid: u32) -> Option<u64> {
    let mut total = None;
    for (row_pid, mib) in rows {
        if *row_pid == pid {
            total = Some(total.unwrap_or(0) + mib);
        }
    }
    total
}
