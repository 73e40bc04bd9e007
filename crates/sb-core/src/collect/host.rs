//! Host identification recorded alongside every result.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::process::Command;

use super::gpu;

const UNKNOWN_CPU: &str = "Unknown CPU";
const UNKNOWN_GPU: &str = "Unknown GPU";

/// CPU and GPU names of the machine that produced a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct HostInfo {
    pub cpu_name: String,
    pub gpu_name: String,
}

impl HostInfo {
    /// Detect the current host. Never fails; unknown parts are labelled.
    pub fn detect() -> Self {
        Self {
            cpu_name: detect_cpu_name().unwrap_or_else(|| UNKNOWN_CPU.to_string()),
            gpu_name: detect_gpu_name().unwrap_or_else(|| UNKNOWN_GPU.to_string()),
        }
    }

    pub fn unknown() -> Self {
        Self {
            cpu_name: UNKNOWN_CPU.to_string(),
            gpu_name: UNKNOWN_GPU.to_string(),
        }
    }
}

fn detect_cpu_name() -> Option<String> {
    if let Ok(cpuinfo) = std::fs::read_to_string("/proc/cpuinfo") {
        if let Some(name) = parse_cpuinfo_model(&cpuinfo) {
            return Some(name);
        }
    }
    let output = Command::new("sysctl")
        .args(["-n", "machdep.cpu.brand_string"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!name.is_empty()).then_some(name)
}

/// Extract the first `model name` from /proc/cpuinfo contents.
pub fn parse_cpuinfo_model(cpuinfo: &str) -> Option<String> {
    cpuinfo
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim() == "model name")
        .map(|(_, value)| value.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn detect_gpu_name() -> Option<String> {
    let devices = gpu::query_nvidia_devices().ok()?;
    let names: Vec<String> = devices.into_iter().map(|d| d.name).collect();
    (!names.is_empty()).then(|| names.join(", "))
}
