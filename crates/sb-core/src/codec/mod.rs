//! Codec adapters: one uniform interface over heterogeneous external
//! compressors.
//!
//! The set of formats is closed ([`CompressionFormat`]); each variant has
//! exactly one adapter returned by [`adapter_for`]. Supporting a new format
//! means adding a variant, an adapter module and one registry arm.

pub mod cply;
pub mod process;
pub mod sog;
pub mod spz;

use sb_common::CompressionFormat;
use sb_config::BenchConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::collect::GpuSampler;

pub use process::{run_tool, ToolCommand, ToolRun};

/// Errors from a single codec invocation.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The external tool could not be found or executed.
    #[error("codec tool '{tool}' not found")]
    NotFound { tool: String },

    /// The tool ran and exited unsuccessfully.
    #[error("codec tool '{tool}' failed ({}): {stderr}", exit_label(.exit_code))]
    Invocation {
        tool: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The tool exceeded its configured time budget and was killed.
    #[error("codec tool '{tool}' exceeded {budget:?} budget")]
    Timeout { tool: String, budget: Duration },

    /// The tool reported success without leaving a usable output.
    #[error("codec tool '{tool}' produced no output at {path}")]
    MissingOutput { tool: String, path: PathBuf },

    /// Precondition on the input or output paths does not hold.
    #[error("invalid codec input: {0}")]
    InvalidInput(String),

    #[error("I/O error around codec invocation: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit {code}"),
        None => "killed by signal".to_string(),
    }
}

/// Successful compress or decompress invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CodecOutcome {
    /// Wall-clock duration of the invocation.
    pub duration: Duration,
    /// Size of the written output.
    pub output_bytes: u64,
    /// Peak GPU memory of the tool process, when sampled.
    pub peak_gpu_memory_mib: Option<u64>,
}

/// Per-invocation settings resolved for one format.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationConfig {
    pub binary: String,
    pub compress_args: Vec<String>,
    pub decompress_args: Vec<String>,
    pub timeout: Option<Duration>,
    pub use_cpu: bool,
    pub gpu: Option<GpuSampler>,
}

impl InvocationConfig {
    pub fn for_format(
        config: &BenchConfig,
        format: CompressionFormat,
        gpu: Option<GpuSampler>,
    ) -> Self {
        let tool = config.tool(format);
        Self {
            binary: tool.binary.clone(),
            compress_args: tool.compress_args.clone(),
            decompress_args: tool.decompress_args.clone(),
            timeout: tool.timeout(),
            use_cpu: config.use_cpu,
            gpu,
        }
    }
}

/// Uniform compress/decompress contract for one format.
///
/// Callers create output parent directories; adapters write exactly one
/// output file on success and leave nothing behind on failure.
pub trait CodecAdapter {
    fn format(&self) -> CompressionFormat;

    fn compress(
        &self,
        input_cloud: &Path,
        output: &Path,
        config: &InvocationConfig,
    ) -> Result<CodecOutcome, CodecError>;

    fn decompress(
        &self,
        input: &Path,
        output_cloud: &Path,
        config: &InvocationConfig,
    ) -> Result<CodecOutcome, CodecError>;

    /// Check that the tool can be executed at all.
    fn probe(&self, config: &InvocationConfig) -> Result<(), CodecError> {
        if process::binary_available(&config.binary) {
            Ok(())
        } else {
            Err(CodecError::NotFound {
                tool: config.binary.clone(),
            })
        }
    }
}

/// Source of adapters for the round-trip runner and orchestrator.
pub trait CodecProvider {
    fn adapter(&self, format: CompressionFormat) -> &dyn CodecAdapter;
}

/// The built-in registry backed by the external tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinCodecs;

impl CodecProvider for BuiltinCodecs {
    fn adapter(&self, format: CompressionFormat) -> &dyn CodecAdapter {
        adapter_for(format)
    }
}

static SPZ: spz::SpzAdapter = spz::SpzAdapter;
static SOG: sog::SogAdapter = sog::SogAdapter;
static CPLY: cply::CompressedPlyAdapter = cply::CompressedPlyAdapter;

/// Registry: the adapter for each format.
pub fn adapter_for(format: CompressionFormat) -> &'static dyn CodecAdapter {
    match format {
        CompressionFormat::Spz => &SPZ,
        CompressionFormat::Sog => &SOG,
        CompressionFormat::Cply => &CPLY,
    }
}

/// Check the adapter preconditions shared by every format.
pub(crate) fn check_paths(input: &Path, output: &Path) -> Result<(), CodecError> {
    if !input.is_file() {
        return Err(CodecError::InvalidInput(format!(
            "input does not exist or is not a file: {}",
            input.display()
        )));
    }
    if input == output {
        return Err(CodecError::InvalidInput(format!(
            "input and output are the same path: {}",
            input.display()
        )));
    }
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            Err(CodecError::InvalidInput(format!(
                "output directory does not exist: {}",
                parent.display()
            )))
        }
        _ => Ok(()),
    }
}

/// Turn a tool run into an outcome, enforcing the single-output contract.
///
/// On any failure every path in `cleanup` (the output plus adapter
/// temporaries) is removed so later size measurements never see a partial
/// artifact.
pub(crate) fn finish(
    tool: &str,
    run: Result<ToolRun, CodecError>,
    output: &Path,
    cleanup: &[&Path],
) -> Result<CodecOutcome, CodecError> {
    let result = run.and_then(|run| {
        let output_bytes = fs::metadata(output).map(|m| m.len()).unwrap_or(0);
        if output_bytes == 0 {
            return Err(CodecError::MissingOutput {
                tool: tool.to_string(),
                path: output.to_path_buf(),
            });
        }
        Ok(CodecOutcome {
            duration: run.duration,
            output_bytes,
            peak_gpu_memory_mib: run.peak_gpu_memory_mib,
        })
    });

    if result.is_err() {
        for path in cleanup {
            remove_partial(path);
        }
    }
    result
}

/// Remove a file if it exists, logging instead of failing.
pub(crate) fn remove_partial(path: &Path) {
    if path.exists() {
        match fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "removed partial codec output"),
            Err(e) => debug!(path = %path.display(), error = %e, "failed to remove partial output"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn registry_covers_every_format() {
        for format in CompressionFormat::ALL {
            assert_eq!(adapter_for(format).format(), format);
        }
    }

    #[test]
    fn invocation_config_reads_tool_settings() {
        let mut config = BenchConfig::default();
        config.codecs.sog.timeout_secs = Some(30);
        config.use_cpu = true;
        let inv = InvocationConfig::for_format(&config, CompressionFormat::Sog, None);
        assert_eq!(inv.binary, "splat-transform");
        assert_eq!(inv.timeout, Some(Duration::from_secs(30)));
        assert!(inv.use_cpu);
    }

    #[test]
    fn check_paths_rejects_missing_input() {
        let dir = tempdir().expect("tempdir");
        let err = check_paths(&dir.path().join("missing.ply"), &dir.path().join("out.spz"))
            .unwrap_err();
        assert!(matches!(err, CodecError::InvalidInput(_)));
    }

    #[test]
    fn check_paths_rejects_missing_output_dir() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("in.ply");
        fs::write(&input, b"ply").unwrap();
        let err = check_paths(&input, &dir.path().join("nope").join("out.spz")).unwrap_err();
        assert!(matches!(err, CodecError::InvalidInput(_)));
    }

    #[test]
    fn finish_removes_partial_output_on_failure() {
        let dir = tempdir().expect("tempdir");
        let output = dir.path().join("out.sog");
        fs::write(&output, b"partial").unwrap();
        let run = Err(CodecError::Invocation {
            tool: "splat-transform".into(),
            exit_code: Some(1),
            stderr: "boom".into(),
        });
        let result = finish("splat-transform", run, &output, &[&output]);
        assert!(result.is_err());
        assert!(!output.exists());
    }

    #[test]
    fn finish_rejects_empty_output() {
        let dir = tempdir().expect("tempdir");
        let output = dir.path().join("out.spz");
        fs::write(&output, b"").unwrap();
        let run = Ok(ToolRun {
            duration: Duration::from_millis(5),
            peak_gpu_memory_mib: None,
        });
        let err = finish("spz", run, &output, &[&output]).unwrap_err();
        assert!(matches!(err, CodecError::MissingOutput { .. }));
        assert!(!output.exists());
    }

    #[test]
    fn probe_reports_missing_binary() {
        let config = InvocationConfig {
            binary: "definitely-not-a-real-codec-binary".into(),
            compress_args: vec![],
            decompress_args: vec![],
            timeout: None,
            use_cpu: false,
            gpu: None,
        };
        let err = adapter_for(CompressionFormat::Spz).probe(&config).unwrap_err();
        assert!(matches!(err, CodecError::NotFound { .. }));
    }
}
