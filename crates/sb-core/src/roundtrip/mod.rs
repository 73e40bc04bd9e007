//! Round-trip runner: prepare, compress, decompress, evaluate.
//!
//! The runner never returns an error. Every failure becomes a `failed`
//! [`RoundTripResult`] naming the stage and error class, so a batch can
//! record it and move on.

pub mod result;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use sb_common::{CompressionFormat, RunId};
use sb_config::BenchConfig;
use tracing::{debug, info, warn};

use crate::codec::{CodecProvider, InvocationConfig};
use crate::collect::{GpuSampler, HostInfo};
use crate::metrics::{evaluate, MetricError, PointCloud};
use crate::scene::Scene;

pub use result::{Artifacts, FailureKind, RoundTripResult, RunStatus, Stage, StageFailure};

/// Where one round trip reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundTripPaths {
    pub input: PathBuf,
    pub compressed: PathBuf,
    pub decompressed: PathBuf,
}

impl RoundTripPaths {
    /// Defaults next to the input: `<stem>.<ext>` and
    /// `<stem>_decompressed_<format>.ply`.
    pub fn beside_input(input: &Path, format: CompressionFormat) -> Self {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "cloud".to_string());
        let dir = input.parent().map(Path::to_path_buf).unwrap_or_default();
        Self {
            input: input.to_path_buf(),
            compressed: dir.join(format!("{stem}.{}", format.extension())),
            decompressed: dir.join(format!("{stem}_decompressed_{}.ply", format.as_str())),
        }
    }

    fn artifacts(&self) -> Artifacts {
        Artifacts {
            input: absolute(&self.input),
            compressed: absolute(&self.compressed),
            decompressed: absolute(&self.decompressed),
        }
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Runs round trips with one configuration, host and run id.
pub struct RoundTripRunner<'a> {
    codecs: &'a dyn CodecProvider,
    config: &'a BenchConfig,
    gpu: Option<GpuSampler>,
    host: HostInfo,
    run_id: RunId,
    replace_outputs: bool,
}

/// Accumulates a result while stages run.
struct Progress {
    result: RoundTripResult,
}

impl Progress {
    fn fail(mut self, stage: Stage, kind: FailureKind, reason: String) -> RoundTripResult {
        let reason = if reason.trim().is_empty() {
            format!("{stage} stage failed")
        } else {
            reason
        };
        self.result.status = RunStatus::Failed;
        self.result.failure = Some(StageFailure {
            stage,
            kind,
            reason,
        });
        self.result
    }
}

impl<'a> RoundTripRunner<'a> {
    pub fn new(
        codecs: &'a dyn CodecProvider,
        config: &'a BenchConfig,
        host: HostInfo,
        run_id: RunId,
    ) -> Self {
        Self {
            codecs,
            config,
            gpu: GpuSampler::detect(&config.gpu),
            host,
            run_id,
            replace_outputs: true,
        }
    }

    /// Whether files already at the output paths may be replaced. When not,
    /// an existing output fails the prepare stage.
    pub fn replace_outputs(mut self, replace: bool) -> Self {
        self.replace_outputs = replace;
        self
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Round-trip one scene through one format.
    pub fn run(
        &self,
        scene: &Scene,
        format: CompressionFormat,
        paths: &RoundTripPaths,
    ) -> RoundTripResult {
        let progress = Progress {
            result: RoundTripResult {
                format,
                status: RunStatus::Success,
                failure: None,
                original_size_bytes: None,
                compressed_size_bytes: None,
                restored_size_bytes: None,
                compression_time_seconds: None,
                decompression_time_seconds: None,
                peak_gpu_memory_mib: None,
                metrics: Default::default(),
                fidelity: None,
                artifacts: paths.artifacts(),
                host: self.host.clone(),
                run_id: self.run_id.clone(),
                recorded_at: Utc::now(),
            },
        };

        let result = self.stages(progress, format, paths);
        match &result.failure {
            None => info!(
                scene = %scene.id,
                format = %format,
                ratio = ?result.metric("compression_ratio"),
                "round trip succeeded"
            ),
            Some(failure) => warn!(
                scene = %scene.id,
                format = %format,
                stage = %failure.stage,
                reason = %failure.reason,
                "round trip failed"
            ),
        }
        result
    }

    fn stages(
        &self,
        mut progress: Progress,
        format: CompressionFormat,
        paths: &RoundTripPaths,
    ) -> RoundTripResult {
        let original_size = match prepare(paths, self.replace_outputs) {
            Ok(size) => size,
            Err((kind, reason)) => return progress.fail(Stage::Prepare, kind, reason),
        };
        progress.result.original_size_bytes = Some(original_size);

        let adapter = self.codecs.adapter(format);
        let invocation = InvocationConfig::for_format(self.config, format, self.gpu);

        let compressed = match adapter.compress(&paths.input, &paths.compressed, &invocation) {
            Ok(outcome) => outcome,
            Err(e) => {
                return progress.fail(Stage::Compress, FailureKind::from(&e), e.to_string())
            }
        };
        progress.result.compressed_size_bytes = Some(compressed.output_bytes);
        progress.result.compression_time_seconds = Some(compressed.duration.as_secs_f64());
        progress.result.peak_gpu_memory_mib = compressed.peak_gpu_memory_mib;

        let restored =
            match adapter.decompress(&paths.compressed, &paths.decompressed, &invocation) {
                Ok(outcome) => outcome,
                Err(e) => {
                    return progress.fail(Stage::Decompress, FailureKind::from(&e), e.to_string())
                }
            };
        progress.result.restored_size_bytes = Some(restored.output_bytes);
        progress.result.decompression_time_seconds = Some(restored.duration.as_secs_f64());
        progress.result.peak_gpu_memory_mib = max_option(
            progress.result.peak_gpu_memory_mib,
            restored.peak_gpu_memory_mib,
        );

        let metrics = PointCloud::load(&paths.input)
            .and_then(|orig| PointCloud::load(&paths.decompressed).map(|rest| (orig, rest)))
            .map_err(MetricError::from)
            .and_then(|(orig, rest)| {
                evaluate(
                    &orig,
                    &rest,
                    original_size,
                    compressed.output_bytes,
                    &self.config.metrics,
                )
            });
        match metrics {
            Ok(set) => {
                progress.result.metrics = set.values;
                progress.result.fidelity = Some(set.fidelity);
                progress.result
            }
            Err(e) => progress.fail(Stage::Evaluate, FailureKind::from(&e), e.to_string()),
        }
    }
}

fn max_option(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Check the input, create output parents and clear stale artifacts.
/// Returns the input size.
fn prepare(paths: &RoundTripPaths, replace_outputs: bool) -> Result<u64, (FailureKind, String)> {
    let meta = fs::metadata(&paths.input).map_err(|e| {
        (
            FailureKind::InvalidInput,
            format!("cannot read input {}: {e}", paths.input.display()),
        )
    })?;
    if !meta.is_file() {
        return Err((
            FailureKind::InvalidInput,
            format!("input is not a file: {}", paths.input.display()),
        ));
    }
    if meta.len() == 0 {
        return Err((
            FailureKind::InvalidInput,
            format!("input is empty: {}", paths.input.display()),
        ));
    }

    for output in [&paths.compressed, &paths.decompressed] {
        if output == &paths.input {
            return Err((
                FailureKind::InvalidInput,
                format!("output would overwrite the input: {}", output.display()),
            ));
        }
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                (
                    FailureKind::Io,
                    format!("cannot create {}: {e}", parent.display()),
                )
            })?;
        }
        if output.exists() && !replace_outputs {
            return Err((
                FailureKind::InvalidInput,
                format!(
                    "output file already exists: {} (use --overwrite to replace it)",
                    output.display()
                ),
            ));
        }
        if output.exists() {
            debug!(path = %output.display(), "removing stale artifact");
            fs::remove_file(output).map_err(|e| {
                (
                    FailureKind::Io,
                    format!("cannot remove stale {}: {e}", output.display()),
                )
            })?;
        }
    }
    Ok(meta.len())
}
