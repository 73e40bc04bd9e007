//! Batch orchestrator: walks a source tree and round-trips every scene
//! through every requested format.
//!
//! Only environment-level problems abort a batch: a missing source, an
//! unwritable output root, or no usable codec. Everything else is recorded
//! (as a failed entry or a summary issue) and the batch moves on.

pub mod archive;
pub mod layout;
pub mod scan;
pub mod summary;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use sb_common::{CompressionFormat, RunId};
use sb_config::BenchConfig;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{info, warn};

use crate::codec::{CodecProvider, InvocationConfig};
use crate::collect::HostInfo;
use crate::roundtrip::RoundTripRunner;
use crate::scene::{Scene, SceneKind};
use crate::stats::StatsAggregator;

pub use archive::{ArchiveError, ExtractedCloud};
pub use layout::SceneLayout;
pub use summary::{BatchSummary, FormatTally, SceneIssue, UnavailableFormat};

/// Name of the default scratch directory inside the output root.
pub const SCRATCH_DIR_NAME: &str = ".splat-bench-scratch";

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("source not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("output root {path} is not writable: {reason}")]
    OutputNotWritable { path: PathBuf, reason: String },

    #[error("no compression format requested")]
    NoFormats,

    #[error("no requested codec is available ({0})")]
    NoCodecAvailable(String),
}

impl From<BatchError> for sb_common::Error {
    fn from(err: BatchError) -> Self {
        match err {
            BatchError::SourceNotFound(path) => Self::InputNotFound(path.display().to_string()),
            BatchError::OutputNotWritable { path, reason } => Self::OutputNotWritable {
                path: path.display().to_string(),
                reason,
            },
            BatchError::NoFormats => Self::InvalidInput("no compression format requested".to_string()),
            BatchError::NoCodecAvailable(formats) => Self::NoCodecAvailable(formats),
        }
    }
}

/// Drives round trips and record merges over a source tree.
pub struct BatchOrchestrator<'a> {
    codecs: &'a dyn CodecProvider,
    config: &'a BenchConfig,
    host: HostInfo,
}

impl<'a> BatchOrchestrator<'a> {
    pub fn new(codecs: &'a dyn CodecProvider, config: &'a BenchConfig, host: HostInfo) -> Self {
        Self {
            codecs,
            config,
            host,
        }
    }

    pub fn run_batch(
        &self,
        source_root: &Path,
        output_root: &Path,
        formats: &[CompressionFormat],
    ) -> Result<BatchSummary, BatchError> {
        if !source_root.exists() {
            return Err(BatchError::SourceNotFound(source_root.to_path_buf()));
        }
        ensure_writable(output_root)?;

        let mut requested: Vec<CompressionFormat> = Vec::new();
        for format in formats {
            if !requested.contains(format) {
                requested.push(*format);
            }
        }
        if requested.is_empty() {
            return Err(BatchError::NoFormats);
        }

        let run_id = RunId::new();
        let mut summary =
            BatchSummary::new(run_id.clone(), source_root.to_path_buf(), output_root.to_path_buf());

        let available = self.probe_codecs(&requested, &mut summary);
        if available.is_empty() {
            let names: Vec<&str> = requested.iter().map(|f| f.as_str()).collect();
            return Err(BatchError::NoCodecAvailable(names.join(", ")));
        }
        summary.formats = available.clone();

        let scratch_root = self
            .config
            .scratch_dir
            .clone()
            .unwrap_or_else(|| output_root.join(SCRATCH_DIR_NAME));
        let excluded = [output_root.to_path_buf(), scratch_root.clone()];
        let scenes = scan::discover(source_root, &excluded, &self.config.scan);
        summary.scenes_discovered = scenes.len() as u64;
        info!(
            run_id = %run_id,
            scenes = scenes.len(),
            formats = ?available,
            "batch starting"
        );

        let runner = RoundTripRunner::new(self.codecs, self.config, self.host.clone(), run_id);
        let aggregator = StatsAggregator::new(&self.config.record);
        let mut seen_dirs: HashSet<PathBuf> = HashSet::new();

        for scene in &scenes {
            let layout = SceneLayout::for_scene(output_root, scene);
            if !seen_dirs.insert(layout.scene_dir.clone()) {
                warn!(
                    scene = %scene.id,
                    dir = %layout.scene_dir.display(),
                    "another source already maps to this scene directory, skipping"
                );
                summary.duplicate_scenes.push(SceneIssue {
                    source: scene.source_path.clone(),
                    reason: format!("scene directory {} already used", layout.scene_dir.display()),
                });
                summary.scenes_skipped += 1;
                continue;
            }

            let extracted = match scene.kind {
                SceneKind::LooseFile => None,
                SceneKind::ArchiveMember => match self.open_archive(scene, &scratch_root) {
                    Ok(Some(extracted)) => Some(extracted),
                    Ok(None) => {
                        summary.scenes_skipped += 1;
                        continue;
                    }
                    Err(e) => {
                        warn!(scene = %scene.id, error = %e, "archive scene skipped");
                        summary.archive_failures.push(SceneIssue {
                            source: scene.source_path.clone(),
                            reason: e.to_string(),
                        });
                        summary.scenes_skipped += 1;
                        continue;
                    }
                },
            };
            let input = extracted
                .as_ref()
                .map(|e| e.cloud.clone())
                .unwrap_or_else(|| scene.source_path.clone());

            for format in &available {
                self.run_one(scene, *format, &input, &layout, &runner, &aggregator, &mut summary);
            }
            summary.scenes_processed += 1;
        }

        if self.config.scratch_dir.is_none() && !self.config.keep_extracted {
            // Only succeeds when empty, which is what we want.
            let _ = fs::remove_dir(&scratch_root);
        }

        if self.config.archive_output {
            match archive::pack_tree(output_root, &[scratch_root.clone()]) {
                Ok(path) => summary.output_archive = Some(path),
                Err(e) => {
                    warn!(error = %e, "could not archive the output tree");
                    summary.output_archive_error = Some(e.to_string());
                }
            }
        }

        summary.finished_at = Some(Utc::now());
        info!(
            processed = summary.scenes_processed,
            skipped = summary.scenes_skipped,
            succeeded = summary.total_succeeded(),
            failed = summary.total_failed(),
            "batch finished"
        );
        Ok(summary)
    }

    /// Probe every requested codec once; missing ones are reported and dropped.
    fn probe_codecs(
        &self,
        requested: &[CompressionFormat],
        summary: &mut BatchSummary,
    ) -> Vec<CompressionFormat> {
        let mut available = Vec::new();
        for format in requested {
            let invocation = InvocationConfig::for_format(self.config, *format, None);
            match self.codecs.adapter(*format).probe(&invocation) {
                Ok(()) => available.push(*format),
                Err(e) => {
                    warn!(format = %format, error = %e, "codec unavailable, skipping format");
                    summary.unavailable_formats.push(UnavailableFormat {
                        format: *format,
                        reason: e.to_string(),
                    });
                }
            }
        }
        available
    }

    /// Extract an archive scene. `Ok(None)` means the path filter excluded it.
    fn open_archive(
        &self,
        scene: &Scene,
        scratch_root: &Path,
    ) -> Result<Option<ExtractedCloud>, ArchiveError> {
        let scan = &self.config.scan;
        let members = archive::list_clouds(&scene.source_path, scan.cloud_file_name.as_deref())?;
        let member = archive::single_cloud(&scene.source_path, members)?;
        let candidate = format!("{}/{}", scene.id, member);
        if !scan::matches_filter(&scan.path_filter, &candidate) {
            info!(scene = %scene.id, member = %member, "archive filtered out");
            return Ok(None);
        }
        archive::extract_member(
            &scene.source_path,
            &member,
            scratch_root,
            self.config.keep_extracted,
        )
        .map(Some)
    }

    #[allow(clippy::too_many_arguments)]
    fn run_one(
        &self,
        scene: &Scene,
        format: CompressionFormat,
        input: &Path,
        layout: &SceneLayout,
        runner: &RoundTripRunner<'_>,
        aggregator: &StatsAggregator,
        summary: &mut BatchSummary,
    ) {
        let record_dir = layout.record_dir();
        if !self.config.overwrite
            && layout.compressed(format).is_file()
            && aggregator.has_success(record_dir, format)
        {
            info!(scene = %scene.id, format = %format, "already done, skipping");
            summary.tally(format).skipped += 1;
            return;
        }

        let result = runner.run(scene, format, &layout.paths(input, format));
        if result.is_success() {
            summary.tally(format).succeeded += 1;
        } else {
            summary.tally(format).failed += 1;
        }

        match aggregator.merge_and_persist(scene, record_dir, result) {
            Ok(outcome) => {
                if let Some(backup) = outcome.corruption {
                    summary.record_corruptions.push(backup);
                }
            }
            Err(e) => {
                warn!(scene = %scene.id, format = %format, error = %e, "failed to persist result");
                summary.record_errors.push(SceneIssue {
                    source: scene.source_path.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
}

/// Create the output root and prove a file can be written in it.
fn ensure_writable(output_root: &Path) -> Result<(), BatchError> {
    let not_writable = |e: std::io::Error| BatchError::OutputNotWritable {
        path: output_root.to_path_buf(),
        reason: e.to_string(),
    };
    fs::create_dir_all(output_root).map_err(not_writable)?;
    NamedTempFile::new_in(output_root).map_err(not_writable)?;
    Ok(())
}
