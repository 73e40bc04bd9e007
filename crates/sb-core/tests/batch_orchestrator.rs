//! Batch orchestrator over temp source trees with in-process fake codecs.
//!
//! Validates:
//! - A corrupt .tar next to a valid .ply: batch completes, only the valid
//!   scene gets a record
//! - Archive scenes are extracted, processed and their scratch removed
//! - Re-running skips completed pairs unless overwrite is set
//! - Unavailable codecs are dropped once; all unavailable aborts
//! - Environment-level failures abort with BatchError
//! - The output tree can be packed into a tarball, scratch excluded

use sb_common::CompressionFormat;
use sb_config::BenchConfig;
use sb_core::batch::{BatchError, BatchOrchestrator, SCRATCH_DIR_NAME};
use sb_core::codec::{CodecAdapter, CodecError, CodecOutcome, CodecProvider, InvocationConfig};
use sb_core::collect::HostInfo;
use sb_core::metrics::PointCloud;
use sb_core::stats::SceneStatsRecord;
use std::fs::{self, File};
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;

// ============================================================================
// Helpers
// ============================================================================

fn write_cloud(path: &Path, n: usize) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let xs = (0..n).map(|i| i as f32).collect();
    let ys = (0..n).map(|i| (i * 2) as f32).collect();
    let zs = vec![0.5; n];
    PointCloud::new(n)
        .with_column("x", xs)
        .and_then(|c| c.with_column("y", ys))
        .and_then(|c| c.with_column("z", zs))
        .and_then(|c| c.with_column("opacity", vec![0.25; n]))
        .expect("cloud")
        .write_binary(path)
        .expect("write");
}

fn write_tar_with_cloud(archive: &Path, member: &str) {
    let dir = tempdir().expect("tempdir");
    let cloud = dir.path().join("cloud.ply");
    write_cloud(&cloud, 8);
    let mut builder = tar::Builder::new(File::create(archive).unwrap());
    builder
        .append_path_with_name(&cloud, member)
        .expect("append");
    builder.finish().unwrap();
}

/// Copies clouds through unchanged; formats marked missing fail the probe.
struct CopyCodecs {
    adapters: Vec<CopyCodec>,
}

struct CopyCodec {
    format: CompressionFormat,
    missing: bool,
}

impl CopyCodecs {
    fn new(missing: &[CompressionFormat]) -> Self {
        Self {
            adapters: CompressionFormat::ALL
                .iter()
                .map(|f| CopyCodec {
                    format: *f,
                    missing: missing.contains(f),
                })
                .collect(),
        }
    }
}

impl CodecProvider for CopyCodecs {
    fn adapter(&self, format: CompressionFormat) -> &dyn CodecAdapter {
        self.adapters
            .iter()
            .find(|a| a.format == format)
            .expect("every format has an adapter")
    }
}

fn copy(input: &Path, output: &Path) -> Result<CodecOutcome, CodecError> {
    let bytes = fs::copy(input, output)?;
    Ok(CodecOutcome {
        duration: Duration::from_millis(1),
        output_bytes: bytes,
        peak_gpu_memory_mib: None,
    })
}

impl CodecAdapter for CopyCodec {
    fn format(&self) -> CompressionFormat {
        self.format
    }

    fn compress(
        &self,
        input_cloud: &Path,
        output: &Path,
        _config: &InvocationConfig,
    ) -> Result<CodecOutcome, CodecError> {
        copy(input_cloud, output)
    }

    fn decompress(
        &self,
        input: &Path,
        output_cloud: &Path,
        _config: &InvocationConfig,
    ) -> Result<CodecOutcome, CodecError> {
        copy(input, output_cloud)
    }

    fn probe(&self, _config: &InvocationConfig) -> Result<(), CodecError> {
        if self.missing {
            Err(CodecError::NotFound {
                tool: format!("fake-{}", self.format),
            })
        } else {
            Ok(())
        }
    }
}

fn config() -> BenchConfig {
    let mut config = BenchConfig::default();
    config.gpu.monitor = false;
    config
}

fn load_record(dir: &Path) -> SceneStatsRecord {
    SceneStatsRecord::load(&dir.join("compression_stats.json"))
        .expect("readable")
        .expect("exists")
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn corrupt_tar_is_skipped_and_valid_ply_completes() {
    let src = tempdir().expect("tempdir");
    let out = tempdir().expect("tempdir");
    fs::write(src.path().join("broken.tar"), vec![0x42; 2048]).unwrap();
    write_cloud(&src.path().join("scene_a.ply"), 16);

    let config = config();
    let codecs = CopyCodecs::new(&[]);
    let summary = BatchOrchestrator::new(&codecs, &config, HostInfo::unknown())
        .run_batch(src.path(), out.path(), &[CompressionFormat::Spz, CompressionFormat::Sog])
        .expect("batch runs");

    assert_eq!(summary.scenes_discovered, 2);
    assert_eq!(summary.scenes_processed, 1);
    assert_eq!(summary.archive_failures.len(), 1);
    assert!(summary.archive_failures[0].source.ends_with("broken.tar"));
    assert!(!out.path().join("broken").exists());

    let record = load_record(&out.path().join("scene_a"));
    assert!(record.entry(CompressionFormat::Spz).unwrap().is_success());
    assert!(record.entry(CompressionFormat::Sog).unwrap().is_success());
    assert!(out.path().join("scene_a/compressed/scene_a.spz").is_file());
    assert!(out
        .path()
        .join("scene_a/decompressed/scene_a_sog.ply")
        .is_file());
}

#[test]
fn archive_scene_is_extracted_and_cleaned_up() {
    let src = tempdir().expect("tempdir");
    let out = tempdir().expect("tempdir");
    fs::create_dir_all(src.path().join("garden")).unwrap();
    write_tar_with_cloud(
        &src.path().join("garden/scene_b.tar"),
        "scene_b/point_cloud/iteration_30000/point_cloud.ply",
    );

    let config = config();
    let codecs = CopyCodecs::new(&[]);
    let summary = BatchOrchestrator::new(&codecs, &config, HostInfo::unknown())
        .run_batch(src.path(), out.path(), &[CompressionFormat::Cply])
        .expect("batch runs");

    assert_eq!(summary.scenes_processed, 1);
    let record = load_record(&out.path().join("garden/scene_b"));
    let entry = record.entry(CompressionFormat::Cply).expect("entry");
    assert!(entry.is_success(), "{:?}", entry.failure);
    assert!(!out.path().join(SCRATCH_DIR_NAME).exists());
}

#[test]
fn path_filter_applies_to_archive_members() {
    let src = tempdir().expect("tempdir");
    let out = tempdir().expect("tempdir");
    write_tar_with_cloud(&src.path().join("a.tar"), "a/iteration_7000/point_cloud.ply");
    write_tar_with_cloud(&src.path().join("b.tar"), "b/iteration_30000/point_cloud.ply");

    let mut config = config();
    config.scan.path_filter = vec!["iteration_30000".into()];
    let codecs = CopyCodecs::new(&[]);
    let summary = BatchOrchestrator::new(&codecs, &config, HostInfo::unknown())
        .run_batch(src.path(), out.path(), &[CompressionFormat::Spz])
        .expect("batch runs");

    assert_eq!(summary.scenes_processed, 1);
    assert_eq!(summary.scenes_skipped, 1);
    assert!(out.path().join("b/compression_stats.json").is_file());
    assert!(!out.path().join("a").exists());
}

#[test]
fn rerun_skips_completed_pairs_unless_overwrite() {
    let src = tempdir().expect("tempdir");
    let out = tempdir().expect("tempdir");
    write_cloud(&src.path().join("scene_a.ply"), 16);

    let mut config = config();
    let codecs = CopyCodecs::new(&[]);
    let formats = [CompressionFormat::Spz];

    BatchOrchestrator::new(&codecs, &config, HostInfo::unknown())
        .run_batch(src.path(), out.path(), &formats)
        .expect("first");
    let first_run = load_record(&out.path().join("scene_a")).scene.last_run_id;

    let summary = BatchOrchestrator::new(&codecs, &config, HostInfo::unknown())
        .run_batch(src.path(), out.path(), &formats)
        .expect("second");
    assert_eq!(summary.per_format[&CompressionFormat::Spz].skipped, 1);
    assert_eq!(load_record(&out.path().join("scene_a")).scene.last_run_id, first_run);

    config.overwrite = true;
    let summary = BatchOrchestrator::new(&codecs, &config, HostInfo::unknown())
        .run_batch(src.path(), out.path(), &formats)
        .expect("third");
    assert_eq!(summary.per_format[&CompressionFormat::Spz].succeeded, 1);
    assert_ne!(load_record(&out.path().join("scene_a")).scene.last_run_id, first_run);
}

#[test]
fn missing_codec_is_reported_once() {
    let src = tempdir().expect("tempdir");
    let out = tempdir().expect("tempdir");
    write_cloud(&src.path().join("one.ply"), 4);
    write_cloud(&src.path().join("two.ply"), 4);

    let config = config();
    let codecs = CopyCodecs::new(&[CompressionFormat::Sog]);
    let summary = BatchOrchestrator::new(&codecs, &config, HostInfo::unknown())
        .run_batch(src.path(), out.path(), &CompressionFormat::ALL)
        .expect("batch runs");

    assert_eq!(summary.unavailable_formats.len(), 1);
    assert_eq!(summary.unavailable_formats[0].format, CompressionFormat::Sog);
    assert_eq!(summary.formats, vec![CompressionFormat::Spz, CompressionFormat::Cply]);
    assert_eq!(summary.per_format[&CompressionFormat::Spz].succeeded, 2);
    assert!(!summary.per_format.contains_key(&CompressionFormat::Sog));
}

#[test]
fn all_codecs_missing_aborts() {
    let src = tempdir().expect("tempdir");
    let out = tempdir().expect("tempdir");
    write_cloud(&src.path().join("one.ply"), 4);

    let config = config();
    let codecs = CopyCodecs::new(&CompressionFormat::ALL);
    let err = BatchOrchestrator::new(&codecs, &config, HostInfo::unknown())
        .run_batch(src.path(), out.path(), &[CompressionFormat::Spz])
        .unwrap_err();
    assert!(matches!(err, BatchError::NoCodecAvailable(_)));
}

#[test]
fn missing_source_aborts() {
    let out = tempdir().expect("tempdir");
    let config = config();
    let codecs = CopyCodecs::new(&[]);
    let err = BatchOrchestrator::new(&codecs, &config, HostInfo::unknown())
        .run_batch(&out.path().join("nope"), out.path(), &[CompressionFormat::Spz])
        .unwrap_err();
    assert!(matches!(err, BatchError::SourceNotFound(_)));
}

#[test]
fn output_root_inside_source_is_not_rescanned() {
    let src = tempdir().expect("tempdir");
    write_cloud(&src.path().join("scene_a.ply"), 4);
    let out = src.path().join("results");

    let config = config();
    let codecs = CopyCodecs::new(&[]);
    let orchestrator = BatchOrchestrator::new(&codecs, &config, HostInfo::unknown());
    orchestrator
        .run_batch(src.path(), &out, &[CompressionFormat::Spz])
        .expect("first");
    let summary = orchestrator
        .run_batch(src.path(), &out, &[CompressionFormat::Spz])
        .expect("second");
    assert_eq!(summary.scenes_discovered, 1);
}

#[test]
fn colliding_scene_directories_are_skipped() {
    let src = tempdir().expect("tempdir");
    let out = tempdir().expect("tempdir");
    write_cloud(&src.path().join("scene_a.ply"), 4);
    write_tar_with_cloud(&src.path().join("scene_a.tar"), "point_cloud.ply");

    let config = config();
    let codecs = CopyCodecs::new(&[]);
    let summary = BatchOrchestrator::new(&codecs, &config, HostInfo::unknown())
        .run_batch(src.path(), out.path(), &[CompressionFormat::Spz])
        .expect("batch runs");
    assert_eq!(summary.duplicate_scenes.len(), 1);
    assert_eq!(summary.scenes_processed, 1);
}

#[test]
fn archive_output_packs_results_without_scratch() {
    let src = tempdir().expect("tempdir");
    let work = tempdir().expect("tempdir");
    let out = work.path().join("results");
    write_cloud(&src.path().join("garden/scene_a.ply"), 8);
    write_tar_with_cloud(&src.path().join("scene_b.tar"), "scene_b/point_cloud.ply");

    let mut config = config();
    config.archive_output = true;
    config.keep_extracted = true;
    let codecs = CopyCodecs::new(&[]);
    let summary = BatchOrchestrator::new(&codecs, &config, HostInfo::unknown())
        .run_batch(src.path(), &out, &[CompressionFormat::Spz])
        .expect("batch runs");

    let archive = out.join("results.tar");
    assert_eq!(summary.output_archive.as_deref(), Some(archive.as_path()));
    assert!(summary.output_archive_error.is_none());
    assert!(out.join(SCRATCH_DIR_NAME).is_dir());

    let mut tar = tar::Archive::new(File::open(&archive).unwrap());
    let names: Vec<String> = tar
        .entries()
        .unwrap()
        .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
        .collect();
    assert!(names.contains(&"results/garden/scene_a/compression_stats.json".to_string()));
    assert!(names.contains(&"results/garden/scene_a/compressed/scene_a.spz".to_string()));
    assert!(names.contains(&"results/scene_b/compression_stats.json".to_string()));
    assert!(names.iter().all(|n| !n.contains(SCRATCH_DIR_NAME)), "{names:?}");
    assert!(names.iter().all(|n| !n.ends_with(".tar")), "{names:?}");
}

#[test]
fn output_is_not_archived_by_default() {
    let src = tempdir().expect("tempdir");
    let out = tempdir().expect("tempdir");
    write_cloud(&src.path().join("scene_a.ply"), 8);

    let config = config();
    let codecs = CopyCodecs::new(&[]);
    let summary = BatchOrchestrator::new(&codecs, &config, HostInfo::unknown())
        .run_batch(src.path(), out.path(), &[CompressionFormat::Sog])
        .expect("batch runs");
    assert!(summary.output_archive.is_none());
    let tars = fs::read_dir(out.path())
        .unwrap()
        .filter(|e| e.as_ref().unwrap().path().extension().is_some_and(|x| x == "tar"))
        .count();
    assert_eq!(tars, 0);
}
