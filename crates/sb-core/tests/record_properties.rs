//! Property tests for statistics record merging.
//!
//! Validates:
//! - After any sequence of merges each format holds its last result
//! - A merge never changes another format's serialized entry
//! - Records re-read from disk equal what was written

use chrono::Utc;
use proptest::prelude::*;
use sb_common::{CompressionFormat, RunId};
use sb_config::RecordSettings;
use sb_core::collect::HostInfo;
use sb_core::roundtrip::{
    Artifacts, FailureKind, RoundTripResult, RunStatus, Stage, StageFailure,
};
use sb_core::scene::Scene;
use sb_core::stats::StatsAggregator;
use std::collections::BTreeMap;
use std::path::Path;
use tempfile::tempdir;

fn format_strategy() -> impl Strategy<Value = CompressionFormat> {
    prop_oneof![
        Just(CompressionFormat::Spz),
        Just(CompressionFormat::Sog),
        Just(CompressionFormat::Cply),
    ]
}

/// (format, succeeded, compressed bytes, rmse)
fn merge_strategy() -> impl Strategy<Value = (CompressionFormat, bool, u64, f64)> {
    (
        format_strategy(),
        any::<bool>(),
        1u64..10_000_000,
        0.0f64..10.0,
    )
}

fn result_for(
    dir: &Path,
    format: CompressionFormat,
    success: bool,
    compressed: u64,
    rmse: f64,
) -> RoundTripResult {
    let original = 10_000_000u64;
    let mut metrics = BTreeMap::new();
    let failure = if success {
        metrics.insert("compression_ratio".to_string(), original as f64 / compressed as f64);
        metrics.insert("position_rmse".to_string(), rmse);
        None
    } else {
        Some(StageFailure {
            stage: Stage::Decompress,
            kind: FailureKind::CodecInvocation,
            reason: format!("exit status 1 after {compressed} bytes"),
        })
    };
    RoundTripResult {
        format,
        status: if success {
            RunStatus::Success
        } else {
            RunStatus::Failed
        },
        failure,
        original_size_bytes: Some(original),
        compressed_size_bytes: Some(compressed),
        restored_size_bytes: success.then_some(original),
        compression_time_seconds: Some(rmse / 3.0),
        decompression_time_seconds: success.then_some(rmse / 7.0),
        peak_gpu_memory_mib: None,
        metrics,
        fidelity: None,
        artifacts: Artifacts {
            input: dir.join("scene.ply"),
            compressed: dir.join(format!("scene.{}", format.extension())),
            decompressed: dir.join(format!("scene_decompressed_{format}.ply")),
        },
        host: HostInfo::unknown(),
        run_id: RunId::new(),
        recorded_at: Utc::now(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn each_format_keeps_its_last_result(
        merges in prop::collection::vec(merge_strategy(), 1..8)
    ) {
        let dir = tempdir().unwrap();
        let scene = Scene::from_file(&dir.path().join("scene.ply"));
        let aggregator = StatsAggregator::new(&RecordSettings::default());
        let mut expected: BTreeMap<String, RoundTripResult> = BTreeMap::new();

        for (format, success, compressed, rmse) in merges {
            let before = aggregator.load(dir.path()).unwrap();
            let result = result_for(dir.path(), format, success, compressed, rmse);
            let outcome = aggregator
                .merge_and_persist(&scene, dir.path(), result.clone())
                .unwrap();
            prop_assert_eq!(outcome.replaced, expected.contains_key(&format.to_string()));
            prop_assert!(outcome.corruption.is_none());

            let after = aggregator.load(dir.path()).unwrap().unwrap();
            if let Some(before) = before {
                for (key, entry) in &before.results {
                    if key != &format.to_string() {
                        prop_assert_eq!(
                            serde_json::to_string(entry).unwrap(),
                            serde_json::to_string(&after.results[key]).unwrap()
                        );
                    }
                }
            }
            expected.insert(format.to_string(), result);
        }

        let record = aggregator.load(dir.path()).unwrap().unwrap();
        let stored: BTreeMap<String, RoundTripResult> = record
            .entries()
            .map(|(key, entry)| (key.to_string(), entry.unwrap()))
            .collect();
        prop_assert_eq!(stored, expected);
    }

    #[test]
    fn has_success_tracks_latest_status(
        first in any::<bool>(),
        second in any::<bool>(),
        format in format_strategy(),
    ) {
        let dir = tempdir().unwrap();
        let scene = Scene::from_file(&dir.path().join("scene.ply"));
        let aggregator = StatsAggregator::new(&RecordSettings::default());

        aggregator
            .merge_and_persist(&scene, dir.path(), result_for(dir.path(), format, first, 10, 0.5))
            .unwrap();
        prop_assert_eq!(aggregator.has_success(dir.path(), format), first);

        aggregator
            .merge_and_persist(&scene, dir.path(), result_for(dir.path(), format, second, 20, 0.25))
            .unwrap();
        prop_assert_eq!(aggregator.has_success(dir.path(), format), second);
    }
}
