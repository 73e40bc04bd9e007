//! Metric engine: size and fidelity measures for one round trip.
//!
//! Fidelity is computed over a [`Correspondence`](matching::Correspondence)
//! between the original and restored clouds. Attribute metrics are only
//! reported for attributes present in both clouds; the metric engine never
//! reports zeros for something it could not measure.

pub mod cloud;
pub mod matching;

use std::collections::BTreeMap;

use schemars::JsonSchema;
use sb_config::{MatchStrategy, MetricSettings};
use sb_math::{
    bytes_to_mib, compression_ratio, psnr, quaternion_angle_deg, sigmoid,
    size_reduction_percent, ErrorStats,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use cloud::{CloudError, PointCloud};
pub use matching::{correspond, Correspondence};

/// Zeroth-order spherical-harmonic basis constant.
pub const SH_C0: f64 = 0.282_094_791_773_878_14;

const SCALE_COLUMNS: [&str; 3] = ["scale_0", "scale_1", "scale_2"];
const ROT_COLUMNS: [&str; 4] = ["rot_0", "rot_1", "rot_2", "rot_3"];
const DC_COLUMNS: [&str; 3] = ["f_dc_0", "f_dc_1", "f_dc_2"];

#[derive(Debug, Error)]
pub enum MetricError {
    #[error("{side} cloud is missing position column(s) x/y/z")]
    MissingPositions { side: &'static str },

    #[error("{side} cloud has no points")]
    EmptyCloud { side: &'static str },

    #[error("compressed size is zero")]
    ZeroCompressedSize,

    #[error("{side} cloud has non-finite positions")]
    NonFinitePositions { side: &'static str },

    #[error("metric '{name}' is not finite")]
    NonFinite { name: String },

    #[error("no point correspondence could be established")]
    NoCorrespondence,

    #[error(transparent)]
    Cloud(#[from] CloudError),
}

/// How the fidelity metrics were obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FidelitySummary {
    /// Strategy actually used (never `auto`).
    pub match_strategy: MatchStrategy,
    pub matched_points: u64,
    pub point_count_original: u64,
    pub point_count_restored: u64,
    /// `restored - original`.
    pub point_count_delta: i64,
    /// Point counts differ, so fidelity covers only the matched subset.
    pub partial_fidelity: bool,
}

/// Output of [`evaluate`].
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSet {
    pub values: BTreeMap<String, f64>,
    pub fidelity: FidelitySummary,
}

impl MetricSet {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}

/// Compare a restored cloud against its original.
pub fn evaluate(
    original: &PointCloud,
    restored: &PointCloud,
    original_size_bytes: u64,
    compressed_size_bytes: u64,
    settings: &MetricSettings,
) -> Result<MetricSet, MetricError> {
    let ratio =
        compression_ratio(original_size_bytes, compressed_size_bytes).ok_or(MetricError::ZeroCompressedSize)?;
    let reduction = size_reduction_percent(original_size_bytes, compressed_size_bytes)
        .ok_or(MetricError::ZeroCompressedSize)?;

    let orig_pos = positions(original, "original")?;
    let rest_pos = positions(restored, "restored")?;

    let matches = correspond(&orig_pos, &rest_pos, settings);
    if matches.is_empty() {
        return Err(MetricError::NoCorrespondence);
    }

    let mut values = BTreeMap::new();
    values.insert("compression_ratio".to_string(), ratio);
    values.insert("size_reduction_percent".to_string(), reduction);
    values.insert("original_size_mb".to_string(), bytes_to_mib(original_size_bytes));
    values.insert("compressed_size_mb".to_string(), bytes_to_mib(compressed_size_bytes));

    let mut position = ErrorStats::new();
    for (i, j) in &matches.pairs {
        position.push(matching::distance(&orig_pos[*i], &rest_pos[*j]));
    }
    insert_stats(&mut values, &position, "position_rmse", "position_mean_error", Some("position_max_error"));

    if let Some(color) = color_stats(original, restored, &matches) {
        if let Some(rmse) = color.rmse() {
            values.insert("color_rmse".to_string(), rmse);
        }
        if let Some(mse) = color.mse() {
            values.insert("color_psnr_db".to_string(), psnr(mse, 1.0));
        }
    }

    if let Some(stats) = paired_stats(original, restored, &matches, &["opacity"], sigmoid) {
        if let Some(mae) = stats.mean() {
            values.insert("opacity_mae".to_string(), mae);
        }
    }

    // Scales are stored as logarithms already.
    if let Some(stats) = paired_stats(original, restored, &matches, &SCALE_COLUMNS, |v| v) {
        if let Some(mae) = stats.mean() {
            values.insert("scale_mae".to_string(), mae);
        }
    }

    if let Some(stats) = rotation_stats(original, restored, &matches) {
        if let Some(mean) = stats.mean() {
            values.insert("rotation_mean_error_deg".to_string(), mean);
        }
    }

    let rest_columns = shared_sh_rest(original, restored);
    if !rest_columns.is_empty() {
        let names: Vec<&str> = rest_columns.iter().map(String::as_str).collect();
        if let Some(stats) = paired_stats(original, restored, &matches, &names, |v| v) {
            if let Some(rmse) = stats.rmse() {
                values.insert("sh_rest_rmse".to_string(), rmse);
            }
        }
    }

    let fidelity = FidelitySummary {
        match_strategy: matches.strategy,
        matched_points: matches.len() as u64,
        point_count_original: original.len() as u64,
        point_count_restored: restored.len() as u64,
        point_count_delta: restored.len() as i64 - original.len() as i64,
        partial_fidelity: original.len() != restored.len(),
    };
    values.insert("matched_points".to_string(), fidelity.matched_points as f64);
    values.insert("point_count_original".to_string(), fidelity.point_count_original as f64);
    values.insert("point_count_restored".to_string(), fidelity.point_count_restored as f64);
    values.insert("point_count_delta".to_string(), fidelity.point_count_delta as f64);

    if let Some((name, _)) = values.iter().find(|(_, v)| !v.is_finite()) {
        return Err(MetricError::NonFinite { name: name.clone() });
    }

    Ok(MetricSet { values, fidelity })
}

fn positions(cloud: &PointCloud, side: &'static str) -> Result<Vec<[f32; 3]>, MetricError> {
    let points = cloud
        .positions()
        .ok_or(MetricError::MissingPositions { side })?;
    if points.is_empty() {
        return Err(MetricError::EmptyCloud { side });
    }
    if points.iter().flatten().any(|v| !v.is_finite()) {
        return Err(MetricError::NonFinitePositions { side });
    }
    Ok(points)
}

fn insert_stats(
    values: &mut BTreeMap<String, f64>,
    stats: &ErrorStats,
    rmse_key: &str,
    mean_key: &str,
    max_key: Option<&str>,
) {
    if let Some(v) = stats.rmse() {
        values.insert(rmse_key.to_string(), v);
    }
    if let Some(v) = stats.mean() {
        values.insert(mean_key.to_string(), v);
    }
    if let (Some(key), Some(v)) = (max_key, stats.max()) {
        values.insert(key.to_string(), v);
    }
}

/// Columns present in both clouds, or `None` if any is missing on either side.
fn shared_columns<'a>(
    original: &'a PointCloud,
    restored: &'a PointCloud,
    names: &[&str],
) -> Option<Vec<(&'a [f32], &'a [f32])>> {
    names
        .iter()
        .map(|name| Some((original.column(name)?, restored.column(name)?)))
        .collect()
}

/// Per-value residuals of `map(original) - map(restored)` over matched pairs.
fn paired_stats(
    original: &PointCloud,
    restored: &PointCloud,
    matches: &Correspondence,
    names: &[&str],
    map: impl Fn(f64) -> f64,
) -> Option<ErrorStats> {
    let columns = shared_columns(original, restored, names)?;
    let mut stats = ErrorStats::new();
    for (a, b) in &columns {
        for (i, j) in &matches.pairs {
            stats.push(map(f64::from(a[*i])) - map(f64::from(b[*j])));
        }
    }
    Some(stats)
}

/// RGB residuals from SH DC coefficients, clamped to `[0, 1]`.
fn color_stats(
    original: &PointCloud,
    restored: &PointCloud,
    matches: &Correspondence,
) -> Option<ErrorStats> {
    paired_stats(original, restored, matches, &DC_COLUMNS, dc_to_rgb)
}

pub fn dc_to_rgb(dc: f64) -> f64 {
    (0.5 + SH_C0 * dc).clamp(0.0, 1.0)
}

fn rotation_stats(
    original: &PointCloud,
    restored: &PointCloud,
    matches: &Correspondence,
) -> Option<ErrorStats> {
    let columns = shared_columns(original, restored, &ROT_COLUMNS)?;
    let quat = |side: usize, idx: usize| -> [f64; 4] {
        let mut q = [0.0; 4];
        for (k, (a, b)) in columns.iter().enumerate() {
            q[k] = f64::from(if side == 0 { a[idx] } else { b[idx] });
        }
        q
    };
    let mut stats = ErrorStats::new();
    for (i, j) in &matches.pairs {
        stats.push(quaternion_angle_deg(quat(0, *i), quat(1, *j)));
    }
    Some(stats)
}

/// `f_rest_*` columns present in both clouds.
fn shared_sh_rest(original: &PointCloud, restored: &PointCloud) -> Vec<String> {
    original
        .column_names()
        .filter(|name| name.starts_with("f_rest_") && restored.has_column(name))
        .map(str::to_string)
        .collect()
}
