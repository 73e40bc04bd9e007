//! Point correspondence between an original and a restored cloud.
//!
//! Codecs may reorder points (SOG and Compressed-PLY sort them), so
//! index alignment cannot be assumed. `auto` verifies it before use.

use rstar::primitives::GeomWithData;
use rstar::RTree;
use sb_config::{MatchStrategy, MetricSettings};
use tracing::debug;

type IndexedPoint = GeomWithData<[f32; 3], usize>;

/// Matched `(original_index, restored_index)` pairs and the strategy used.
#[derive(Debug, Clone, PartialEq)]
pub struct Correspondence {
    pub strategy: MatchStrategy,
    pub pairs: Vec<(usize, usize)>,
}

impl Correspondence {
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Build a correspondence following the configured strategy.
///
/// The returned strategy is never `Auto`; it names what was actually used.
pub fn correspond(
    original: &[[f32; 3]],
    restored: &[[f32; 3]],
    settings: &MetricSettings,
) -> Correspondence {
    let same_len = original.len() == restored.len();
    let use_identity = match settings.match_strategy {
        MatchStrategy::Identity if same_len => true,
        MatchStrategy::Identity => {
            debug!(
                original = original.len(),
                restored = restored.len(),
                "identity matching needs equal counts, using nearest neighbor"
            );
            false
        }
        MatchStrategy::NearestNeighbor => false,
        MatchStrategy::Auto => {
            same_len && identity_holds(original, restored, settings.identity_tolerance)
        }
    };

    if use_identity {
        Correspondence {
            strategy: MatchStrategy::Identity,
            pairs: (0..original.len()).map(|i| (i, i)).collect(),
        }
    } else {
        Correspondence {
            strategy: MatchStrategy::NearestNeighbor,
            pairs: nearest_neighbor_pairs(original, restored),
        }
    }
}

/// Every index-aligned pair lies within `tolerance × bbox diagonal`.
fn identity_holds(original: &[[f32; 3]], restored: &[[f32; 3]], tolerance: f64) -> bool {
    let limit = bbox_diagonal(original) * tolerance;
    original
        .iter()
        .zip(restored)
        .all(|(a, b)| distance(a, b) <= limit)
}

/// Diagonal length of the axis-aligned bounding box.
pub fn bbox_diagonal(points: &[[f32; 3]]) -> f64 {
    let mut min = [f64::INFINITY; 3];
    let mut max = [f64::NEG_INFINITY; 3];
    for p in points {
        for axis in 0..3 {
            let v = f64::from(p[axis]);
            min[axis] = min[axis].min(v);
            max[axis] = max[axis].max(v);
        }
    }
    if points.is_empty() {
        return 0.0;
    }
    (0..3)
        .map(|axis| (max[axis] - min[axis]).powi(2))
        .sum::<f64>()
        .sqrt()
}

pub(crate) fn distance(a: &[f32; 3], b: &[f32; 3]) -> f64 {
    (0..3)
        .map(|axis| (f64::from(a[axis]) - f64::from(b[axis])).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Map each restored point to its nearest original point.
fn nearest_neighbor_pairs(original: &[[f32; 3]], restored: &[[f32; 3]]) -> Vec<(usize, usize)> {
    let tree: RTree<IndexedPoint> = RTree::bulk_load(
        original
            .iter()
            .enumerate()
            .map(|(i, p)| IndexedPoint::new(*p, i))
            .collect(),
    );
    restored
        .iter()
        .enumerate()
        .filter_map(|(j, p)| tree.nearest_neighbor(p).map(|hit| (hit.data, j)))
        .collect()
}
