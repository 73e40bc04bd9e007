//! Mirrored output layout. Pure path computation, no I/O.

use std::path::{Path, PathBuf};

use sb_common::CompressionFormat;

use crate::roundtrip::RoundTripPaths;
use crate::scene::Scene;

/// Where a scene's artifacts and record live under the output root:
///
/// ```text
/// <output>/<relative dir>/<scene>/
///     compressed/<scene>.<ext>
///     decompressed/<scene>_<format>.ply
///     compression_stats.json
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneLayout {
    pub scene_dir: PathBuf,
    name: String,
}

impl SceneLayout {
    pub fn for_scene(output_root: &Path, scene: &Scene) -> Self {
        Self {
            scene_dir: output_root.join(&scene.relative_dir).join(&scene.name),
            name: scene.name.clone(),
        }
    }

    /// Directory holding the scene's statistics record.
    pub fn record_dir(&self) -> &Path {
        &self.scene_dir
    }

    pub fn compressed(&self, format: CompressionFormat) -> PathBuf {
        self.scene_dir
            .join("compressed")
            .join(format!("{}.{}", self.name, format.extension()))
    }

    pub fn decompressed(&self, format: CompressionFormat) -> PathBuf {
        self.scene_dir
            .join("decompressed")
            .join(format!("{}_{}.ply", self.name, format.as_str()))
    }

    pub fn paths(&self, input: &Path, format: CompressionFormat) -> RoundTripPaths {
        RoundTripPaths {
            input: input.to_path_buf(),
            compressed: self.compressed(format),
            decompressed: self.decompressed(format),
        }
    }
}
