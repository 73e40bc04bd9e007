//! Scenes: the unit of work of a benchmark run.

use schemars::JsonSchema;
use sb_common::SceneId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How a scene's point cloud is stored in the source tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SceneKind {
    /// A `.ply` file lying directly in the source tree.
    LooseFile,
    /// The single point cloud inside a `.tar` or `.zip` archive.
    ArchiveMember,
}

/// One point-cloud dataset to benchmark. Read-only once discovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scene {
    pub id: SceneId,
    /// Short name used for artifact file names (file or archive stem).
    pub name: String,
    /// The loose file or archive in the source tree.
    pub source_path: PathBuf,
    pub kind: SceneKind,
    /// Directory of `source_path` relative to the source root.
    pub relative_dir: PathBuf,
}

impl Scene {
    /// Build a scene from a source file and its path relative to the source root.
    pub fn new(source_path: PathBuf, relative_path: &Path, kind: SceneKind) -> Self {
        let name = scene_name(&source_path);
        let relative_dir = relative_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self {
            id: SceneId::from_relative(relative_path),
            name,
            source_path,
            kind,
            relative_dir,
        }
    }

    /// A standalone scene for a single file given on the command line.
    pub fn from_file(path: &Path) -> Self {
        let relative = path.file_name().map(PathBuf::from).unwrap_or_default();
        Self::new(path.to_path_buf(), &relative, SceneKind::LooseFile)
    }
}

/// File stem of the source; only the last extension is removed.
fn scene_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "scene".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loose_scene_fields() {
        let scene = Scene::new(
            PathBuf::from("/data/garden/scene_a.ply"),
            Path::new("garden/scene_a.ply"),
            SceneKind::LooseFile,
        );
        assert_eq!(scene.name, "scene_a");
        assert_eq!(scene.id.0, "garden/scene_a.ply");
        assert_eq!(scene.relative_dir, PathBuf::from("garden"));
    }

    #[test]
    fn archive_scene_name_drops_extension() {
        let scene = Scene::new(
            PathBuf::from("/data/bicycle.tar"),
            Path::new("bicycle.tar"),
            SceneKind::ArchiveMember,
        );
        assert_eq!(scene.name, "bicycle");
        assert_eq!(scene.relative_dir, PathBuf::new());
    }

    #[test]
    fn name_strips_only_last_extension() {
        assert_eq!(scene_name(Path::new("garden/site.tar.ply")), "site.tar");
        assert_eq!(scene_name(Path::new("room.v2.tar")), "room.v2");
    }

    #[test]
    fn from_file_uses_file_name_as_id() {
        let scene = Scene::from_file(Path::new("/tmp/x/scene_b.ply"));
        assert_eq!(scene.id.0, "scene_b.ply");
        assert_eq!(scene.kind, SceneKind::LooseFile);
    }
}
