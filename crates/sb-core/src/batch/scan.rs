//! Source tree discovery.

use std::path::{Path, PathBuf};

use sb_config::ScanSettings;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::scene::{Scene, SceneKind};

/// Classify a file by extension.
pub fn scene_kind(path: &Path) -> Option<SceneKind> {
    let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
    match ext.as_str() {
        "ply" => Some(SceneKind::LooseFile),
        "tar" | "zip" => Some(SceneKind::ArchiveMember),
        _ => None,
    }
}

/// Whether `candidate` contains any filter substring. No filters keeps all.
pub fn matches_filter(filters: &[String], candidate: &str) -> bool {
    filters.is_empty() || filters.iter().any(|f| candidate.contains(f.as_str()))
}

/// Whether a cloud file name passes `cloud_file_name`.
pub fn matches_cloud_name(settings: &ScanSettings, path: &Path) -> bool {
    match &settings.cloud_file_name {
        None => true,
        Some(name) => path.file_name().is_some_and(|n| n == name.as_str()),
    }
}

/// Discover scenes under `source_root` in deterministic order.
///
/// Paths under any of `excluded` (the output root and scratch directory
/// when nested in the source) are not descended into. Loose `.ply` files
/// are filtered here; archives are kept and filtered on their member path
/// once it is known.
pub fn discover(source_root: &Path, excluded: &[PathBuf], settings: &ScanSettings) -> Vec<Scene> {
    if source_root.is_file() {
        let scene = Scene::from_file(source_root);
        return match scene_kind(source_root) {
            Some(SceneKind::LooseFile) if !matches_cloud_name(settings, source_root) => Vec::new(),
            Some(kind) => vec![Scene { kind, ..scene }],
            None => {
                warn!(path = %source_root.display(), "source file is neither a .ply nor an archive");
                Vec::new()
            }
        };
    }

    let root = source_root
        .canonicalize()
        .unwrap_or_else(|_| source_root.to_path_buf());
    let excluded: Vec<PathBuf> = excluded
        .iter()
        .map(|p| p.canonicalize().unwrap_or_else(|_| p.clone()))
        .collect();

    let mut scenes = Vec::new();
    let walker = WalkDir::new(&root)
        .follow_links(settings.follow_links)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !excluded.iter().any(|ex| entry.path().starts_with(ex)));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable path during scan");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(kind) = scene_kind(path) else {
            continue;
        };
        let Ok(relative) = path.strip_prefix(&root) else {
            continue;
        };
        let scene = Scene::new(path.to_path_buf(), relative, kind);

        if kind == SceneKind::LooseFile {
            if !matches_cloud_name(settings, path) {
                continue;
            }
            if !matches_filter(&settings.path_filter, &scene.id.0) {
                debug!(scene = %scene.id, "filtered out");
                continue;
            }
        }
        scenes.push(scene);
    }
    scenes
}
