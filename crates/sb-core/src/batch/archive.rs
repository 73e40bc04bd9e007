//! Archive scenes: `.tar` and `.zip` files holding exactly one point cloud.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("cannot open archive {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot read archive {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("archive {path} contains no point cloud")]
    NoCloud { path: PathBuf },

    #[error("archive {path} contains {count} point clouds, expected exactly one")]
    MultipleClouds { path: PathBuf, count: usize },

    #[error("unsupported archive type: {path}")]
    Unsupported { path: PathBuf },

    #[error("failed to extract {member} from {path}: {reason}")]
    Extract {
        path: PathBuf,
        member: String,
        reason: String,
    },

    #[error("failed to write archive {path}: {reason}")]
    Pack { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Tar,
    Zip,
}

impl ArchiveKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
        match ext.as_str() {
            "tar" => Some(Self::Tar),
            "zip" => Some(Self::Zip),
            _ => None,
        }
    }
}

fn is_cloud_member(member: &str, cloud_name: Option<&str>) -> bool {
    let path = Path::new(member);
    let is_ply = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("ply"));
    let name_ok = match cloud_name {
        None => true,
        Some(name) => path.file_name().is_some_and(|n| n == name),
    };
    is_ply && name_ok
}

/// Member paths of the point clouds inside an archive.
pub fn list_clouds(archive: &Path, cloud_name: Option<&str>) -> Result<Vec<String>, ArchiveError> {
    let kind = ArchiveKind::from_path(archive).ok_or_else(|| ArchiveError::Unsupported {
        path: archive.to_path_buf(),
    })?;
    let file = File::open(archive).map_err(|source| ArchiveError::Open {
        path: archive.to_path_buf(),
        source,
    })?;
    let read_err = |reason: String| ArchiveError::Read {
        path: archive.to_path_buf(),
        reason,
    };

    let mut members = Vec::new();
    match kind {
        ArchiveKind::Tar => {
            let mut tar = tar::Archive::new(file);
            let entries = tar.entries().map_err(|e| read_err(e.to_string()))?;
            for entry in entries {
                let entry = entry.map_err(|e| read_err(e.to_string()))?;
                if !entry.header().entry_type().is_file() {
                    continue;
                }
                let path = entry.path().map_err(|e| read_err(e.to_string()))?;
                members.push(path.to_string_lossy().into_owned());
            }
        }
        ArchiveKind::Zip => {
            let mut zip = zip::ZipArchive::new(file).map_err(|e| read_err(e.to_string()))?;
            for i in 0..zip.len() {
                let entry = zip.by_index(i).map_err(|e| read_err(e.to_string()))?;
                if entry.is_file() {
                    members.push(entry.name().to_string());
                }
            }
        }
    }

    members.retain(|m| is_cloud_member(m, cloud_name));
    Ok(members)
}

/// The only cloud member, or an error naming how many there were.
pub fn single_cloud(archive: &Path, mut members: Vec<String>) -> Result<String, ArchiveError> {
    match members.len() {
        0 => Err(ArchiveError::NoCloud {
            path: archive.to_path_buf(),
        }),
        1 => Ok(members.remove(0)),
        count => Err(ArchiveError::MultipleClouds {
            path: archive.to_path_buf(),
            count,
        }),
    }
}

/// A cloud extracted to a scratch directory. The directory is removed on
/// drop unless it was marked to be kept.
#[derive(Debug)]
pub struct ExtractedCloud {
    pub dir: PathBuf,
    pub cloud: PathBuf,
    pub member: String,
    keep: bool,
}

impl Drop for ExtractedCloud {
    fn drop(&mut self) {
        if self.keep {
            debug!(dir = %self.dir.display(), "keeping extracted scene");
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            warn!(dir = %self.dir.display(), error = %e, "failed to remove scratch directory");
        }
    }
}

/// Extract one member into a fresh directory under `scratch_root`.
pub fn extract_member(
    archive: &Path,
    member: &str,
    scratch_root: &Path,
    keep: bool,
) -> Result<ExtractedCloud, ArchiveError> {
    let extract_err = |reason: String| ArchiveError::Extract {
        path: archive.to_path_buf(),
        member: member.to_string(),
        reason,
    };
    let kind = ArchiveKind::from_path(archive).ok_or_else(|| ArchiveError::Unsupported {
        path: archive.to_path_buf(),
    })?;

    let dir = scratch_root.join(uuid::Uuid::new_v4().to_string());
    fs::create_dir_all(&dir).map_err(|e| extract_err(e.to_string()))?;
    // The guard removes the directory if extraction fails below.
    let mut extracted = ExtractedCloud {
        dir: dir.clone(),
        cloud: PathBuf::new(),
        member: member.to_string(),
        keep: false,
    };

    let file = File::open(archive).map_err(|source| ArchiveError::Open {
        path: archive.to_path_buf(),
        source,
    })?;

    let cloud = match kind {
        ArchiveKind::Tar => extract_tar_member(file, member, &dir).map_err(extract_err)?,
        ArchiveKind::Zip => extract_zip_member(file, member, &dir).map_err(extract_err)?,
    };

    extracted.cloud = cloud;
    extracted.keep = keep;
    Ok(extracted)
}

fn extract_tar_member(file: File, member: &str, dir: &Path) -> Result<PathBuf, String> {
    let mut tar = tar::Archive::new(file);
    for entry in tar.entries().map_err(|e| e.to_string())? {
        let mut entry = entry.map_err(|e| e.to_string())?;
        let path = entry.path().map_err(|e| e.to_string())?.into_owned();
        if path.to_string_lossy() != member {
            continue;
        }
        // unpack_in refuses paths escaping `dir`.
        let unpacked = entry.unpack_in(dir).map_err(|e| e.to_string())?;
        if !unpacked {
            return Err(format!("refusing to unpack unsafe path {member}"));
        }
        return Ok(dir.join(path));
    }
    Err("member not found".to_string())
}

fn extract_zip_member(file: File, member: &str, dir: &Path) -> Result<PathBuf, String> {
    let mut zip = zip::ZipArchive::new(file).map_err(|e| e.to_string())?;
    let mut entry = zip.by_name(member).map_err(|e| e.to_string())?;
    let relative = entry
        .enclosed_name()
        .ok_or_else(|| format!("refusing to unpack unsafe path {member}"))?;
    let target = dir.join(relative);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    let mut out = File::create(&target).map_err(|e| e.to_string())?;
    io::copy(&mut entry, &mut out).map_err(|e| e.to_string())?;
    Ok(target)
}

/// Pack the files under `root` into `<root>/<name>.tar`, where `<name>` is
/// the root's own name and every entry sits under `<name>/`.
///
/// Anything under `excluded` is left out, as is the archive itself. The
/// archive is written to a temp file and renamed into place.
pub fn pack_tree(root: &Path, excluded: &[PathBuf]) -> Result<PathBuf, ArchiveError> {
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "splat-bench-output".to_string());
    let target = root.join(format!("{name}.tar"));
    let pack_err = |reason: String| ArchiveError::Pack {
        path: target.clone(),
        reason,
    };

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.path() != target && !excluded.iter().any(|x| e.path().starts_with(x)));
    for entry in walker {
        let entry = entry.map_err(|e| pack_err(e.to_string()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    let tmp = NamedTempFile::new_in(root).map_err(|e| pack_err(e.to_string()))?;
    let mut builder = tar::Builder::new(tmp);
    for path in &files {
        let relative = path
            .strip_prefix(root)
            .map_err(|e| pack_err(e.to_string()))?;
        builder
            .append_path_with_name(path, Path::new(&name).join(relative))
            .map_err(|e| pack_err(format!("{}: {e}", path.display())))?;
    }
    let tmp = builder.into_inner().map_err(|e| pack_err(e.to_string()))?;
    tmp.persist(&target)
        .map_err(|e| pack_err(e.error.to_string()))?;
    info!(archive = %target.display(), files = files.len(), "output tree archived");
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_tar(path: &Path, members: &[(&str, &[u8])]) {
        let mut builder = tar::Builder::new(File::create(path).unwrap());
        for (name, data) in members {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.finish().unwrap();
    }

    fn write_zip(path: &Path, members: &[(&str, &[u8])]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        for (name, data) in members {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn tar_single_cloud_extracts_and_cleans_up() {
        let dir = tempdir().expect("tempdir");
        let archive = dir.path().join("scene_b.tar");
        write_tar(
            &archive,
            &[("scene_b/point_cloud.ply", b"ply data"), ("scene_b/cameras.json", b"{}")],
        );

        let members = list_clouds(&archive, None).expect("list");
        let member = single_cloud(&archive, members).expect("one cloud");
        assert_eq!(member, "scene_b/point_cloud.ply");

        let scratch = dir.path().join("scratch");
        let extracted = extract_member(&archive, &member, &scratch, false).expect("extract");
        assert_eq!(fs::read(&extracted.cloud).unwrap(), b"ply data");
        let extracted_dir = extracted.dir.clone();
        drop(extracted);
        assert!(!extracted_dir.exists());
    }

    #[test]
    fn zip_member_is_kept_when_requested() {
        let dir = tempdir().expect("tempdir");
        let archive = dir.path().join("scene_c.zip");
        write_zip(&archive, &[("point_cloud.ply", b"zip ply")]);

        let member = single_cloud(&archive, list_clouds(&archive, None).unwrap()).unwrap();
        let extracted = extract_member(&archive, &member, dir.path(), true).expect("extract");
        let cloud = extracted.cloud.clone();
        drop(extracted);
        assert_eq!(fs::read(cloud).unwrap(), b"zip ply");
    }

    #[test]
    fn multiple_clouds_are_rejected() {
        let dir = tempdir().expect("tempdir");
        let archive = dir.path().join("two.tar");
        write_tar(&archive, &[("a.ply", b"1"), ("b.ply", b"2")]);
        let members = list_clouds(&archive, None).unwrap();
        assert!(matches!(
            single_cloud(&archive, members),
            Err(ArchiveError::MultipleClouds { count: 2, .. })
        ));
        let named = list_clouds(&archive, Some("b.ply")).unwrap();
        assert_eq!(named, vec!["b.ply".to_string()]);
    }

    #[test]
    fn pack_tree_skips_excluded_dirs_and_itself() {
        let dir = tempdir().expect("tempdir");
        let root = dir.path().join("results");
        fs::create_dir_all(root.join("garden/scene_a/compressed")).unwrap();
        fs::create_dir_all(root.join(".scratch/abc")).unwrap();
        fs::write(root.join("garden/scene_a/compression_stats.json"), b"{}").unwrap();
        fs::write(root.join("garden/scene_a/compressed/scene_a.spz"), b"spz").unwrap();
        fs::write(root.join(".scratch/abc/point_cloud.ply"), b"ply").unwrap();
        fs::write(root.join("results.tar"), b"stale archive").unwrap();

        let archive = pack_tree(&root, &[root.join(".scratch")]).expect("pack");
        assert_eq!(archive, root.join("results.tar"));

        let mut tar = tar::Archive::new(File::open(&archive).unwrap());
        let mut names: Vec<String> = tar
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "results/garden/scene_a/compressed/scene_a.spz".to_string(),
                "results/garden/scene_a/compression_stats.json".to_string(),
            ]
        );
    }

    #[test]
    fn corrupt_tar_is_an_error() {
        let dir = tempdir().expect("tempdir");
        let archive = dir.path().join("broken.tar");
        fs::write(&archive, vec![0x5a; 1024]).unwrap();
        let result = list_clouds(&archive, None).and_then(|m| single_cloud(&archive, m));
        assert!(result.is_err());
    }
}
