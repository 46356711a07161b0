use std::fs;
use std::io;
use std::path::Path;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use tempfile::{Builder, TempDir};

use crate::domain::{DatasetKind, Organism};
use crate::error::RefsError;
use crate::staleness::parse_folder_date;

pub const STAGING_PREFIX: &str = ".staging-";

static RMLST_FOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^2").unwrap());
static MLST_FOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[^.]").unwrap());

/// On-disk layout of the reference directory:
/// `<root>/rMLST/<date>/` and `<root>/MLST/<Genus>/<date>/`.
#[derive(Debug, Clone)]
pub struct Store {
    reference_root: Utf8PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionFolder {
    pub name: String,
    pub path: Utf8PathBuf,
    pub date: Option<NaiveDate>,
    pub total_bytes: u64,
}

impl VersionFolder {
    pub fn is_valid(&self, min_bytes: u64) -> bool {
        self.total_bytes >= min_bytes
    }
}

/// A fetch target that is not yet visible under its dated name. Dropping it
/// removes the directory.
#[derive(Debug)]
pub struct StagedFolder {
    dir: TempDir,
    path: Utf8PathBuf,
}

impl StagedFolder {
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn discard(self) -> Result<(), RefsError> {
        self.dir
            .close()
            .map_err(|err| RefsError::Filesystem(format!("remove staging folder: {err}")))
    }
}

impl Store {
    pub fn new(reference_root: Utf8PathBuf) -> Self {
        Self { reference_root }
    }

    pub fn reference_root(&self) -> &Utf8Path {
        &self.reference_root
    }

    pub fn rmlst_dir(&self) -> Utf8PathBuf {
        self.reference_root.join("rMLST")
    }

    pub fn mlst_dir(&self, organism: &Organism) -> Utf8PathBuf {
        self.reference_root
            .join("MLST")
            .join(organism.dataset_organism().as_str())
    }

    pub fn ensure_dir(path: &Utf8Path) -> Result<(), RefsError> {
        fs::create_dir_all(path.as_std_path())
            .map_err(|err| RefsError::Filesystem(format!("create {path}: {err}")))
    }

    /// Version folders under `root`, newest first. A missing root has none.
    pub fn list_version_folders(
        root: &Utf8Path,
        kind: DatasetKind,
    ) -> Result<Vec<VersionFolder>, RefsError> {
        let pattern = match kind {
            DatasetKind::Rmlst => &*RMLST_FOLDER,
            DatasetKind::Mlst => &*MLST_FOLDER,
        };
        let entries = match fs::read_dir(root.as_std_path()) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(RefsError::Filesystem(format!("read {root}: {err}"))),
        };

        let mut folders = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| RefsError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if name.starts_with(STAGING_PREFIX) || !pattern.is_match(name) {
                continue;
            }
            let path = root.join(name);
            folders.push(VersionFolder {
                name: name.to_string(),
                date: parse_folder_date(name),
                total_bytes: Self::compute_folder_size(&path),
                path,
            });
        }
        folders.sort_by(|a, b| b.name.cmp(&a.name));
        Ok(folders)
    }

    pub fn find_latest_folder(
        root: &Utf8Path,
        kind: DatasetKind,
    ) -> Result<Option<VersionFolder>, RefsError> {
        Ok(Self::list_version_folders(root, kind)?.into_iter().next())
    }

    pub fn find_latest_valid_folder(
        root: &Utf8Path,
        kind: DatasetKind,
        min_bytes: u64,
    ) -> Result<Option<VersionFolder>, RefsError> {
        Ok(Self::list_version_folders(root, kind)?
            .into_iter()
            .find(|folder| folder.is_valid(min_bytes)))
    }

    /// Sum of the regular files directly inside `path`. Zero when the path
    /// does not exist or is not a directory.
    pub fn compute_folder_size(path: &Utf8Path) -> u64 {
        let Ok(entries) = fs::read_dir(path.as_std_path()) else {
            return 0;
        };
        entries
            .flatten()
            .filter_map(|entry| fs::metadata(entry.path()).ok())
            .filter(|meta| meta.is_file())
            .map(|meta| meta.len())
            .sum()
    }

    pub fn delete_folder(path: &Utf8Path) -> Result<(), RefsError> {
        fs::remove_dir_all(path.as_std_path())
            .map_err(|err| RefsError::Filesystem(format!("remove {path}: {err}")))
    }

    pub fn stage_folder(root: &Utf8Path, date: NaiveDate) -> Result<StagedFolder, RefsError> {
        Self::ensure_dir(root)?;
        let dir = Builder::new()
            .prefix(&format!("{STAGING_PREFIX}{date}-"))
            .tempdir_in(root.as_std_path())
            .map_err(|err| RefsError::Filesystem(err.to_string()))?;
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
            .map_err(|_| RefsError::Filesystem("invalid staging dir".to_string()))?;
        Ok(StagedFolder { dir, path })
    }

    /// Moves a staged folder to `dest`, replacing whatever is there.
    pub fn commit_staged(staged: StagedFolder, dest: &Utf8Path) -> Result<Utf8PathBuf, RefsError> {
        let StagedFolder { dir, path } = staged;
        let kept = dir.keep();
        if let Err(err) = atomic_rename_dir(&kept, dest.as_std_path()) {
            let _ = fs::remove_dir_all(&kept);
            return Err(RefsError::Filesystem(format!(
                "commit {path} to {dest}: {err}"
            )));
        }
        Ok(dest.to_path_buf())
    }

    /// Removes staging folders left behind by an interrupted run.
    pub fn sweep_staging(root: &Utf8Path) -> Result<usize, RefsError> {
        let entries = match fs::read_dir(root.as_std_path()) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(RefsError::Filesystem(format!("read {root}: {err}"))),
        };
        let mut removed = 0;
        for entry in entries.flatten() {
            let is_staging = entry
                .file_name()
                .to_str()
                .map(|name| name.starts_with(STAGING_PREFIX))
                .unwrap_or(false);
            if is_staging && entry.path().is_dir() {
                fs::remove_dir_all(entry.path())
                    .map_err(|err| RefsError::Filesystem(err.to_string()))?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), RefsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| RefsError::Filesystem(err.to_string()))?;
        }
        let tmp_path = path.with_extension("tmp");
        fs::write(tmp_path.as_std_path(), content)
            .map_err(|err| RefsError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| RefsError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

pub fn atomic_rename_dir(from: &Path, to: &Path) -> io::Result<()> {
    if to.exists() {
        fs::remove_dir_all(to)?;
    }
    fs::rename(from, to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = Store::new(Utf8PathBuf::from("/refs"));
        let shigella: Organism = "Shigella".parse().unwrap();

        assert!(store.rmlst_dir().ends_with("rMLST"));
        assert!(store.mlst_dir(&shigella).ends_with("MLST/Escherichia"));
    }

    #[test]
    fn rmlst_pattern_skips_non_dated_folders() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        fs::create_dir(root.join("2020-01-01")).unwrap();
        fs::create_dir(root.join("archive")).unwrap();

        let rmlst = Store::list_version_folders(&root, DatasetKind::Rmlst).unwrap();
        assert_eq!(rmlst.len(), 1);
        let mlst = Store::list_version_folders(&root, DatasetKind::Mlst).unwrap();
        assert_eq!(mlst.len(), 2);
    }
}
