//! Discovery of input files below `<root>/data`.
//!
//! The compilation layout is at most three levels deep: files may sit
//! directly in `data/`, in its subdirectories, or one level further down.
//! Directories found at the third level are ignored.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{error, info};
use thiserror::Error;
use walkdir::WalkDir;

use crate::logging::TRACE;

/// Name of the directory that must exist below the root path.
pub const DATA_DIR: &str = "data";

/// Deepest level below `data/` that is listed.
pub const MAX_DEPTH: usize = 3;

#[derive(Debug, Error)]
pub enum WalkError {
    #[error("no 'data' directory in given path {0}")]
    MissingDataDir(String),
    #[error("cannot list {path}: {source}")]
    UnreadableRoot {
        path: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug)]
pub struct DataWalker {
    data_dir: PathBuf,
}

impl DataWalker {
    pub fn new(root: &Path) -> Result<Self, WalkError> {
        let data_dir = root.join(DATA_DIR);
        if !data_dir.is_dir() {
            return Err(WalkError::MissingDataDir(root.display().to_string()));
        }
        fs::read_dir(&data_dir).map_err(|source| WalkError::UnreadableRoot {
            path: data_dir.display().to_string(),
            source,
        })?;
        info!(target: TRACE, "walking {}", data_dir.display());
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Input files in depth-first order, entries of each directory sorted by
    /// name. Unreadable directories are logged and skipped.
    pub fn files(&self) -> impl Iterator<Item = PathBuf> + '_ {
        WalkDir::new(&self.data_dir)
            .min_depth(1)
            .max_depth(MAX_DEPTH)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(e) if e.file_type().is_dir() => None,
                Ok(e) => Some(e.into_path()),
                Err(e) => {
                    let at = e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| self.data_dir.display().to_string());
                    error!(target: TRACE, "skipping {}: {}", at, e);
                    None
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(p: &Path) {
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, b"x@y.com:pw\n").unwrap();
    }

    #[test]
    fn missing_data_dir_is_reported() {
        let dir = tempdir().unwrap();
        let err = DataWalker::new(dir.path()).unwrap_err();
        assert!(matches!(err, WalkError::MissingDataDir(_)));
        assert!(err.to_string().contains("no 'data' directory"));
    }

    #[test]
    fn data_as_plain_file_is_not_a_data_dir() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("data"), b"").unwrap();
        assert!(DataWalker::new(dir.path()).is_err());
    }

    #[test]
    fn walks_three_levels_sorted_and_ignores_deeper_dirs() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("data");
        touch(&data.join("b.txt"));
        touch(&data.join("a/2.txt"));
        touch(&data.join("a/1/z.txt"));
        touch(&data.join("a/1/y.txt"));
        touch(&data.join("a/1/deep/never.txt"));
        touch(&data.join("0/top.txt"));

        let w = DataWalker::new(dir.path()).unwrap();
        let rel: Vec<String> = w
            .files()
            .map(|p| {
                p.strip_prefix(&data)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        assert_eq!(rel, vec!["0/top.txt", "a/1/y.txt", "a/1/z.txt", "a/2.txt", "b.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_branch_is_skipped() {
        use std::os::unix::fs::symlink;

        let dir = tempdir().unwrap();
        let data = dir.path().join("data");
        touch(&data.join("b/ok.txt"));
        symlink(data.join("nowhere"), data.join("a-dangling")).unwrap();
        symlink(&data, data.join("c-loop")).unwrap();

        let w = DataWalker::new(dir.path()).unwrap();
        let rel: Vec<String> = w
            .files()
            .map(|p| p.strip_prefix(&data).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(rel, vec!["b/ok.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn unlistable_data_dir_is_an_error() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let data = dir.path().join("data");
        fs::create_dir(&data).unwrap();
        fs::set_permissions(&data, fs::Permissions::from_mode(0o000)).unwrap();
        let listable = fs::read_dir(&data).is_ok();
        let result = DataWalker::new(dir.path());
        fs::set_permissions(&data, fs::Permissions::from_mode(0o755)).unwrap();
        // root ignores permission bits
        if !listable {
            assert!(matches!(result, Err(WalkError::UnreadableRoot { .. })));
        }
    }

    #[test]
    fn empty_data_dir_yields_nothing() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("data")).unwrap();
        let w = DataWalker::new(dir.path()).unwrap();
        assert_eq!(w.files().count(), 0);
        assert!(w.data_dir().ends_with("data"));
    }
}
