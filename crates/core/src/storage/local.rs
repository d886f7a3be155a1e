//! Local disk backend.

use std::fs::{self, DirBuilder};
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};

use super::{EntryKind, EntryStat, StorageAdapter};

/// Storage rooted at a directory on the local filesystem.
///
/// Symlinks are reported as [`EntryKind::Other`] and never followed.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Create a backend rooted at `root`.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// The upload root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative storage path, rejecting anything that could escape the root.
    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsafe storage path: {path:?}"),
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl StorageAdapter for LocalStorage {
    fn is_local(&self) -> bool {
        true
    }

    fn list(&self, path: &str) -> io::Result<Vec<String>> {
        let dir = self.resolve(path)?;
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            // Non-UTF-8 names cannot be expressed as folder keys.
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        Ok(names)
    }

    fn stat(&self, path: &str) -> io::Result<Option<EntryStat>> {
        let full = self.resolve(path)?;
        let metadata = match fs::symlink_metadata(&full) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let file_type = metadata.file_type();
        let kind = if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        };

        Ok(Some(EntryStat {
            kind,
            size: if kind == EntryKind::File { metadata.len() } else { 0 },
            mtime: metadata.modified().ok().map(DateTime::<Utc>::from),
        }))
    }

    fn mkdir(&self, path: &str, mode: u32, recursive: bool) -> io::Result<()> {
        let full = self.resolve(path)?;
        DirBuilder::new()
            .recursive(recursive)
            .mode(mode)
            .create(full)
    }

    fn rename(&self, src: &str, dst: &str) -> io::Result<()> {
        fs::rename(self.resolve(src)?, self.resolve(dst)?)
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        let full = self.resolve(path)?;
        if fs::symlink_metadata(&full)?.is_dir() {
            fs::remove_dir(full)
        } else {
            fs::remove_file(full)
        }
    }
}
