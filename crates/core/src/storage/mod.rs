//! Storage backends.
//!
//! The namespace engine never touches the filesystem directly. Everything it
//! needs from a backend is the handful of primitives on [`StorageAdapter`],
//! addressed by `/`-joined paths relative to the upload root (the empty
//! string is the root itself).

pub mod local;
pub mod memory;

use std::io;

use chrono::{DateTime, Utc};

pub use local::LocalStorage;
pub use memory::{MemoryStorage, KEEP_MARKER};

/// Kind of a storage entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    /// Symlinks, sockets and anything else the engine never walks into.
    Other,
}

/// Metadata for one storage entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryStat {
    /// Entry kind.
    pub kind: EntryKind,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Last modification time, when the backend knows it.
    pub mtime: Option<DateTime<Utc>>,
}

impl EntryStat {
    /// Returns true for directories.
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }

    /// Returns true for regular files.
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Uniform primitives implemented once per backend.
///
/// Implementations must be `Send + Sync`; methods take `&self`.
pub trait StorageAdapter: Send + Sync {
    /// Whether this backend is a local disk.
    fn is_local(&self) -> bool;

    /// Names of the entries directly inside `path`.
    fn list(&self, path: &str) -> io::Result<Vec<String>>;

    /// Metadata for `path`, or `None` if it does not exist.
    fn stat(&self, path: &str) -> io::Result<Option<EntryStat>>;

    /// Create the directory `path`.
    fn mkdir(&self, path: &str, mode: u32, recursive: bool) -> io::Result<()>;

    /// Move `src` to `dst`.
    fn rename(&self, src: &str, dst: &str) -> io::Result<()>;

    /// Delete a file or an empty directory.
    fn remove(&self, path: &str) -> io::Result<()>;
}

/// Join a relative storage path and an entry name.
pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join() {
        assert_eq!(join("", "a"), "a");
        assert_eq!(join("a/b", "c"), "a/b/c");
    }
}
