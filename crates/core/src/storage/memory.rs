//! Object-store style backend held in memory.
//!
//! Remote object stores have no real directories: a "directory" exists only
//! because some object key is prefixed by it. [`MemoryStorage`] behaves the
//! same way and materializes empty directories with a [`KEEP_MARKER`] object,
//! which is why the tree mutation code has to ignore markers when deciding
//! whether a remote folder is empty.

use std::collections::BTreeMap;
use std::io;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::{join, EntryKind, EntryStat, StorageAdapter};

/// Marker object written inside every directory created through `mkdir`.
pub const KEEP_MARKER: &str = ".keep";

#[derive(Debug, Clone)]
enum Node {
    Dir { mtime: DateTime<Utc> },
    File { size: u64, mtime: DateTime<Utc> },
}

/// In-memory remote-style storage (`is_local() == false`).
#[derive(Default)]
pub struct MemoryStorage {
    nodes: Mutex<BTreeMap<String, Node>>,
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no such entry: {path:?}"))
}

fn poisoned() -> io::Error {
    io::Error::other("memory storage lock poisoned")
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

fn is_child_path(candidate: &str, dir: &str) -> bool {
    dir.is_empty() || candidate.strip_prefix(dir).is_some_and(|rest| rest.starts_with('/'))
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a file object of `size` bytes, creating its parent directories.
    pub fn put_file(&self, path: &str, size: u64) -> io::Result<()> {
        self.put_file_at(path, size, Utc::now())
    }

    /// Write a file object with an explicit modification time.
    pub fn put_file_at(&self, path: &str, size: u64, mtime: DateTime<Utc>) -> io::Result<()> {
        let parent = parent_of(path);
        if !parent.is_empty() {
            self.mkdir(parent, 0o755, true)?;
        }
        let mut nodes = self.nodes.lock().map_err(|_| poisoned())?;
        if matches!(nodes.get(path), Some(Node::Dir { .. })) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("directory exists at {path:?}"),
            ));
        }
        nodes.insert(path.to_string(), Node::File { size, mtime });
        Ok(())
    }

    fn is_dir(nodes: &BTreeMap<String, Node>, path: &str) -> bool {
        path.is_empty() || matches!(nodes.get(path), Some(Node::Dir { .. }))
    }
}

impl StorageAdapter for MemoryStorage {
    fn is_local(&self) -> bool {
        false
    }

    fn list(&self, path: &str) -> io::Result<Vec<String>> {
        let nodes = self.nodes.lock().map_err(|_| poisoned())?;
        if !Self::is_dir(&nodes, path) {
            return Err(not_found(path));
        }
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        };
        Ok(nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(key, _)| {
                let rest = &key[prefix.len()..];
                (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
            })
            .collect())
    }

    fn stat(&self, path: &str) -> io::Result<Option<EntryStat>> {
        let nodes = self.nodes.lock().map_err(|_| poisoned())?;
        if path.is_empty() {
            return Ok(Some(EntryStat {
                kind: EntryKind::Dir,
                size: 0,
                mtime: None,
            }));
        }
        Ok(nodes.get(path).map(|node| match node {
            Node::Dir { mtime } => EntryStat {
                kind: EntryKind::Dir,
                size: 0,
                mtime: Some(*mtime),
            },
            Node::File { size, mtime } => EntryStat {
                kind: EntryKind::File,
                size: *size,
                mtime: Some(*mtime),
            },
        }))
    }

    fn mkdir(&self, path: &str, _mode: u32, recursive: bool) -> io::Result<()> {
        let mut nodes = self.nodes.lock().map_err(|_| poisoned())?;
        match nodes.get(path) {
            Some(Node::Dir { .. }) if recursive => return Ok(()),
            Some(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("entry exists at {path:?}"),
                ))
            }
            None => {}
        }

        let mut missing = Vec::new();
        let mut current = path;
        while !current.is_empty() && !nodes.contains_key(current) {
            missing.push(current.to_string());
            current = parent_of(current);
        }
        if !Self::is_dir(&nodes, current) {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("not a directory: {current:?}"),
            ));
        }
        if missing.len() > 1 && !recursive {
            return Err(not_found(parent_of(path)));
        }

        let now = Utc::now();
        for dir in missing.into_iter().rev() {
            nodes.insert(join(&dir, KEEP_MARKER), Node::File { size: 0, mtime: now });
            nodes.insert(dir, Node::Dir { mtime: now });
        }
        Ok(())
    }

    fn rename(&self, src: &str, dst: &str) -> io::Result<()> {
        let mut nodes = self.nodes.lock().map_err(|_| poisoned())?;
        if src.is_empty() || !nodes.contains_key(src) {
            return Err(not_found(src));
        }
        if nodes.contains_key(dst) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("destination exists: {dst:?}"),
            ));
        }
        if is_child_path(dst, src) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot move {src:?} into itself"),
            ));
        }
        if !Self::is_dir(&nodes, parent_of(dst)) {
            return Err(not_found(parent_of(dst)));
        }

        let moved: Vec<String> = nodes
            .keys()
            .filter(|key| key.as_str() == src || is_child_path(key, src))
            .cloned()
            .collect();
        for key in moved {
            if let Some(node) = nodes.remove(&key) {
                let rebased = format!("{}{}", dst, &key[src.len()..]);
                nodes.insert(rebased, node);
            }
        }
        Ok(())
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        let mut nodes = self.nodes.lock().map_err(|_| poisoned())?;
        match nodes.get(path) {
            None => Err(not_found(path)),
            Some(Node::File { .. }) => {
                nodes.remove(path);
                Ok(())
            }
            Some(Node::Dir { .. }) => {
                let has_children = nodes.keys().any(|key| is_child_path(key, path));
                if has_children {
                    return Err(io::Error::new(
                        io::ErrorKind::DirectoryNotEmpty,
                        format!("directory not empty: {path:?}"),
                    ));
                }
                nodes.remove(path);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mkdir_writes_keep_marker() {
        let storage = MemoryStorage::new();
        storage.mkdir("a", 0o755, false).unwrap();

        assert!(!storage.is_local());
        assert!(storage.stat("a").unwrap().unwrap().is_dir());
        assert_eq!(storage.list("a").unwrap(), vec![KEEP_MARKER]);
        assert_eq!(storage.list("").unwrap(), vec!["a"]);
    }

    #[test]
    fn test_mkdir_requires_parent_unless_recursive() {
        let storage = MemoryStorage::new();
        let err = storage.mkdir("a/b", 0o755, false).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        storage.mkdir("a/b", 0o755, true).unwrap();
        assert!(storage.stat("a").unwrap().unwrap().is_dir());
        assert!(storage.mkdir("a/b", 0o755, false).is_err());
    }

    #[test]
    fn test_put_file_and_list() {
        let storage = MemoryStorage::new();
        storage.put_file("docs/readme.txt", 42).unwrap();
        storage.put_file("docs/sub/deep.txt", 1).unwrap();

        let mut names = storage.list("docs").unwrap();
        names.sort();
        assert_eq!(names, vec![KEEP_MARKER, "readme.txt", "sub"]);

        let stat = storage.stat("docs/readme.txt").unwrap().unwrap();
        assert!(stat.is_file());
        assert_eq!(stat.size, 42);
        assert!(storage.list("docs/readme.txt").is_err());
    }

    #[test]
    fn test_rename_moves_subtree() {
        let storage = MemoryStorage::new();
        storage.put_file("a/b/c.txt", 3).unwrap();
        storage.put_file("ab/other.txt", 3).unwrap();

        storage.rename("a", "z").unwrap();
        assert!(storage.stat("a").unwrap().is_none());
        assert!(storage.stat("z/b/c.txt").unwrap().is_some());
        assert!(storage.stat("ab/other.txt").unwrap().is_some());

        assert!(storage.rename("z", "z/b/inner").is_err());
        assert!(storage.rename("z", "ab").is_err());
    }

    #[test]
    fn test_remove_refuses_non_empty() {
        let storage = MemoryStorage::new();
        storage.mkdir("a", 0o755, false).unwrap();

        let err = storage.remove("a").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::DirectoryNotEmpty);

        storage.remove(&join("a", KEEP_MARKER)).unwrap();
        storage.remove("a").unwrap();
        assert!(storage.stat("a").unwrap().is_none());
    }
}
