//! Per-folder metadata caches.
//!
//! Each folder gets one JSON document in the meta directory holding
//! `{filename: {uploaded, modified, uploader}}`. The document name is a
//! reversible transform of the folder key, so a subtree rename or delete can
//! find every related cache by decoding names and comparing keys.
//!
//! ```text
//! root        -> root_metadata.json
//! team/x      -> team-x_metadata.json
//! a-b/c       -> a%2Db-c_metadata.json
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use folio_protocol::FolderKey;
use serde::{Deserialize, Serialize};

use crate::store::{JsonFileStore, KeyValueStore};

/// Suffix shared by every cache document.
pub const METADATA_SUFFIX: &str = "_metadata.json";

/// Cached facts about one uploaded file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
}

/// One folder's cache document.
pub type FolderMetadata = BTreeMap<String, FileMeta>;

fn escape_segment(segment: &str) -> String {
    segment.replace('%', "%25").replace('-', "%2D")
}

fn unescape_segment(segment: &str) -> String {
    segment.replace("%2D", "-").replace("%25", "%")
}

/// Decode a cache document name back into its folder key.
fn key_for_file_name(file_name: &str) -> Option<FolderKey> {
    let stem = file_name.strip_suffix(METADATA_SUFFIX)?;
    let raw: Vec<String> = stem.split('-').map(unescape_segment).collect();
    FolderKey::parse(&raw.join("/")).ok()
}

/// Metadata cache documents stored under the meta directory.
pub struct MetadataCache {
    dir: PathBuf,
}

impl MetadataCache {
    /// Create a cache rooted at the meta directory.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Deterministic document name for `folder`.
    pub fn file_name(folder: &FolderKey) -> String {
        if folder.is_root() {
            return format!("root{}", METADATA_SUFFIX);
        }
        let stem: Vec<String> = folder.segments().map(escape_segment).collect();
        format!("{}{}", stem.join("-"), METADATA_SUFFIX)
    }

    /// Full path of the document for `folder`.
    pub fn path_for(&self, folder: &FolderKey) -> PathBuf {
        self.dir.join(Self::file_name(folder))
    }

    fn store_for(&self, folder: &FolderKey) -> JsonFileStore<FolderMetadata> {
        JsonFileStore::new(self.path_for(folder))
    }

    /// Load the cache for `folder` (empty if none exists).
    pub fn load(&self, folder: &FolderKey) -> Result<FolderMetadata> {
        self.store_for(folder).load()
    }

    /// Record an upload of `file_name` into `folder`.
    pub fn record_upload(
        &self,
        folder: &FolderKey,
        file_name: &str,
        uploader: &str,
        uploaded: DateTime<Utc>,
    ) -> Result<()> {
        self.store_for(folder).update(|entries| {
            let entry = entries.entry(file_name.to_string()).or_default();
            entry.uploaded.get_or_insert(uploaded);
            entry.modified = Some(uploaded);
            entry.uploader = Some(uploader.to_string());
            Ok(())
        })
    }

    /// Remove the cache for exactly `folder`.
    ///
    /// Returns true if a document was removed.
    pub fn remove(&self, folder: &FolderKey) -> Result<bool> {
        let store = self.store_for(folder);
        if !store.path().exists() {
            return Ok(false);
        }
        store.with_lock(|path| match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to remove cache: {}", path.display())),
        })
    }

    /// Every cache document whose folder is `key` or beneath it.
    fn subtree(&self, key: &FolderKey) -> Result<Vec<FolderKey>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read meta directory: {}", self.dir.display())
                })
            }
        };

        let mut found = Vec::new();
        for entry in entries.flatten() {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if let Some(folder) = key_for_file_name(&name) {
                if folder.is_self_or_descendant_of(key) {
                    found.push(folder);
                }
            }
        }
        found.sort();
        Ok(found)
    }

    /// Rename the caches of `old` and its subtree to sit under `new`.
    ///
    /// Returns the number of documents renamed.
    pub fn rename_tree(&self, old: &FolderKey, new: &FolderKey) -> Result<usize> {
        let mut renamed = 0;
        for folder in self.subtree(old)? {
            let Some(target) = folder.rebase(old, new) else {
                continue;
            };
            let from = self.store_for(&folder);
            let to = self.store_for(&target);
            // Lock order is always source then target.
            from.with_lock(|from_path| {
                to.with_lock(|to_path| {
                    fs::rename(from_path, to_path).with_context(|| {
                        format!(
                            "Failed to rename cache {} to {}",
                            from_path.display(),
                            to_path.display()
                        )
                    })
                })
            })?;
            renamed += 1;
        }
        tracing::debug!("Renamed {} metadata caches from {} to {}", renamed, old, new);
        Ok(renamed)
    }

    /// Remove the caches of `key` and its subtree.
    ///
    /// Returns the number of documents removed.
    pub fn delete_tree(&self, key: &FolderKey) -> Result<usize> {
        let mut removed = 0;
        for folder in self.subtree(key)? {
            if self.remove(&folder)? {
                removed += 1;
            }
        }
        tracing::debug!("Removed {} metadata caches under {}", removed, key);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn key(raw: &str) -> FolderKey {
        FolderKey::parse(raw).unwrap()
    }

    #[test]
    fn test_file_names() {
        assert_eq!(MetadataCache::file_name(&FolderKey::root()), "root_metadata.json");
        assert_eq!(MetadataCache::file_name(&key("team/x")), "team-x_metadata.json");
        assert_eq!(MetadataCache::file_name(&key("a-b/c")), "a%2Db-c_metadata.json");
        assert_ne!(
            MetadataCache::file_name(&key("a-b")),
            MetadataCache::file_name(&key("a/b"))
        );
    }

    #[test]
    fn test_file_names_decode() {
        for raw in ["root", "team/x", "a-b/c", "100%/x-y"] {
            let name = MetadataCache::file_name(&key(raw));
            assert_eq!(key_for_file_name(&name), Some(key(raw)), "{raw}");
        }
        assert_eq!(key_for_file_name("folder_acl.json"), None);
    }

    #[test]
    fn test_record_upload_keeps_first_upload_time() {
        let temp_dir = TempDir::new().unwrap();
        let cache = MetadataCache::new(temp_dir.path());
        let folder = key("docs");
        let first = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();

        cache.record_upload(&folder, "a.txt", "alice", first).unwrap();
        cache.record_upload(&folder, "a.txt", "bob", second).unwrap();

        let entries = cache.load(&folder).unwrap();
        let meta = &entries["a.txt"];
        assert_eq!(meta.uploaded, Some(first));
        assert_eq!(meta.modified, Some(second));
        assert_eq!(meta.uploader.as_deref(), Some("bob"));
    }

    #[test]
    fn test_rename_and_delete_tree() {
        let temp_dir = TempDir::new().unwrap();
        let cache = MetadataCache::new(temp_dir.path());
        let now = Utc::now();
        for folder in ["a", "a/b", "ab", "a-b"] {
            cache.record_upload(&key(folder), "f", "alice", now).unwrap();
        }

        assert_eq!(cache.rename_tree(&key("a"), &key("z/a")).unwrap(), 2);
        assert!(cache.path_for(&key("z/a")).exists());
        assert!(cache.path_for(&key("z/a/b")).exists());
        assert!(!cache.path_for(&key("a")).exists());
        assert!(cache.path_for(&key("ab")).exists());
        assert!(cache.path_for(&key("a-b")).exists());

        assert_eq!(cache.delete_tree(&key("z")).unwrap(), 2);
        assert!(!cache.path_for(&key("z/a/b")).exists());
        assert!(cache.path_for(&key("ab")).exists());
    }

    #[test]
    fn test_remove_and_rename_keep_lock_files() {
        let temp_dir = TempDir::new().unwrap();
        let cache = MetadataCache::new(temp_dir.path());
        let now = Utc::now();
        cache.record_upload(&key("a"), "f", "alice", now).unwrap();
        cache.record_upload(&key("b"), "f", "alice", now).unwrap();
        let lock_a = cache.path_for(&key("a")).with_extension("lock");
        let lock_b = cache.path_for(&key("b")).with_extension("lock");
        assert!(lock_a.exists() && lock_b.exists());

        assert_eq!(cache.rename_tree(&key("a"), &key("z")).unwrap(), 1);
        assert!(!cache.path_for(&key("a")).exists());
        assert!(lock_a.exists());

        assert!(cache.remove(&key("b")).unwrap());
        assert!(!cache.path_for(&key("b")).exists());
        assert!(lock_b.exists());

        cache.record_upload(&key("b"), "g", "bob", now).unwrap();
        assert!(cache.load(&key("b")).unwrap().contains_key("g"));
    }

    #[test]
    fn test_remove_waits_for_lock_holder() {
        use std::sync::mpsc;
        use std::time::{Duration, Instant};

        let temp_dir = TempDir::new().unwrap();
        let cache = MetadataCache::new(temp_dir.path());
        let folder = key("docs");
        cache.record_upload(&folder, "f", "alice", Utc::now()).unwrap();

        let holder: JsonFileStore<FolderMetadata> = JsonFileStore::new(cache.path_for(&folder));
        let (tx, rx) = mpsc::channel();
        std::thread::scope(|s| {
            s.spawn(move || {
                holder
                    .with_lock(|_| {
                        tx.send(()).unwrap();
                        std::thread::sleep(Duration::from_millis(300));
                        Ok(())
                    })
                    .unwrap();
            });

            rx.recv().unwrap();
            let start = Instant::now();
            assert!(cache.remove(&folder).unwrap());
            assert!(start.elapsed() >= Duration::from_millis(200));
        });
    }

    #[test]
    fn test_missing_meta_dir_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let cache = MetadataCache::new(temp_dir.path().join("absent"));
        assert_eq!(cache.delete_tree(&key("a")).unwrap(), 0);
        assert!(!cache.remove(&key("a")).unwrap());
        assert!(cache.load(&key("a")).unwrap().is_empty());
    }
}
