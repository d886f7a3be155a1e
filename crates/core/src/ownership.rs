//! Legacy single-owner folder index.
//!
//! Some call sites (listings, disk-usage bucketing) want exactly one owner per
//! folder rather than the owners bucket of a grant record. This index keeps
//! that mapping and is re-keyed and purged alongside the grant store whenever
//! the folder tree changes shape.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use folio_protocol::{FolderKey, Username};

use crate::store::{JsonFileStore, KeyValueStore};

/// The persisted ownership document.
pub type OwnerMap = BTreeMap<FolderKey, Username>;

/// Folder to single-owner map.
pub struct OwnershipIndex<S = JsonFileStore<OwnerMap>> {
    store: S,
}

impl OwnershipIndex<JsonFileStore<OwnerMap>> {
    /// Open the ownership document at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        Self::new(JsonFileStore::new(path))
    }
}

impl<S: KeyValueStore<OwnerMap>> OwnershipIndex<S> {
    /// Create an index over any document store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Every recorded folder owner.
    pub fn folder_owners(&self) -> Result<OwnerMap> {
        self.store.load()
    }

    /// The owner recorded for `folder`, if any.
    pub fn owner_for(&self, folder: &FolderKey) -> Result<Option<Username>> {
        Ok(self.store.load()?.remove(folder))
    }

    /// Record `owner` as the owner of `folder`, replacing any previous owner.
    pub fn set_owner_for(&self, folder: &FolderKey, owner: &Username) -> Result<()> {
        self.store.update(|owners| {
            owners.insert(folder.clone(), owner.clone());
            Ok(())
        })?;
        tracing::debug!("Set owner of {} to {}", folder, owner);
        Ok(())
    }

    /// Re-key `old` and every folder beneath it to sit under `new`.
    pub fn rename_tree(&self, old: &FolderKey, new: &FolderKey) -> Result<usize> {
        self.store.update(|owners| {
            let affected: Vec<FolderKey> = owners
                .keys()
                .filter(|key| key.is_self_or_descendant_of(old))
                .cloned()
                .collect();
            for key in &affected {
                if let (Some(owner), Some(rebased)) = (owners.remove(key), key.rebase(old, new)) {
                    owners.insert(rebased, owner);
                }
            }
            Ok(affected.len())
        })
    }

    /// Drop `key` and every folder beneath it.
    pub fn delete_tree(&self, key: &FolderKey) -> Result<usize> {
        self.store.update(|owners| {
            let before = owners.len();
            owners.retain(|k, _| !k.is_self_or_descendant_of(key));
            Ok(before - owners.len())
        })
    }

    /// Drop every entry owned by `user`, returning the orphaned folders.
    pub fn purge_user(&self, user: &Username) -> Result<Vec<FolderKey>> {
        let orphaned = self.store.update(|owners| {
            let orphaned: Vec<FolderKey> = owners
                .iter()
                .filter(|(_, owner)| *owner == user)
                .map(|(key, _)| key.clone())
                .collect();
            for key in &orphaned {
                owners.remove(key);
            }
            Ok(orphaned)
        })?;
        if !orphaned.is_empty() {
            tracing::info!("Dropped ownership of {} folders for {}", orphaned.len(), user);
        }
        Ok(orphaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use tempfile::TempDir;

    fn key(raw: &str) -> FolderKey {
        FolderKey::parse(raw).unwrap()
    }

    fn user(name: &str) -> Username {
        Username::new(name).unwrap()
    }

    #[test]
    fn test_set_and_get_owner() {
        let index = OwnershipIndex::new(MemoryStore::default());
        assert_eq!(index.owner_for(&key("a")).unwrap(), None);

        index.set_owner_for(&key("a"), &user("Alice")).unwrap();
        assert_eq!(index.owner_for(&key("a")).unwrap(), Some(user("alice")));

        index.set_owner_for(&key("a"), &user("bob")).unwrap();
        assert_eq!(index.owner_for(&key("a")).unwrap(), Some(user("bob")));
        assert_eq!(index.folder_owners().unwrap().len(), 1);
    }

    #[test]
    fn test_rename_and_delete_tree() {
        let index = OwnershipIndex::new(MemoryStore::default());
        for folder in ["a", "a/b", "ab"] {
            index.set_owner_for(&key(folder), &user("alice")).unwrap();
        }

        assert_eq!(index.rename_tree(&key("a"), &key("x")).unwrap(), 2);
        let owners = index.folder_owners().unwrap();
        assert!(owners.contains_key(&key("x")));
        assert!(owners.contains_key(&key("x/b")));
        assert!(owners.contains_key(&key("ab")));
        assert!(!owners.contains_key(&key("a")));

        assert_eq!(index.delete_tree(&key("x")).unwrap(), 2);
        assert_eq!(index.folder_owners().unwrap().len(), 1);
    }

    #[test]
    fn test_purge_user() {
        let index = OwnershipIndex::new(MemoryStore::default());
        index.set_owner_for(&key("a"), &user("alice")).unwrap();
        index.set_owner_for(&key("b"), &user("bob")).unwrap();

        let orphaned = index.purge_user(&user("ALICE")).unwrap();
        assert_eq!(orphaned, vec![key("a")]);
        assert_eq!(index.folder_owners().unwrap().len(), 1);
    }

    #[test]
    fn test_file_backed_index() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("folder_owners.json");
        OwnershipIndex::open(&path)
            .set_owner_for(&key("team"), &user("alice"))
            .unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"team\": \"alice\""));
    }
}
