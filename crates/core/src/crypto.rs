//! Folder encryption markers.
//!
//! The encryption mechanism itself lives elsewhere; the namespace engine only
//! needs to know which folders are encrypted so it never counts, previews or
//! moves their contents across an encryption boundary.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Result;
use folio_protocol::FolderKey;

use crate::store::{JsonFileStore, KeyValueStore};

/// The boundary check consumed by traversal and tree mutation.
pub trait FolderCrypto {
    /// True if `folder` or any of its ancestors is encrypted.
    fn is_encrypted_or_ancestor(&self, folder: &FolderKey) -> bool;
}

/// The persisted set of encrypted folder roots.
pub type EncryptedSet = BTreeSet<FolderKey>;

/// A loaded view of the encryption markers.
#[derive(Debug, Clone, Default)]
pub struct EncryptionSnapshot {
    folders: EncryptedSet,
}

impl EncryptionSnapshot {
    pub fn new(folders: EncryptedSet) -> Self {
        Self { folders }
    }

    /// True if `folder` itself is marked.
    pub fn is_encrypted(&self, folder: &FolderKey) -> bool {
        self.folders.contains(folder)
    }
}

impl FolderCrypto for EncryptionSnapshot {
    fn is_encrypted_or_ancestor(&self, folder: &FolderKey) -> bool {
        !self.folders.is_empty()
            && folder
                .self_and_ancestors()
                .iter()
                .any(|key| self.folders.contains(key))
    }
}

/// Encryption markers backed by a document store.
pub struct EncryptionMarkers<S = JsonFileStore<EncryptedSet>> {
    store: S,
}

impl EncryptionMarkers<JsonFileStore<EncryptedSet>> {
    /// Open the marker document at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        Self::new(JsonFileStore::new(path))
    }
}

impl<S: KeyValueStore<EncryptedSet>> EncryptionMarkers<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Load the current markers.
    pub fn snapshot(&self) -> Result<EncryptionSnapshot> {
        Ok(EncryptionSnapshot::new(self.store.load()?))
    }

    /// Mark `folder` as encrypted. Returns false if it already was.
    pub fn mark(&self, folder: &FolderKey) -> Result<bool> {
        let added = self.store.update(|folders| Ok(folders.insert(folder.clone())))?;
        if added {
            tracing::info!("Marked {} as encrypted", folder);
        }
        Ok(added)
    }

    /// Clear the marker on `folder`. Returns false if it was not marked.
    pub fn unmark(&self, folder: &FolderKey) -> Result<bool> {
        self.store.update(|folders| Ok(folders.remove(folder)))
    }

    /// True if `folder` itself is marked.
    pub fn is_encrypted(&self, folder: &FolderKey) -> Result<bool> {
        Ok(self.snapshot()?.is_encrypted(folder))
    }

    /// True if `folder` or any ancestor is marked.
    pub fn is_encrypted_or_ancestor(&self, folder: &FolderKey) -> Result<bool> {
        Ok(self.snapshot()?.is_encrypted_or_ancestor(folder))
    }

    /// Move markers under `old` to sit under `new`.
    pub fn rename_tree(&self, old: &FolderKey, new: &FolderKey) -> Result<usize> {
        self.store.update(|folders| {
            let affected: Vec<FolderKey> = folders
                .iter()
                .filter(|key| key.is_self_or_descendant_of(old))
                .cloned()
                .collect();
            for key in &affected {
                folders.remove(key);
                if let Some(rebased) = key.rebase(old, new) {
                    folders.insert(rebased);
                }
            }
            Ok(affected.len())
        })
    }

    /// Drop markers on `key` and beneath it.
    pub fn delete_tree(&self, key: &FolderKey) -> Result<usize> {
        self.store.update(|folders| {
            let before = folders.len();
            folders.retain(|k| !k.is_self_or_descendant_of(key));
            Ok(before - folders.len())
        })
    }
}
