//! Folder tree mutation.
//!
//! Every operation validates first and only then touches storage, so a
//! validation error never leaves side effects behind. After the storage step
//! each operation brings the grant store, the ownership index, the metadata
//! caches and the encryption markers in line with the new shape of the tree:
//!
//! ```text
//! create_folder   mkdir -> seed grants (rollback mkdir on failure) -> owner
//! rename_folder   rename -> re-key caches, owners, grants, markers
//! delete_folder   remove markers + dir -> purge caches, owners, grants, markers
//! delete_folder_recursive_admin
//!                 remove files -> remove dirs child-first -> purge subtree
//! ```
//!
//! Only creation rolls back. The other operations collect bookkeeping and
//! per-path failures into [`TreeError::PartialFailure`] and leave completed
//! steps in place.

mod create;
mod delete;
mod rename;

use std::fmt;
use std::io;

use folio_protocol::{FolderKey, ProtocolError};
use serde::Serialize;
use thiserror::Error;

use crate::crypto::{EncryptedSet, EncryptionMarkers};
use crate::grants::{GrantMap, GrantStore};
use crate::metadata::MetadataCache;
use crate::ownership::{OwnerMap, OwnershipIndex};
use crate::storage::{join, StorageAdapter, KEEP_MARKER};
use crate::store::{JsonFileStore, KeyValueStore};

/// One failed step of a multi-step operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathFailure {
    /// Storage path or document the step acted on.
    pub path: String,
    /// What went wrong.
    pub message: String,
}

impl PathFailure {
    fn new(path: impl Into<String>, error: impl fmt::Display) -> Self {
        Self {
            path: path.into(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for PathFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Errors that can occur while mutating the folder tree.
#[derive(Debug, Error)]
pub enum TreeError {
    /// Malformed name or an invalid target.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The folder or its parent does not exist.
    #[error("folder not found: {0}")]
    NotFound(FolderKey),

    /// The target already exists.
    #[error("folder already exists: {0}")]
    AlreadyExists(FolderKey),

    /// The folder still has content.
    #[error("folder is not empty: {0}")]
    NotEmpty(FolderKey),

    /// The caller lacks the capability for this mutation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The storage backend failed before anything changed.
    #[error("storage error on {path:?}: {source}")]
    Storage {
        path: String,
        #[source]
        source: io::Error,
    },

    /// A grant or marker document failed; nothing on storage was left changed.
    #[error("bookkeeping failed for {folder}: {error:#}")]
    Bookkeeping {
        folder: FolderKey,
        error: anyhow::Error,
    },

    /// Some steps failed after the operation had started.
    #[error("{} step(s) failed: {}", .errors.len(), join_failures(.errors))]
    PartialFailure { errors: Vec<PathFailure> },
}

fn join_failures(errors: &[PathFailure]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<ProtocolError> for TreeError {
    fn from(error: ProtocolError) -> Self {
        TreeError::Validation(error.to_string())
    }
}

/// Settings that shape mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationOptions {
    /// Seed new folders from their parent's legacy buckets.
    pub inherit_on_create: bool,
    /// Permission bits for created directories.
    pub dir_mode: u32,
}

impl Default for MutationOptions {
    fn default() -> Self {
        Self {
            inherit_on_create: false,
            dir_mode: 0o755,
        }
    }
}

/// Tree mutations over one storage backend and its bookkeeping stores.
pub struct TreeMutation<
    'a,
    G = JsonFileStore<GrantMap>,
    O = JsonFileStore<OwnerMap>,
    E = JsonFileStore<EncryptedSet>,
> {
    storage: &'a dyn StorageAdapter,
    grants: &'a GrantStore<G>,
    owners: &'a OwnershipIndex<O>,
    crypto: &'a EncryptionMarkers<E>,
    metadata: &'a MetadataCache,
    options: MutationOptions,
}

impl<'a, G, O, E> TreeMutation<'a, G, O, E>
where
    G: KeyValueStore<GrantMap>,
    O: KeyValueStore<OwnerMap>,
    E: KeyValueStore<EncryptedSet>,
{
    pub fn new(
        storage: &'a dyn StorageAdapter,
        grants: &'a GrantStore<G>,
        owners: &'a OwnershipIndex<O>,
        crypto: &'a EncryptionMarkers<E>,
        metadata: &'a MetadataCache,
        options: MutationOptions,
    ) -> Self {
        Self {
            storage,
            grants,
            owners,
            crypto,
            metadata,
            options,
        }
    }

    fn storage_error(path: &str) -> impl FnOnce(io::Error) -> TreeError + '_ {
        move |source| TreeError::Storage {
            path: path.to_string(),
            source,
        }
    }

    /// Whether `key` currently exists on storage as a directory.
    fn dir_exists(&self, key: &FolderKey) -> Result<bool, TreeError> {
        let path = key.storage_path();
        Ok(self
            .storage
            .stat(path)
            .map_err(Self::storage_error(path))?
            .is_some_and(|stat| stat.is_dir()))
    }

    /// Whether anything at all exists at `key`.
    fn entry_exists(&self, key: &FolderKey) -> Result<bool, TreeError> {
        let path = key.storage_path();
        Ok(self
            .storage
            .stat(path)
            .map_err(Self::storage_error(path))?
            .is_some())
    }

    fn require_dir(&self, key: &FolderKey) -> Result<(), TreeError> {
        if self.dir_exists(key)? {
            Ok(())
        } else {
            Err(TreeError::NotFound(key.clone()))
        }
    }

    /// Remove an empty directory, clearing the remote keep marker first.
    fn remove_empty_dir(&self, path: &str) -> io::Result<()> {
        if !self.storage.is_local() {
            let marker = join(path, KEEP_MARKER);
            if self.storage.stat(&marker)?.is_some() {
                self.storage.remove(&marker)?;
            }
        }
        self.storage.remove(path)
    }

    /// Drop every bookkeeping record for `key` and its subtree.
    fn purge_subtree(&self, key: &FolderKey, failures: &mut Vec<PathFailure>) {
        let steps: [(&str, anyhow::Result<usize>); 4] = [
            ("metadata", self.metadata.delete_tree(key)),
            ("owners", self.owners.delete_tree(key)),
            ("grants", self.grants.delete_tree(key)),
            ("encryption", self.crypto.delete_tree(key)),
        ];
        for (store, result) in steps {
            if let Err(e) = result {
                tracing::warn!("Failed to purge {} records under {}: {:#}", store, key, e);
                failures.push(PathFailure::new(store, format!("{e:#}")));
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::storage::MemoryStorage;
    use folio_protocol::Username;
    use tempfile::TempDir;

    pub(crate) struct Fixture {
        pub storage: MemoryStorage,
        pub grants: GrantStore<MemoryStore<GrantMap>>,
        pub owners: OwnershipIndex<MemoryStore<OwnerMap>>,
        pub crypto: EncryptionMarkers<MemoryStore<EncryptedSet>>,
        pub metadata: MetadataCache,
        pub options: MutationOptions,
        _meta_dir: TempDir,
    }

    impl Fixture {
        pub fn new() -> Self {
            let meta_dir = TempDir::new().unwrap();
            Self {
                storage: MemoryStorage::new(),
                grants: GrantStore::new(MemoryStore::default()),
                owners: OwnershipIndex::new(MemoryStore::default()),
                crypto: EncryptionMarkers::new(MemoryStore::default()),
                metadata: MetadataCache::new(meta_dir.path()),
                options: MutationOptions::default(),
                _meta_dir: meta_dir,
            }
        }

        pub fn tree(
            &self,
        ) -> TreeMutation<'_, MemoryStore<GrantMap>, MemoryStore<OwnerMap>, MemoryStore<EncryptedSet>>
        {
            TreeMutation::new(
                &self.storage,
                &self.grants,
                &self.owners,
                &self.crypto,
                &self.metadata,
                self.options,
            )
        }
    }

    pub(crate) fn key(raw: &str) -> FolderKey {
        FolderKey::parse(raw).unwrap()
    }

    pub(crate) fn user(name: &str) -> Username {
        Username::new(name).unwrap()
    }

    #[test]
    fn test_partial_failure_message_lists_paths() {
        let err = TreeError::PartialFailure {
            errors: vec![
                PathFailure::new("a/x.txt", "denied"),
                PathFailure::new("grants", "locked"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "2 step(s) failed: a/x.txt: denied; grants: locked"
        );
    }

    #[test]
    fn test_protocol_errors_are_validation() {
        let err: TreeError = FolderKey::parse("a/../b").unwrap_err().into();
        assert!(matches!(err, TreeError::Validation(_)));
    }
}
