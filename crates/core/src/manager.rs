//! The controller-facing facade.
//!
//! [`FileManager`] owns one storage backend and every bookkeeping store
//! opened from a [`Config`]. Read paths go through [`FileManager::traversal`],
//! which filters silently. Mutations called on behalf of a user go through
//! the authorized wrappers here, which refuse with
//! [`TreeError::PermissionDenied`] before anything changes.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;

use anyhow::{Context, Result};
use folio_protocol::{CallerContext, FolderGrants, FolderKey, Username};
use serde::Serialize;

use crate::config::Config;
use crate::crypto::EncryptionMarkers;
use crate::grants::{Capability, GrantSnapshot, GrantStore};
use crate::metadata::MetadataCache;
use crate::ownership::OwnershipIndex;
use crate::storage::{LocalStorage, StorageAdapter};
use crate::traversal::{FolderTraversal, TraversalLimits};
use crate::tree::{MutationOptions, TreeError, TreeMutation};

/// What [`FileManager::remove_user`] cleaned up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedUser {
    /// Grant records the user was removed from.
    pub grant_records: usize,
    /// Folders whose single owner was the user.
    pub orphaned_folders: Vec<FolderKey>,
}

/// Storage plus all bookkeeping stores for one deployment.
pub struct FileManager {
    storage: Box<dyn StorageAdapter>,
    grants: GrantStore,
    owners: OwnershipIndex,
    crypto: EncryptionMarkers,
    metadata: MetadataCache,
    limits: TraversalLimits,
    options: MutationOptions,
}

impl FileManager {
    /// Open a manager over the local upload directory named in `config`.
    ///
    /// Creates the upload and meta directories if they don't exist.
    pub fn open(config: &Config) -> Result<Self> {
        let upload_dir = &config.storage.upload_dir;
        fs::create_dir_all(upload_dir)
            .with_context(|| format!("Failed to create upload directory: {}", upload_dir.display()))?;
        Self::with_storage(config, Box::new(LocalStorage::new(upload_dir)))
    }

    /// Open a manager over an arbitrary storage backend.
    pub fn with_storage(config: &Config, storage: Box<dyn StorageAdapter>) -> Result<Self> {
        fs::create_dir_all(&config.meta.dir).with_context(|| {
            format!("Failed to create meta directory: {}", config.meta.dir.display())
        })?;

        tracing::info!(
            "Opened folder namespace (local: {}, meta: {})",
            storage.is_local(),
            config.meta.dir.display()
        );

        Ok(Self {
            storage,
            grants: GrantStore::open(config.grants_path()),
            owners: OwnershipIndex::open(config.owners_path()),
            crypto: EncryptionMarkers::open(config.encryption_path()),
            metadata: MetadataCache::new(&config.meta.dir),
            limits: TraversalLimits::from(&config.traversal),
            options: MutationOptions {
                inherit_on_create: config.acl.inherit_on_create,
                dir_mode: config.storage.dir_mode,
            },
        })
    }

    pub fn storage(&self) -> &dyn StorageAdapter {
        self.storage.as_ref()
    }

    pub fn grants(&self) -> &GrantStore {
        &self.grants
    }

    pub fn owners(&self) -> &OwnershipIndex {
        &self.owners
    }

    pub fn crypto(&self) -> &EncryptionMarkers {
        &self.crypto
    }

    pub fn metadata(&self) -> &MetadataCache {
        &self.metadata
    }

    /// Read-only, permission-filtered views of the tree.
    pub fn traversal(&self) -> FolderTraversal<'_> {
        FolderTraversal::new(
            self.storage.as_ref(),
            &self.grants,
            &self.crypto,
            &self.metadata,
            self.limits.clone(),
        )
    }

    /// Unchecked tree mutations, for internal callers and admin tooling.
    pub fn tree(&self) -> TreeMutation<'_> {
        TreeMutation::new(
            self.storage.as_ref(),
            &self.grants,
            &self.owners,
            &self.crypto,
            &self.metadata,
            self.options,
        )
    }

    fn snapshot(&self, folder: &FolderKey) -> Result<GrantSnapshot, TreeError> {
        self.grants.snapshot().map_err(|error| TreeError::Bookkeeping {
            folder: folder.clone(),
            error,
        })
    }

    fn require(
        snapshot: &GrantSnapshot,
        caller: &CallerContext,
        folder: &FolderKey,
        capability: Capability,
    ) -> Result<(), TreeError> {
        if snapshot.can(caller, folder, capability) {
            return Ok(());
        }
        tracing::debug!("{} denied {:?} on {}", caller.username, capability, folder);
        Err(TreeError::PermissionDenied(format!(
            "{} may not {:?} in {}",
            caller.username, capability, folder
        )))
    }

    fn require_admin(caller: &CallerContext, action: &str) -> Result<(), TreeError> {
        if caller.is_admin() {
            Ok(())
        } else {
            Err(TreeError::PermissionDenied(format!(
                "{} is not an administrator and may not {}",
                caller.username, action
            )))
        }
    }

    /// Create `name` inside `parent`; needs create on `parent`.
    pub fn create_folder(
        &self,
        caller: &CallerContext,
        parent: &FolderKey,
        name: &str,
    ) -> Result<FolderKey, TreeError> {
        let snapshot = self.snapshot(parent)?;
        Self::require(&snapshot, caller, parent, Capability::Create)?;
        self.tree().create_folder(name, parent, &caller.username)
    }

    /// Move `old` to `new`; needs rename on `old` and create on the new parent.
    pub fn rename_folder(
        &self,
        caller: &CallerContext,
        old: &FolderKey,
        new: &FolderKey,
    ) -> Result<(), TreeError> {
        let snapshot = self.snapshot(old)?;
        Self::require(&snapshot, caller, old, Capability::Rename)?;
        let new_parent = new.parent().unwrap_or_else(FolderKey::root);
        Self::require(&snapshot, caller, &new_parent, Capability::Create)?;
        self.tree().rename_folder(old, new)
    }

    /// Delete an empty folder; needs delete on it.
    pub fn delete_folder(&self, caller: &CallerContext, folder: &FolderKey) -> Result<(), TreeError> {
        let snapshot = self.snapshot(folder)?;
        Self::require(&snapshot, caller, folder, Capability::Delete)?;
        self.tree().delete_folder(folder)
    }

    /// Delete a folder and everything in it; administrators only.
    pub fn delete_folder_recursive(
        &self,
        caller: &CallerContext,
        folder: &FolderKey,
    ) -> Result<(), TreeError> {
        Self::require_admin(caller, "delete folders recursively")?;
        self.tree().delete_folder_recursive_admin(folder)
    }

    /// Rewrite one user's grants across folders; administrators only.
    pub fn save_user_grants(
        &self,
        caller: &CallerContext,
        user: &Username,
        grants_by_folder: &BTreeMap<FolderKey, FolderGrants>,
    ) -> Result<BTreeSet<FolderKey>, TreeError> {
        Self::require_admin(caller, "change grants")?;
        self.grants
            .apply_user_grants_atomic(user, grants_by_folder)
            .map_err(|error| TreeError::Bookkeeping {
                folder: FolderKey::root(),
                error,
            })
    }

    /// Record `owner` as the single owner of `folder`; needs manage on it.
    pub fn set_folder_owner(
        &self,
        caller: &CallerContext,
        folder: &FolderKey,
        owner: &Username,
    ) -> Result<(), TreeError> {
        let snapshot = self.snapshot(folder)?;
        Self::require(&snapshot, caller, folder, Capability::Manage)?;
        let exists = self
            .storage
            .stat(folder.storage_path())
            .map_err(|source| TreeError::Storage {
                path: folder.storage_path().to_string(),
                source,
            })?
            .is_some_and(|stat| stat.is_dir());
        if !exists {
            return Err(TreeError::NotFound(folder.clone()));
        }
        self.owners
            .set_owner_for(folder, owner)
            .map_err(|error| TreeError::Bookkeeping {
                folder: folder.clone(),
                error,
            })
    }

    /// Remove every trace of `user` from grants and ownership; administrators only.
    pub fn remove_user(
        &self,
        caller: &CallerContext,
        user: &Username,
    ) -> Result<RemovedUser, TreeError> {
        Self::require_admin(caller, "remove users")?;
        let bookkeeping = |error| TreeError::Bookkeeping {
            folder: FolderKey::root(),
            error,
        };
        let grant_records = self.grants.purge_user(user).map_err(bookkeeping)?;
        let orphaned_folders = self.owners.purge_user(user).map_err(bookkeeping)?;
        tracing::info!(
            "Removed {} from {} grant records and {} owned folders",
            user,
            grant_records,
            orphaned_folders.len()
        );
        Ok(RemovedUser {
            grant_records,
            orphaned_folders,
        })
    }
}
