//! Per-folder capability grants.
//!
//! The grant document maps each [`FolderKey`] to a [`GrantRecord`] of fourteen
//! buckets. Folder keys are independent rows: there is no inheritance walk at
//! query time, inheritance only happens when a folder is created.
//!
//! Reads go through a [`GrantSnapshot`] so that a traversal touching thousands
//! of folders loads the document once. Writes go through [`GrantStore`], whose
//! every mutation is a single locked read-modify-write of the whole document.

pub mod capability;
pub mod record;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Result;
use folio_protocol::{CallerContext, FolderGrants, FolderKey, Username};

use crate::store::{JsonFileStore, KeyValueStore};

pub use capability::{derive, Capability};
pub use record::{Bucket, GrantRecord, LegacyBuckets};

/// The persisted grant document.
pub type GrantMap = BTreeMap<FolderKey, GrantRecord>;

/// An immutable view of the grant document used for authorization decisions.
#[derive(Debug, Clone, Default)]
pub struct GrantSnapshot {
    records: GrantMap,
}

impl GrantSnapshot {
    /// Wrap a loaded grant document.
    pub fn new(records: GrantMap) -> Self {
        Self { records }
    }

    /// The record stored for exactly `folder`, if any.
    pub fn record(&self, folder: &FolderKey) -> Option<&GrantRecord> {
        self.records.get(folder)
    }

    /// Every folder with a stored record.
    pub fn folders(&self) -> impl Iterator<Item = &FolderKey> {
        self.records.keys()
    }

    /// Whether the session marks the caller as a global administrator.
    pub fn is_admin(&self, caller: &CallerContext) -> bool {
        caller.is_admin()
    }

    /// Whether the caller is an administrator or a listed owner of `folder`.
    pub fn is_owner(&self, caller: &CallerContext, folder: &FolderKey) -> bool {
        caller.is_admin()
            || self
                .record(folder)
                .is_some_and(|r| r.contains(Bucket::Owners, &caller.username))
    }

    /// Whether the caller holds `capability` on `folder`.
    pub fn can(&self, caller: &CallerContext, folder: &FolderKey, capability: Capability) -> bool {
        derive(self.record(folder), caller, capability)
    }

    /// Whether the caller may see `folder` at all (full read or read-own).
    pub fn can_view(&self, caller: &CallerContext, folder: &FolderKey) -> bool {
        self.can(caller, folder, Capability::ReadOwn)
    }
}

/// Generates one named check per capability on both the snapshot and the store.
macro_rules! capability_checks {
    ($($(#[$doc:meta])* $name:ident => $cap:expr;)*) => {
        impl GrantSnapshot {
            $(
                $(#[$doc])*
                pub fn $name(&self, caller: &CallerContext, folder: &FolderKey) -> bool {
                    self.can(caller, folder, $cap)
                }
            )*
        }

        impl<S: KeyValueStore<GrantMap>> GrantStore<S> {
            $(
                $(#[$doc])*
                pub fn $name(&self, caller: &CallerContext, folder: &FolderKey) -> Result<bool> {
                    Ok(self.snapshot()?.$name(caller, folder))
                }
            )*
        }
    };
}

capability_checks! {
    /// Full read of the folder and all its files.
    can_read => Capability::Read;
    /// Read of the caller's own files (implied by full read).
    can_read_own => Capability::ReadOwn;
    /// Legacy write bucket.
    can_write => Capability::Write;
    /// Manage grants; owners only.
    can_manage => Capability::Manage;
    /// Any form of sharing.
    can_share => Capability::Share;
    /// Upload files and create subfolders.
    can_create => Capability::Create;
    can_edit => Capability::Edit;
    can_rename => Capability::Rename;
    can_copy => Capability::Copy;
    can_move => Capability::Move;
    can_delete => Capability::Delete;
    can_extract => Capability::Extract;
    can_share_file => Capability::ShareFile;
    can_share_folder => Capability::ShareFolder;
}

/// Apply the save-time business rules to a grant payload.
///
/// `share_folder` forces `view`; `share_file` forces `view_own` unless some
/// view is already granted; either granular share forces the umbrella `share`.
fn normalize_grants(mut grants: FolderGrants) -> FolderGrants {
    if grants.share_folder {
        grants.view = true;
    }
    if grants.share_file && !grants.view && !grants.view_own {
        grants.view_own = true;
    }
    if grants.share_file || grants.share_folder {
        grants.share = true;
    }
    grants
}

fn bucket_flags(grants: &FolderGrants) -> [(Bucket, bool); 14] {
    [
        (Bucket::Owners, grants.manage),
        (Bucket::Read, grants.view),
        (Bucket::Write, grants.upload),
        (Bucket::Share, grants.share),
        (Bucket::ReadOwn, grants.view_own),
        (Bucket::Create, grants.create),
        (Bucket::Edit, grants.edit),
        (Bucket::Rename, grants.rename),
        (Bucket::Copy, grants.copy),
        (Bucket::Move, grants.move_),
        (Bucket::Delete, grants.delete),
        (Bucket::Extract, grants.extract),
        (Bucket::ShareFile, grants.share_file),
        (Bucket::ShareFolder, grants.share_folder),
    ]
}

/// Single source of truth for per-folder capability buckets.
pub struct GrantStore<S = JsonFileStore<GrantMap>> {
    store: S,
}

impl GrantStore<JsonFileStore<GrantMap>> {
    /// Open the grant document at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        Self::new(JsonFileStore::new(path))
    }
}

impl<S: KeyValueStore<GrantMap>> GrantStore<S> {
    /// Create a grant store over any document store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Load an immutable snapshot for a batch of authorization decisions.
    pub fn snapshot(&self) -> Result<GrantSnapshot> {
        Ok(GrantSnapshot::new(self.store.load()?))
    }

    /// The five legacy buckets stored for exactly `folder`.
    pub fn explicit(&self, folder: &FolderKey) -> Result<LegacyBuckets> {
        Ok(self.explicit_all(folder)?.legacy())
    }

    /// The full record stored for exactly `folder` (empty if none).
    pub fn explicit_all(&self, folder: &FolderKey) -> Result<GrantRecord> {
        Ok(self.store.load()?.remove(folder).unwrap_or_default())
    }

    /// Whether the caller is a global administrator.
    pub fn is_admin(&self, caller: &CallerContext) -> bool {
        caller.is_admin()
    }

    /// Whether the caller is an administrator or a listed owner of `folder`.
    pub fn is_owner(&self, caller: &CallerContext, folder: &FolderKey) -> Result<bool> {
        Ok(self.snapshot()?.is_owner(caller, folder))
    }

    /// Replace the owners/read/write/share buckets of `folder`.
    ///
    /// Other buckets of an existing record are left untouched.
    pub fn upsert(
        &self,
        folder: &FolderKey,
        owners: BTreeSet<Username>,
        read: BTreeSet<Username>,
        write: BTreeSet<Username>,
        share: BTreeSet<Username>,
    ) -> Result<()> {
        self.store.update(|records| {
            let record = records.entry(folder.clone()).or_default();
            record.owners = owners;
            record.read = read;
            record.write = write;
            record.share = share;
            Ok(())
        })?;
        tracing::debug!("Upserted legacy grants for {}", folder);
        Ok(())
    }

    /// Create `{owners: [creator]}` for `folder` unless a record already exists.
    ///
    /// Returns true if a record was created.
    pub fn ensure_folder_record(&self, folder: &FolderKey, creator: &Username) -> Result<bool> {
        let created = self.store.update(|records| {
            if records.contains_key(folder) {
                return Ok(false);
            }
            records.insert(folder.clone(), GrantRecord::with_owner(creator.clone()));
            Ok(true)
        })?;
        if created {
            tracing::debug!("Created grant record for {} owned by {}", folder, creator);
        }
        Ok(created)
    }

    /// Seed `child` from `parent`'s owners/read/write/share plus `creator` as owner.
    pub fn inherit_from_parent(
        &self,
        parent: &FolderKey,
        child: &FolderKey,
        creator: &Username,
    ) -> Result<()> {
        self.store.update(|records| {
            let inherited = records.get(parent).cloned().unwrap_or_default();
            let record = records.entry(child.clone()).or_default();
            record.owners = inherited.owners;
            record.owners.insert(creator.clone());
            record.read = inherited.read;
            record.write = inherited.write;
            record.share = inherited.share;
            Ok(())
        })?;
        tracing::debug!("Seeded grants for {} from {}", child, parent);
        Ok(())
    }

    /// Rewrite one user's membership across many folders in a single save.
    ///
    /// Returns the folders whose record actually changed.
    pub fn apply_user_grants_atomic(
        &self,
        user: &Username,
        grants_by_folder: &BTreeMap<FolderKey, FolderGrants>,
    ) -> Result<BTreeSet<FolderKey>> {
        let changed = self.store.update(|records| {
            let mut changed = BTreeSet::new();
            for (folder, grants) in grants_by_folder {
                let grants = normalize_grants(*grants);
                let record = records.entry(folder.clone()).or_default();
                let mut folder_changed = false;
                for (bucket, present) in bucket_flags(&grants) {
                    folder_changed |= record.set(bucket, user, present);
                }
                if folder_changed {
                    changed.insert(folder.clone());
                }
            }
            Ok(changed)
        })?;

        tracing::info!(
            "Applied grants for {} across {} folders ({} changed)",
            user,
            grants_by_folder.len(),
            changed.len()
        );
        Ok(changed)
    }

    /// Re-key `old` and every key beneath it to sit under `new`.
    ///
    /// Returns the number of records moved.
    pub fn rename_tree(&self, old: &FolderKey, new: &FolderKey) -> Result<usize> {
        let moved = self.store.update(|records| {
            let affected: Vec<FolderKey> = records
                .keys()
                .filter(|key| key.is_self_or_descendant_of(old))
                .cloned()
                .collect();
            for key in &affected {
                if let (Some(record), Some(rebased)) = (records.remove(key), key.rebase(old, new)) {
                    records.insert(rebased, record);
                }
            }
            Ok(affected.len())
        })?;
        tracing::debug!("Re-keyed {} grant records from {} to {}", moved, old, new);
        Ok(moved)
    }

    /// Remove `key` and every key beneath it.
    ///
    /// Returns the number of records removed.
    pub fn delete_tree(&self, key: &FolderKey) -> Result<usize> {
        let removed = self.store.update(|records| {
            let before = records.len();
            records.retain(|k, _| !k.is_self_or_descendant_of(key));
            Ok(before - records.len())
        })?;
        tracing::debug!("Removed {} grant records under {}", removed, key);
        Ok(removed)
    }

    /// Remove `user` from every bucket of every folder.
    ///
    /// Returns the number of records changed.
    pub fn purge_user(&self, user: &Username) -> Result<usize> {
        let changed = self.store.update(|records| {
            Ok(records
                .values_mut()
                .map(|record| record.remove_user(user))
                .filter(|changed| *changed)
                .count())
        })?;
        tracing::info!("Purged {} from {} grant records", user, changed);
        Ok(changed)
    }
}
