//! Permission-aware folder traversal.
//!
//! Every operation here produces a caller-safe view of part of the tree:
//!
//! - [`FolderTraversal::list_children`]: one level, cursor-paginated, with
//!   locked placeholders for folders that only lead to something visible.
//! - [`FolderTraversal::count_visible`] and
//!   [`FolderTraversal::count_visible_deep`]: totals restricted to what the
//!   caller may see, bounded by scan budgets.
//! - [`FolderTraversal::folder_list`]: the flat list of visible folders.
//!
//! Grants and encryption markers are loaded once per call into a [`View`];
//! nothing here writes to any store.

mod count;
mod folders;
mod list;
pub mod sort;

use std::collections::VecDeque;
use std::io;

use folio_protocol::{CallerContext, FolderKey, ProtocolError};
use thiserror::Error;

use crate::config::TraversalConfig;
use crate::crypto::{EncryptedSet, EncryptionMarkers, EncryptionSnapshot, FolderCrypto};
use crate::grants::{GrantMap, GrantSnapshot, GrantStore};
use crate::metadata::MetadataCache;
use crate::storage::{join, EntryStat, StorageAdapter};
use crate::store::{JsonFileStore, KeyValueStore};

pub use sort::natural_cmp;

/// Directory names never shown to anyone.
const SKIPPED_DIRS: &[&str] = &["trash", "profile_pics"];

/// Returns true for internal directories and hidden entries.
pub fn is_skipped(name: &str) -> bool {
    name.starts_with('.') || SKIPPED_DIRS.iter().any(|s| name.eq_ignore_ascii_case(s))
}

/// Errors that can occur while traversing.
#[derive(Debug, Error)]
pub enum TraversalError {
    /// The requested folder key is malformed.
    #[error("invalid folder: {0}")]
    InvalidFolder(#[from] ProtocolError),

    /// The requested folder does not exist.
    #[error("folder not found: {0}")]
    NotFound(FolderKey),

    /// The storage backend failed.
    #[error("storage error on {path:?}: {source}")]
    Storage {
        path: String,
        #[source]
        source: io::Error,
    },

    /// A grant or marker document could not be loaded.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Cost bounds applied to every traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalLimits {
    pub probe_depth: usize,
    pub probe_scan_limit: usize,
    pub count_scan_cap: usize,
    pub deep_scan_limit: usize,
    pub page_limit: usize,
    pub max_page_limit: usize,
    pub folder_list_limit: usize,
}

impl Default for TraversalLimits {
    fn default() -> Self {
        Self::from(&TraversalConfig::default())
    }
}

impl From<&TraversalConfig> for TraversalLimits {
    fn from(config: &TraversalConfig) -> Self {
        Self {
            probe_depth: config.probe_depth,
            probe_scan_limit: config.probe_scan_limit,
            count_scan_cap: config.count_scan_cap,
            deep_scan_limit: config.deep_scan_limit,
            page_limit: config.page_limit,
            max_page_limit: config.max_page_limit,
            folder_list_limit: config.folder_list_limit,
        }
    }
}

/// Grants and markers as seen by one caller for the duration of one call.
///
/// A `None` caller is an internal call and sees everything.
pub(crate) struct View<'c> {
    caller: Option<&'c CallerContext>,
    grants: GrantSnapshot,
    crypto: EncryptionSnapshot,
}

impl<'c> View<'c> {
    fn can_view(&self, key: &FolderKey) -> bool {
        self.caller.is_none_or(|c| self.grants.can_view(c, key))
    }

    fn can_read(&self, key: &FolderKey) -> bool {
        self.caller.is_none_or(|c| self.grants.can_read(c, key))
    }

    fn is_encrypted(&self, key: &FolderKey) -> bool {
        self.crypto.is_encrypted_or_ancestor(key)
    }

    /// Whether the caller may count the files directly inside `key`.
    fn files_countable(&self, key: &FolderKey) -> bool {
        self.can_read(key) && !self.is_encrypted(key)
    }

    /// Whether this view sees every folder regardless of grants.
    fn sees_everything(&self) -> bool {
        self.caller.is_none_or(|c| c.is_admin())
    }

    /// Whether any grant could make a folder strictly below `key` visible.
    ///
    /// Visibility requires a grant record, so this rules out most probes
    /// without touching storage.
    fn may_have_visible_below(&self, key: &FolderKey) -> bool {
        match self.caller {
            None => true,
            Some(c) if c.is_admin() => true,
            Some(c) => self
                .grants
                .folders()
                .any(|folder| folder.is_descendant_of(key) && self.grants.can_view(c, folder)),
        }
    }
}

/// Read-only traversal over one storage backend.
pub struct FolderTraversal<'a, G = JsonFileStore<GrantMap>, E = JsonFileStore<EncryptedSet>> {
    storage: &'a dyn StorageAdapter,
    grants: &'a GrantStore<G>,
    crypto: &'a EncryptionMarkers<E>,
    metadata: &'a MetadataCache,
    limits: TraversalLimits,
}

impl<'a, G, E> FolderTraversal<'a, G, E>
where
    G: KeyValueStore<GrantMap>,
    E: KeyValueStore<EncryptedSet>,
{
    pub fn new(
        storage: &'a dyn StorageAdapter,
        grants: &'a GrantStore<G>,
        crypto: &'a EncryptionMarkers<E>,
        metadata: &'a MetadataCache,
        limits: TraversalLimits,
    ) -> Self {
        Self {
            storage,
            grants,
            crypto,
            metadata,
            limits,
        }
    }

    /// The bounds this traversal enforces.
    pub fn limits(&self) -> &TraversalLimits {
        &self.limits
    }

    fn view<'c>(&self, caller: Option<&'c CallerContext>) -> Result<View<'c>, TraversalError> {
        Ok(View {
            caller,
            grants: self.grants.snapshot()?,
            crypto: self.crypto.snapshot()?,
        })
    }

    /// Fail with `NotFound` unless `key` is an existing directory.
    fn require_dir(&self, key: &FolderKey) -> Result<(), TraversalError> {
        let path = key.storage_path();
        match self.storage.stat(path) {
            Ok(Some(stat)) if stat.is_dir() => Ok(()),
            Ok(_) => Err(TraversalError::NotFound(key.clone())),
            Err(source) => Err(TraversalError::Storage {
                path: path.to_string(),
                source,
            }),
        }
    }

    /// Whether `key` exists as a directory, for a caller already allowed
    /// into it.
    ///
    /// Callers who do not see everything get `Ok(false)` for a missing
    /// folder, the same answer a hidden folder gives them.
    fn open_dir(&self, view: &View<'_>, key: &FolderKey) -> Result<bool, TraversalError> {
        match self.require_dir(key) {
            Ok(()) => Ok(true),
            Err(TraversalError::NotFound(_)) if !view.sees_everything() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Whether the caller may enter `key` at all: it is viewable or the
    /// probe finds something viewable below it.
    fn can_enter(&self, view: &View<'_>, key: &FolderKey) -> bool {
        view.can_view(key) || self.has_visible_descendant(view, key)
    }

    /// Visible entry names of `key`, in natural order.
    fn list_names(&self, key: &FolderKey) -> Result<Vec<String>, TraversalError> {
        let path = key.storage_path();
        let mut names: Vec<String> = self
            .storage
            .list(path)
            .map_err(|source| TraversalError::Storage {
                path: path.to_string(),
                source,
            })?
            .into_iter()
            .filter(|name| !is_skipped(name))
            .collect();
        sort::sort_natural(&mut names);
        Ok(names)
    }

    /// Stat one entry of `parent`, treating failures as a vanished entry.
    fn entry_stat(&self, parent: &FolderKey, name: &str) -> Option<EntryStat> {
        let path = join(parent.storage_path(), name);
        match self.storage.stat(&path) {
            Ok(stat) => stat,
            Err(e) => {
                tracing::debug!("Skipping {:?}: {}", path, e);
                None
            }
        }
    }

    /// Key of a child directory, or `None` if its name cannot be a folder key.
    fn child_key(parent: &FolderKey, name: &str) -> Option<FolderKey> {
        match parent.child(name) {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::debug!("Skipping unaddressable entry {:?} in {}: {}", name, parent, e);
                None
            }
        }
    }

    /// Bounded breadth-first search for a folder the caller can view strictly
    /// below `key`.
    fn has_visible_descendant(&self, view: &View<'_>, key: &FolderKey) -> bool {
        self.probe_below(view, key, self.limits.probe_scan_limit).found
    }

    /// Run the locked probe under `key`, inspecting at most `scan_limit`
    /// entries (and never more than `probe_scan_limit`).
    fn probe_below(&self, view: &View<'_>, key: &FolderKey, scan_limit: usize) -> Probe {
        let mut probe = Probe::default();
        if self.limits.probe_depth == 0 || !view.may_have_visible_below(key) {
            return probe;
        }
        let scan_limit = scan_limit.min(self.limits.probe_scan_limit);

        let mut queue = VecDeque::from([(key.clone(), 0usize)]);
        while let Some((dir, depth)) = queue.pop_front() {
            let names = match self.list_names(&dir) {
                Ok(names) => names,
                Err(e) => {
                    tracing::debug!("Probe could not list {}: {}", dir, e);
                    continue;
                }
            };
            for name in names {
                if probe.scanned >= scan_limit {
                    tracing::debug!("Probe under {} stopped after {} entries", key, probe.scanned);
                    probe.exhausted = true;
                    return probe;
                }
                probe.scanned += 1;
                let is_dir = self.entry_stat(&dir, &name).is_some_and(|s| s.is_dir());
                let Some(child) = is_dir.then(|| Self::child_key(&dir, &name)).flatten() else {
                    continue;
                };
                if view.can_view(&child) {
                    probe.found = true;
                    return probe;
                }
                if depth + 1 < self.limits.probe_depth {
                    queue.push_back((child, depth + 1));
                }
            }
        }
        probe
    }
}

/// Outcome of one locked probe.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Probe {
    /// A viewable folder was found.
    found: bool,
    /// Entries inspected.
    scanned: usize,
    /// The scan limit ran out with entries left.
    exhausted: bool,
}
