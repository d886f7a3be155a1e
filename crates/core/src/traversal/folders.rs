use folio_protocol::{CallerContext, FolderKey, FolderSummary};

use super::{FolderTraversal, TraversalError, View};
use crate::crypto::EncryptedSet;
use crate::grants::GrantMap;
use crate::metadata::MetadataCache;
use crate::store::KeyValueStore;

impl<'a, G, E> FolderTraversal<'a, G, E>
where
    G: KeyValueStore<GrantMap>,
    E: KeyValueStore<EncryptedSet>,
{
    /// Flat pre-order list of the folders under `parent` (root by default),
    /// including `parent` itself.
    ///
    /// With a caller, only folders they can view are returned and the walk
    /// prunes branches no grant could make visible. Without one, every
    /// folder is returned. When `include_counts` is set, `file_count` holds
    /// the number of immediate files the caller may count. A missing
    /// `parent` is `NotFound` only for internal and administrator calls;
    /// other callers get the same empty list a hidden folder gives them.
    pub fn folder_list(
        &self,
        parent: Option<&FolderKey>,
        caller: Option<&CallerContext>,
        include_counts: bool,
    ) -> Result<Vec<FolderSummary>, TraversalError> {
        let start = parent.cloned().unwrap_or_else(FolderKey::root);
        let view = self.view(caller)?;
        if !view.can_view(&start) && !view.may_have_visible_below(&start) {
            return Ok(Vec::new());
        }
        if !self.open_dir(&view, &start)? {
            return Ok(Vec::new());
        }

        let mut summaries = Vec::new();
        let mut stack = vec![start];
        while let Some(dir) = stack.pop() {
            let names = match self.list_names(&dir) {
                Ok(names) => names,
                Err(e) => {
                    tracing::warn!("Skipping unreadable folder {}: {}", dir, e);
                    continue;
                }
            };

            if view.can_view(&dir) {
                if summaries.len() >= self.limits.folder_list_limit {
                    tracing::debug!(
                        "Folder list stopped at {} folders",
                        self.limits.folder_list_limit
                    );
                    break;
                }
                let file_count = if include_counts {
                    self.immediate_file_count(&view, &dir, &names)
                } else {
                    0
                };
                summaries.push(FolderSummary {
                    metadata_file: MetadataCache::file_name(&dir),
                    folder: dir.clone(),
                    file_count,
                });
            }

            let mut children = Vec::new();
            for name in &names {
                if !self.entry_stat(&dir, name).is_some_and(|s| s.is_dir()) {
                    continue;
                }
                let Some(child) = Self::child_key(&dir, name) else {
                    continue;
                };
                if view.can_view(&child) || view.may_have_visible_below(&child) {
                    children.push(child);
                }
            }
            stack.extend(children.into_iter().rev());
        }

        Ok(summaries)
    }

    fn immediate_file_count(&self, view: &View<'_>, dir: &FolderKey, names: &[String]) -> u64 {
        if !view.files_countable(dir) {
            return 0;
        }
        names
            .iter()
            .take(self.limits.count_scan_cap)
            .filter(|name| self.entry_stat(dir, name).is_some_and(|s| s.is_file()))
            .count() as u64
    }
}
