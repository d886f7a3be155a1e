use std::cmp::Ordering;

use folio_protocol::{CallerContext, FolderKey, FolderListingRow, ListPage};

use super::sort::natural_cmp;
use super::{FolderTraversal, TraversalError, View};
use crate::crypto::EncryptedSet;
use crate::grants::GrantMap;
use crate::store::KeyValueStore;

impl<'a, G, E> FolderTraversal<'a, G, E>
where
    G: KeyValueStore<GrantMap>,
    E: KeyValueStore<EncryptedSet>,
{
    /// List the subfolders of `folder` that `caller` may see, one page at a time.
    ///
    /// Folders the caller can view come back as visible rows (with
    /// `has_subfolders`/`non_empty` hints when `probe` is set). Folders the
    /// caller cannot view come back as locked rows only if the bounded probe
    /// finds a visible descendant, and are omitted otherwise. `cursor` is the
    /// last name of the previous page; `limit` defaults to the configured
    /// page size and is clamped to the maximum.
    ///
    /// A folder the caller may not enter yields an empty page whether it
    /// exists or not. Only administrators get `NotFound`.
    pub fn list_children(
        &self,
        folder: &FolderKey,
        caller: &CallerContext,
        cursor: Option<&str>,
        limit: Option<usize>,
        probe: bool,
    ) -> Result<ListPage, TraversalError> {
        let view = self.view(Some(caller))?;
        if !self.can_enter(&view, folder) || !self.open_dir(&view, folder)? {
            return Ok(ListPage::default());
        }

        let limit = limit
            .unwrap_or(self.limits.page_limit)
            .clamp(1, self.limits.max_page_limit.max(1));

        let mut page = ListPage::default();
        for name in self.list_names(folder)? {
            if cursor.is_some_and(|c| natural_cmp(&name, c) != Ordering::Greater) {
                continue;
            }
            let Some(row) = self.row_for(&view, folder, &name, probe) else {
                continue;
            };
            if page.items.len() == limit {
                page.next_cursor = page.items.last().map(|last| last.name.clone());
                break;
            }
            page.items.push(row);
        }

        tracing::debug!(
            "Listed {} rows of {} for {} (more: {})",
            page.items.len(),
            folder,
            caller.username,
            page.next_cursor.is_some()
        );
        Ok(page)
    }

    /// The row `caller` sees for the entry `name` of `parent`, if any.
    fn row_for(
        &self,
        view: &View<'_>,
        parent: &FolderKey,
        name: &str,
        probe: bool,
    ) -> Option<FolderListingRow> {
        if !self.entry_stat(parent, name)?.is_dir() {
            return None;
        }
        let child = Self::child_key(parent, name)?;

        if view.can_view(&child) {
            let encrypted = view.is_encrypted(&child);
            let mut row = FolderListingRow::visible(name);
            row.encrypted = Some(encrypted);
            if probe {
                let (has_subfolders, non_empty) = self.shallow_probe(&child);
                row.has_subfolders = Some(has_subfolders);
                if !encrypted {
                    row.non_empty = Some(non_empty);
                }
            }
            return Some(row);
        }

        if self.has_visible_descendant(view, &child) {
            return Some(FolderListingRow::locked(name));
        }
        None
    }

    /// Single-level early-exit scan: (has a subfolder, has any entry).
    fn shallow_probe(&self, key: &FolderKey) -> (bool, bool) {
        let names = match self.list_names(key) {
            Ok(names) => names,
            Err(e) => {
                tracing::debug!("Could not probe {}: {}", key, e);
                return (false, false);
            }
        };

        let non_empty = !names.is_empty();
        let has_subfolders = names
            .iter()
            .any(|name| self.entry_stat(key, name).is_some_and(|s| s.is_dir()));
        (has_subfolders, non_empty)
    }
}
