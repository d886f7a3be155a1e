use folio_protocol::{CallerContext, CountResult, FolderKey};

use super::{FolderTraversal, TraversalError, View};
use crate::crypto::EncryptedSet;
use crate::grants::GrantMap;
use crate::metadata::FolderMetadata;
use crate::storage::EntryStat;
use crate::store::KeyValueStore;

impl<'a, G, E> FolderTraversal<'a, G, E>
where
    G: KeyValueStore<GrantMap>,
    E: KeyValueStore<EncryptedSet>,
{
    /// Count the immediate contents of `folder` that `caller` may see.
    ///
    /// Returns zeros if the caller cannot view the folder or, unless they are
    /// an administrator, if it does not exist. Subfolders are
    /// counted when viewable; files only when the caller has full read on
    /// `folder` and it is not encrypted. At most `count_scan_cap` entries
    /// are inspected and the result is never marked truncated.
    pub fn count_visible(
        &self,
        folder: &FolderKey,
        caller: &CallerContext,
    ) -> Result<CountResult, TraversalError> {
        let view = self.view(Some(caller))?;
        let mut counts = CountResult::default();
        if !view.can_view(folder) || !self.open_dir(&view, folder)? {
            return Ok(counts);
        }

        let names = self.list_names(folder)?;
        if names.len() > self.limits.count_scan_cap {
            tracing::debug!(
                "Counting only the first {} of {} entries in {}",
                self.limits.count_scan_cap,
                names.len(),
                folder
            );
        }

        let mut files = FileTally::new(self, &view, folder);
        for name in names.into_iter().take(self.limits.count_scan_cap) {
            let Some(stat) = self.entry_stat(folder, &name) else {
                continue;
            };
            if stat.is_dir() {
                if Self::child_key(folder, &name).is_some_and(|child| view.can_view(&child)) {
                    counts.folders += 1;
                }
            } else if stat.is_file() {
                files.add(&mut counts, &name, &stat);
            }
        }
        Ok(counts)
    }

    /// Count everything below `folder` that `caller` may see.
    ///
    /// The walk uses an explicit stack. Full read is decided per directory.
    /// Folders the caller cannot view are entered only when the locked probe
    /// finds a visible descendant; encrypted folders are never entered. At
    /// most `max_scan` entries (default `deep_scan_limit`) are inspected,
    /// counting the entries each probe looks at, and directories deeper than
    /// `max_depth` below `folder` are not entered. `truncated` is set when
    /// the budget runs out with entries left.
    pub fn count_visible_deep(
        &self,
        folder: &FolderKey,
        caller: &CallerContext,
        max_scan: Option<usize>,
        max_depth: Option<usize>,
    ) -> Result<CountResult, TraversalError> {
        let view = self.view(Some(caller))?;
        let budget = max_scan.unwrap_or(self.limits.deep_scan_limit);
        let mut counts = CountResult::default();

        let mut scanned = 0usize;
        if !view.can_view(folder) {
            let probe = self.probe_below(&view, folder, budget);
            scanned += probe.scanned;
            if !probe.found {
                return Ok(counts);
            }
        }
        if !self.open_dir(&view, folder)? {
            return Ok(counts);
        }

        let mut stack = vec![(folder.clone(), 0usize)];
        'walk: while let Some((dir, depth)) = stack.pop() {
            let names = if dir == *folder {
                self.list_names(&dir)?
            } else {
                match self.list_names(&dir) {
                    Ok(names) => names,
                    Err(e) => {
                        tracing::warn!("Skipping unreadable folder {}: {}", dir, e);
                        continue;
                    }
                }
            };

            let mut files = FileTally::new(self, &view, &dir);
            let mut children = Vec::new();
            for name in names {
                if scanned >= budget {
                    counts.truncated = true;
                    break 'walk;
                }
                scanned += 1;

                let Some(stat) = self.entry_stat(&dir, &name) else {
                    continue;
                };
                if stat.is_file() {
                    files.add(&mut counts, &name, &stat);
                    continue;
                }
                if !stat.is_dir() {
                    continue;
                }
                let Some(child) = Self::child_key(&dir, &name) else {
                    continue;
                };

                let visible = view.can_view(&child);
                if visible {
                    counts.folders += 1;
                }
                let child_depth = depth + 1;
                let within_depth = max_depth.is_none_or(|max| child_depth <= max);
                if !within_depth || view.is_encrypted(&child) {
                    continue;
                }
                if !visible {
                    let probe = self.probe_below(&view, &child, budget - scanned);
                    scanned += probe.scanned;
                    if probe.exhausted && scanned >= budget {
                        counts.truncated = true;
                        break 'walk;
                    }
                    if !probe.found {
                        continue;
                    }
                }
                children.push((child, child_depth));
            }
            // Reverse so the stack pops children in natural order.
            stack.extend(children.into_iter().rev());
        }

        if counts.truncated {
            tracing::debug!("Deep count of {} truncated after {} entries", folder, scanned);
        }
        Ok(counts)
    }
}

/// Folds the files of one directory into a count, when the caller may count them.
struct FileTally<'t, 'a, G, E> {
    traversal: &'t FolderTraversal<'a, G, E>,
    folder: &'t FolderKey,
    countable: bool,
    metadata: Option<FolderMetadata>,
}

impl<'t, 'a, G, E> FileTally<'t, 'a, G, E>
where
    G: KeyValueStore<GrantMap>,
    E: KeyValueStore<EncryptedSet>,
{
    fn new(traversal: &'t FolderTraversal<'a, G, E>, view: &View<'_>, folder: &'t FolderKey) -> Self {
        Self {
            traversal,
            folder,
            countable: view.files_countable(folder),
            metadata: None,
        }
    }

    fn add(&mut self, counts: &mut CountResult, name: &str, stat: &EntryStat) {
        if !self.countable {
            return;
        }
        if self.metadata.is_none() {
            let loaded = self.traversal.metadata.load(self.folder).unwrap_or_else(|e| {
                tracing::debug!("No metadata for {}: {:#}", self.folder, e);
                FolderMetadata::default()
            });
            self.metadata = Some(loaded);
        }
        let uploaded = self
            .metadata
            .as_ref()
            .and_then(|entries| entries.get(name))
            .and_then(|meta| meta.uploaded);
        counts.add_file(stat.size, stat.mtime, uploaded);
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{caller, key, Fixture};
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_read_own_counts_folders_but_no_files() {
        let fx = Fixture::new();
        fx.dir("shared/sub");
        fx.file("shared/a.txt", 10);
        fx.file("shared/b.txt", 20);
        fx.grant_read_own("shared", "u");
        fx.grant_read_own("shared/sub", "u");

        let counts = fx
            .traversal()
            .count_visible(&key("shared"), &caller("u"))
            .unwrap();
        assert_eq!(counts.files, 0);
        assert_eq!(counts.bytes, 0);
        assert_eq!(counts.folders, 1);
        assert!(!counts.truncated);
    }

    #[test]
    fn test_full_read_counts_files_and_visible_folders() {
        let fx = Fixture::new();
        fx.dir("shared/visible");
        fx.dir("shared/hidden");
        fx.file("shared/a.txt", 10);
        fx.file("shared/b.txt", 20);
        fx.grant_read("shared", "u");
        fx.grant_read("shared/visible", "u");

        let counts = fx
            .traversal()
            .count_visible(&key("shared"), &caller("u"))
            .unwrap();
        assert_eq!(counts.files, 2);
        assert_eq!(counts.bytes, 30);
        assert_eq!(counts.folders, 1);
    }

    #[test]
    fn test_unviewable_folder_counts_zero() {
        let fx = Fixture::new();
        fx.file("secret/a.txt", 10);

        let counts = fx
            .traversal()
            .count_visible(&key("secret"), &caller("u"))
            .unwrap();
        assert_eq!(counts, CountResult::default());
    }

    #[test]
    fn test_count_scan_cap() {
        let mut fx = Fixture::new();
        for i in 0..10 {
            fx.file(&format!("big/f{i}.txt"), 1);
        }
        fx.limits.count_scan_cap = 4;
        let admin = CallerContext::admin("root").unwrap();

        let counts = fx.traversal().count_visible(&key("big"), &admin).unwrap();
        assert_eq!(counts.files, 4);
        assert!(!counts.truncated);
    }

    #[test]
    fn test_earliest_uploaded_comes_from_metadata() {
        let fx = Fixture::new();
        fx.file("docs/a.txt", 1);
        fx.file("docs/b.txt", 1);
        let early = Utc.with_ymd_and_hms(2023, 5, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        fx.metadata.record_upload(&key("docs"), "a.txt", "alice", late).unwrap();
        fx.metadata.record_upload(&key("docs"), "b.txt", "alice", early).unwrap();
        let admin = CallerContext::admin("root").unwrap();

        let counts = fx.traversal().count_visible(&key("docs"), &admin).unwrap();
        assert_eq!(counts.earliest_uploaded, Some(early));
        assert!(counts.latest_mtime.is_some());
    }

    #[test]
    fn test_deep_count_truncates() {
        let fx = Fixture::new();
        for i in 0..10 {
            fx.file(&format!("f{i}.txt"), 100);
        }
        let admin = CallerContext::admin("root").unwrap();

        let counts = fx
            .traversal()
            .count_visible_deep(&FolderKey::root(), &admin, Some(5), None)
            .unwrap();
        assert!(counts.truncated);
        assert_eq!(counts.files, 5);
        assert_eq!(counts.bytes, 500);
    }

    #[test]
    fn test_deep_count_exact_budget_is_not_truncated() {
        let fx = Fixture::new();
        for i in 0..5 {
            fx.file(&format!("f{i}.txt"), 1);
        }
        let admin = CallerContext::admin("root").unwrap();

        let counts = fx
            .traversal()
            .count_visible_deep(&FolderKey::root(), &admin, Some(5), None)
            .unwrap();
        assert!(!counts.truncated);
        assert_eq!(counts.files, 5);
    }

    #[test]
    fn test_deep_count_reevaluates_read_per_directory() {
        let fx = Fixture::new();
        fx.file("top/a.txt", 1);
        fx.file("top/mid/b.txt", 2);
        fx.file("top/mid/deep/c.txt", 4);
        fx.grant_read_own("top", "u");
        fx.grant_read("top/mid/deep", "u");

        let counts = fx
            .traversal()
            .count_visible_deep(&key("top"), &caller("u"), None, None)
            .unwrap();
        // mid is entered through the probe but its files stay hidden.
        assert_eq!(counts.files, 1);
        assert_eq!(counts.bytes, 4);
        assert_eq!(counts.folders, 1);
    }

    #[test]
    fn test_deep_count_max_depth() {
        let fx = Fixture::new();
        fx.file("a.txt", 1);
        fx.file("one/b.txt", 1);
        fx.file("one/two/c.txt", 1);
        let admin = CallerContext::admin("root").unwrap();
        let traversal = fx.traversal();

        let shallow = traversal
            .count_visible_deep(&FolderKey::root(), &admin, None, Some(0))
            .unwrap();
        assert_eq!((shallow.files, shallow.folders), (1, 1));

        let one = traversal
            .count_visible_deep(&FolderKey::root(), &admin, None, Some(1))
            .unwrap();
        assert_eq!((one.files, one.folders), (2, 2));

        let all = traversal
            .count_visible_deep(&FolderKey::root(), &admin, None, None)
            .unwrap();
        assert_eq!((all.files, all.folders), (3, 2));
    }

    #[test]
    fn test_deep_count_skips_encrypted_contents() {
        let fx = Fixture::new();
        fx.file("plain/a.txt", 1);
        fx.file("vault/b.txt", 1);
        fx.file("vault/inner/c.txt", 1);
        fx.crypto.mark(&key("vault")).unwrap();
        let admin = CallerContext::admin("root").unwrap();

        let counts = fx
            .traversal()
            .count_visible_deep(&FolderKey::root(), &admin, None, None)
            .unwrap();
        assert_eq!(counts.files, 1);
        assert_eq!(counts.folders, 2);
    }

    #[test]
    fn test_deep_count_charges_probes_to_budget() {
        let fx = Fixture::new();
        for i in 0..4 {
            fx.dir(&format!("top/hidden/x{i}"));
        }
        fx.grant_read("top/hidden/x3", "u");
        let u = caller("u");
        let traversal = fx.traversal();

        // 5 entries for the probe from top, 1 + 4 for the probe from hidden,
        // 4 more for the walk through hidden.
        let all = traversal
            .count_visible_deep(&key("top"), &u, None, None)
            .unwrap();
        assert_eq!(all.folders, 1);
        assert!(!all.truncated);

        let exact = traversal
            .count_visible_deep(&key("top"), &u, Some(14), None)
            .unwrap();
        assert_eq!(exact, all);

        let short = traversal
            .count_visible_deep(&key("top"), &u, Some(9), None)
            .unwrap();
        assert!(short.truncated);
        assert_eq!(short.folders, 0);
    }

    #[test]
    fn test_missing_folder_counts_zero_for_users() {
        let fx = Fixture::new();
        fx.grant_read("ghost", "u");
        let u = caller("u");
        let traversal = fx.traversal();

        assert_eq!(
            traversal.count_visible(&key("ghost"), &u).unwrap(),
            CountResult::default()
        );
        assert_eq!(
            traversal.count_visible_deep(&key("ghost"), &u, None, None).unwrap(),
            CountResult::default()
        );
    }
}
