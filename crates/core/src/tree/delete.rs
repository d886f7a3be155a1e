use folio_protocol::FolderKey;

use super::{PathFailure, TreeError, TreeMutation};
use crate::crypto::EncryptedSet;
use crate::grants::GrantMap;
use crate::ownership::OwnerMap;
use crate::storage::{join, KEEP_MARKER};
use crate::store::KeyValueStore;

impl<'a, G, O, E> TreeMutation<'a, G, O, E>
where
    G: KeyValueStore<GrantMap>,
    O: KeyValueStore<OwnerMap>,
    E: KeyValueStore<EncryptedSet>,
{
    /// Delete `folder` if it is empty and purge its bookkeeping.
    ///
    /// Keep markers do not count as content on remote backends.
    pub fn delete_folder(&self, folder: &FolderKey) -> Result<(), TreeError> {
        if folder.is_root() {
            return Err(TreeError::Validation("the root folder cannot be deleted".to_string()));
        }
        self.require_dir(folder)?;

        let path = folder.storage_path();
        let entries = self.storage.list(path).map_err(Self::storage_error(path))?;
        let remote = !self.storage.is_local();
        if entries.iter().any(|name| !(remote && name == KEEP_MARKER)) {
            return Err(TreeError::NotEmpty(folder.clone()));
        }

        self.remove_empty_dir(path).map_err(Self::storage_error(path))?;

        let mut failures = Vec::new();
        self.purge_subtree(folder, &mut failures);
        if !failures.is_empty() {
            return Err(TreeError::PartialFailure { errors: failures });
        }

        tracing::info!("Deleted folder {}", folder);
        Ok(())
    }

    /// Delete `folder` and everything beneath it, then purge the subtree's
    /// bookkeeping.
    ///
    /// Files go first, then directories child-first. A failure on one path
    /// does not stop the walk; all failures are returned together.
    pub fn delete_folder_recursive_admin(&self, folder: &FolderKey) -> Result<(), TreeError> {
        if folder.is_root() {
            return Err(TreeError::Validation("the root folder cannot be deleted".to_string()));
        }
        self.require_dir(folder)?;

        let mut failures = Vec::new();
        let mut dirs = vec![folder.storage_path().to_string()];
        let mut stack = dirs.clone();
        let mut files_removed = 0usize;

        while let Some(dir) = stack.pop() {
            let names = match self.storage.list(&dir) {
                Ok(names) => names,
                Err(e) => {
                    failures.push(PathFailure::new(dir.as_str(), e));
                    continue;
                }
            };
            for name in names {
                let path = join(&dir, &name);
                match self.storage.stat(&path) {
                    Ok(Some(stat)) if stat.is_dir() => {
                        dirs.push(path.clone());
                        stack.push(path);
                    }
                    Ok(Some(_)) => match self.storage.remove(&path) {
                        Ok(()) => files_removed += 1,
                        Err(e) => failures.push(PathFailure::new(path, e)),
                    },
                    Ok(None) => {}
                    Err(e) => failures.push(PathFailure::new(path, e)),
                }
            }
        }

        // Every directory appears after its parent, so reverse order is child-first.
        for dir in dirs.iter().rev() {
            if let Err(e) = self.storage.remove(dir) {
                failures.push(PathFailure::new(dir.as_str(), e));
            }
        }

        self.purge_subtree(folder, &mut failures);

        if !failures.is_empty() {
            tracing::warn!(
                "Recursive delete of {} finished with {} failures",
                folder,
                failures.len()
            );
            return Err(TreeError::PartialFailure { errors: failures });
        }

        tracing::info!(
            "Deleted folder {} recursively ({} files, {} folders)",
            folder,
            files_removed,
            dirs.len()
        );
        Ok(())
    }
}
