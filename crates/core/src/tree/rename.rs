use folio_protocol::FolderKey;

use super::{PathFailure, TreeError, TreeMutation};
use crate::crypto::{EncryptedSet, FolderCrypto};
use crate::grants::GrantMap;
use crate::ownership::OwnerMap;
use crate::store::KeyValueStore;

impl<'a, G, O, E> TreeMutation<'a, G, O, E>
where
    G: KeyValueStore<GrantMap>,
    O: KeyValueStore<OwnerMap>,
    E: KeyValueStore<EncryptedSet>,
{
    /// Move the folder `old` to `new`, re-keying all bookkeeping for the subtree.
    ///
    /// Validation failures leave everything untouched. Once the move has
    /// happened, failures in the bookkeeping stores are reported as
    /// [`TreeError::PartialFailure`] and the move is kept.
    pub fn rename_folder(&self, old: &FolderKey, new: &FolderKey) -> Result<(), TreeError> {
        if old.is_root() || new.is_root() {
            return Err(TreeError::Validation("the root folder cannot be renamed".to_string()));
        }
        if old == new {
            return Err(TreeError::Validation(format!("{old} is already named {new}")));
        }
        if new.is_descendant_of(old) {
            return Err(TreeError::Validation(format!("cannot move {old} into itself")));
        }

        self.require_dir(old)?;
        let new_parent = new.parent().unwrap_or_else(FolderKey::root);
        self.require_dir(&new_parent)?;
        if self.entry_exists(new)? {
            return Err(TreeError::AlreadyExists(new.clone()));
        }

        let markers = self.crypto.snapshot().map_err(|error| TreeError::Bookkeeping {
            folder: old.clone(),
            error,
        })?;
        let old_parent = old.parent().unwrap_or_else(FolderKey::root);
        if markers.is_encrypted_or_ancestor(&old_parent)
            != markers.is_encrypted_or_ancestor(&new_parent)
        {
            return Err(TreeError::Validation(format!(
                "cannot move {old} across an encryption boundary"
            )));
        }

        let (src, dst) = (old.storage_path(), new.storage_path());
        self.storage
            .rename(src, dst)
            .map_err(Self::storage_error(src))?;

        let steps: [(&str, anyhow::Result<usize>); 4] = [
            ("metadata", self.metadata.rename_tree(old, new)),
            ("owners", self.owners.rename_tree(old, new)),
            ("grants", self.grants.rename_tree(old, new)),
            ("encryption", self.crypto.rename_tree(old, new)),
        ];
        let mut failures = Vec::new();
        for (store, result) in steps {
            if let Err(e) = result {
                tracing::warn!("Failed to re-key {} records from {} to {}: {:#}", store, old, new, e);
                failures.push(PathFailure::new(store, format!("{e:#}")));
            }
        }
        if !failures.is_empty() {
            return Err(TreeError::PartialFailure { errors: failures });
        }

        tracing::info!("Renamed folder {} to {}", old, new);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::super::tests::{key, user, Fixture};
    use super::*;
    use crate::storage::StorageAdapter;

    fn seeded() -> Fixture {
        let fx = Fixture::new();
        let tree = fx.tree();
        let alice = user("alice");
        tree.create_folder("a", &FolderKey::root(), &alice).unwrap();
        tree.create_folder("b", &key("a"), &alice).unwrap();
        tree.create_folder("dest", &FolderKey::root(), &alice).unwrap();
        fx.metadata
            .record_upload(&key("a/b"), "f.txt", "alice", Utc::now())
            .unwrap();
        fx.storage.put_file("a/b/f.txt", 3).unwrap();
        fx
    }

    #[test]
    fn test_rename_moves_subtree_bookkeeping() {
        let fx = seeded();
        fx.tree().rename_folder(&key("a"), &key("dest/a2")).unwrap();

        assert!(fx.storage.stat("a").unwrap().is_none());
        assert!(fx.storage.stat("dest/a2/b/f.txt").unwrap().is_some());

        let snapshot = fx.grants.snapshot().unwrap();
        let folders: Vec<&str> = snapshot.folders().map(FolderKey::as_str).collect();
        assert_eq!(folders, vec!["dest", "dest/a2", "dest/a2/b"]);

        let owners = fx.owners.folder_owners().unwrap();
        assert!(owners.contains_key(&key("dest/a2/b")));
        assert!(!owners.contains_key(&key("a")));

        assert!(fx.metadata.load(&key("dest/a2/b")).unwrap().contains_key("f.txt"));
        assert!(!fx.metadata.path_for(&key("a/b")).exists());
    }

    #[test]
    fn test_rename_validation() {
        let fx = seeded();
        let tree = fx.tree();

        let cases = [
            (FolderKey::root(), key("x")),
            (key("a"), FolderKey::root()),
            (key("a"), key("a")),
            (key("a"), key("a/b/inside")),
        ];
        for (old, new) in cases {
            let err = tree.rename_folder(&old, &new).unwrap_err();
            assert!(matches!(err, TreeError::Validation(_)), "{old} -> {new}: {err}");
        }

        assert!(matches!(
            tree.rename_folder(&key("missing"), &key("x")).unwrap_err(),
            TreeError::NotFound(_)
        ));
        assert!(matches!(
            tree.rename_folder(&key("a"), &key("nowhere/x")).unwrap_err(),
            TreeError::NotFound(_)
        ));
        assert!(matches!(
            tree.rename_folder(&key("a"), &key("dest")).unwrap_err(),
            TreeError::AlreadyExists(_)
        ));
        assert!(fx.storage.stat("a/b").unwrap().is_some());
    }

    #[test]
    fn test_rename_refuses_encryption_boundary() {
        let fx = seeded();
        fx.crypto.mark(&key("dest")).unwrap();

        let err = fx.tree().rename_folder(&key("a"), &key("dest/a")).unwrap_err();
        assert!(matches!(err, TreeError::Validation(_)));
        assert!(fx.storage.stat("a").unwrap().is_some());

        // Renaming the encrypted folder itself keeps its marker with it.
        fx.tree().rename_folder(&key("dest"), &key("vault")).unwrap();
        assert!(fx.crypto.is_encrypted(&key("vault")).unwrap());
        assert!(!fx.crypto.is_encrypted(&key("dest")).unwrap());
    }
}
