use folio_protocol::{FolderKey, Username};

use super::{TreeError, TreeMutation};
use crate::crypto::EncryptedSet;
use crate::grants::GrantMap;
use crate::ownership::OwnerMap;
use crate::store::KeyValueStore;
use crate::traversal::is_skipped;

impl<'a, G, O, E> TreeMutation<'a, G, O, E>
where
    G: KeyValueStore<GrantMap>,
    O: KeyValueStore<OwnerMap>,
    E: KeyValueStore<EncryptedSet>,
{
    /// Create the folder `name` inside `parent` on behalf of `creator`.
    ///
    /// The grant record is seeded from the parent when inheritance is
    /// enabled, otherwise it names only the creator as owner. If seeding
    /// fails the new directory is removed again and
    /// [`TreeError::Bookkeeping`] is returned.
    pub fn create_folder(
        &self,
        name: &str,
        parent: &FolderKey,
        creator: &Username,
    ) -> Result<FolderKey, TreeError> {
        let name = name.trim();
        let child = parent.child(name)?;
        if is_skipped(name) {
            return Err(TreeError::Validation(format!("reserved folder name: {name:?}")));
        }
        self.require_dir(parent)?;
        if self.entry_exists(&child)? {
            return Err(TreeError::AlreadyExists(child));
        }

        let path = child.storage_path();
        self.storage
            .mkdir(path, self.options.dir_mode, false)
            .map_err(Self::storage_error(path))?;

        let seeded = if self.options.inherit_on_create {
            self.grants.inherit_from_parent(parent, &child, creator)
        } else {
            self.grants.ensure_folder_record(&child, creator).map(|_| ())
        };
        if let Err(error) = seeded {
            tracing::warn!("Seeding grants for {} failed, removing it: {:#}", child, error);
            if let Err(e) = self.remove_empty_dir(path) {
                tracing::warn!("Rollback of {} failed: {}", child, e);
            }
            return Err(TreeError::Bookkeeping {
                folder: child,
                error,
            });
        }

        if let Err(e) = self.owners.set_owner_for(&child, creator) {
            tracing::warn!("Could not record owner of {}: {:#}", child, e);
        }

        tracing::info!("Created folder {} for {}", child, creator);
        Ok(child)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::super::tests::{key, user, Fixture};
    use super::*;
    use crate::grants::GrantStore;
    use crate::storage::StorageAdapter;

    #[test]
    fn test_create_seeds_owner_record() {
        let fx = Fixture::new();
        let created = fx
            .tree()
            .create_folder("docs", &FolderKey::root(), &user("Alice"))
            .unwrap();

        assert_eq!(created, key("docs"));
        assert!(fx.storage.stat("docs").unwrap().unwrap().is_dir());
        let record = fx.grants.explicit_all(&created).unwrap();
        assert_eq!(record.owners, BTreeSet::from([user("alice")]));
        assert!(record.read.is_empty());
        assert_eq!(fx.owners.owner_for(&created).unwrap(), Some(user("alice")));
    }

    #[test]
    fn test_create_inherits_from_parent() {
        let mut fx = Fixture::new();
        fx.options.inherit_on_create = true;
        fx.storage.mkdir("p", 0o755, false).unwrap();
        fx.grants
            .upsert(
                &key("p"),
                BTreeSet::from([user("alice")]),
                BTreeSet::from([user("bob")]),
                BTreeSet::new(),
                BTreeSet::new(),
            )
            .unwrap();

        let child = fx.tree().create_folder("c", &key("p"), &user("carol")).unwrap();
        let record = fx.grants.explicit(&child).unwrap();
        assert_eq!(record.owners, BTreeSet::from([user("alice"), user("carol")]));
        assert_eq!(record.read, BTreeSet::from([user("bob")]));
    }

    #[test]
    fn test_create_validates_before_touching_storage() {
        let fx = Fixture::new();
        let tree = fx.tree();
        let alice = user("alice");

        for bad in ["", "..", "a/b", "trash", ".hidden"] {
            let err = tree.create_folder(bad, &FolderKey::root(), &alice).unwrap_err();
            assert!(matches!(err, TreeError::Validation(_)), "{bad:?}: {err}");
        }
        assert!(matches!(
            tree.create_folder("x", &key("missing"), &alice).unwrap_err(),
            TreeError::NotFound(_)
        ));

        tree.create_folder("x", &FolderKey::root(), &alice).unwrap();
        assert!(matches!(
            tree.create_folder("x", &FolderKey::root(), &alice).unwrap_err(),
            TreeError::AlreadyExists(_)
        ));
        assert_eq!(fx.storage.list("").unwrap(), vec!["x"]);
    }

    struct RejectingStore;

    impl KeyValueStore<GrantMap> for RejectingStore {
        fn load(&self) -> anyhow::Result<GrantMap> {
            Ok(GrantMap::default())
        }

        fn update<R, F>(&self, _f: F) -> anyhow::Result<R>
        where
            F: FnOnce(&mut GrantMap) -> anyhow::Result<R>,
        {
            anyhow::bail!("grant store is read-only")
        }
    }

    #[test]
    fn test_create_rolls_back_when_seeding_fails() {
        let fx = Fixture::new();
        let grants = GrantStore::new(RejectingStore);
        let tree = TreeMutation::new(
            &fx.storage,
            &grants,
            &fx.owners,
            &fx.crypto,
            &fx.metadata,
            fx.options,
        );

        let err = tree
            .create_folder("docs", &FolderKey::root(), &user("alice"))
            .unwrap_err();
        assert!(matches!(err, TreeError::Bookkeeping { .. }));
        assert!(fx.storage.stat("docs").unwrap().is_none());
        assert_eq!(fx.owners.owner_for(&key("docs")).unwrap(), None);
    }
}
