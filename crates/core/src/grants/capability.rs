//! Capability derivation.
//!
//! Every folder-level authorization question reduces to [`derive`], which
//! applies one fixed precedence order:
//!
//! 1. global administrators hold everything;
//! 2. account-wide `read_only` / `disable_upload` flags strip mutating
//!    capabilities;
//! 3. folder owners hold everything else;
//! 4. granular buckets, when the user appears in any bucket of the
//!    capability's family on that folder;
//! 5. otherwise the legacy bucket of the family (`write` or `share`).

use folio_protocol::CallerContext;

use super::record::{Bucket, GrantRecord};

/// A capability a caller may hold on a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Read,
    ReadOwn,
    Write,
    Manage,
    Share,
    Create,
    Edit,
    Rename,
    Copy,
    Move,
    Delete,
    Extract,
    ShareFile,
    ShareFolder,
}

/// A legacy bucket together with the granular buckets it stands in for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Write,
    Share,
}

impl Family {
    fn legacy(self) -> Bucket {
        match self {
            Family::Write => Bucket::Write,
            Family::Share => Bucket::Share,
        }
    }

    fn granular(self) -> &'static [Bucket] {
        match self {
            Family::Write => &[
                Bucket::Create,
                Bucket::Edit,
                Bucket::Rename,
                Bucket::Copy,
                Bucket::Move,
                Bucket::Delete,
                Bucket::Extract,
            ],
            Family::Share => &[Bucket::ShareFile, Bucket::ShareFolder],
        }
    }
}

impl Capability {
    fn family(self) -> Option<Family> {
        match self {
            Capability::Create
            | Capability::Edit
            | Capability::Rename
            | Capability::Copy
            | Capability::Move
            | Capability::Delete
            | Capability::Extract => Some(Family::Write),
            Capability::ShareFile | Capability::ShareFolder => Some(Family::Share),
            _ => None,
        }
    }

    fn bucket(self) -> Bucket {
        match self {
            Capability::Read => Bucket::Read,
            Capability::ReadOwn => Bucket::ReadOwn,
            Capability::Write => Bucket::Write,
            Capability::Manage => Bucket::Owners,
            Capability::Share => Bucket::Share,
            Capability::Create => Bucket::Create,
            Capability::Edit => Bucket::Edit,
            Capability::Rename => Bucket::Rename,
            Capability::Copy => Bucket::Copy,
            Capability::Move => Bucket::Move,
            Capability::Delete => Bucket::Delete,
            Capability::Extract => Bucket::Extract,
            Capability::ShareFile => Bucket::ShareFile,
            Capability::ShareFolder => Bucket::ShareFolder,
        }
    }

    /// Whether a read-only account loses this capability.
    pub fn is_mutating(self) -> bool {
        !matches!(self, Capability::Read | Capability::ReadOwn)
    }
}

/// Decide whether `caller` holds `capability` on a folder with `record`.
pub fn derive(record: Option<&GrantRecord>, caller: &CallerContext, capability: Capability) -> bool {
    if caller.perms.is_admin {
        return true;
    }
    if caller.perms.read_only && capability.is_mutating() {
        return false;
    }
    if caller.perms.disable_upload && capability == Capability::Create {
        return false;
    }

    let Some(record) = record else {
        return false;
    };
    let user = &caller.username;

    if record.contains(Bucket::Owners, user) {
        return true;
    }

    match capability {
        Capability::Manage => false,
        Capability::ReadOwn => {
            record.contains(Bucket::Read, user) || record.contains(Bucket::ReadOwn, user)
        }
        Capability::Share => {
            record.contains(Bucket::Share, user)
                || record.contains(Bucket::ShareFile, user)
                || record.contains(Bucket::ShareFolder, user)
        }
        _ => match capability.family() {
            Some(family) => {
                let granular_mode = family
                    .granular()
                    .iter()
                    .any(|bucket| record.contains(*bucket, user));
                if granular_mode {
                    record.contains(capability.bucket(), user)
                } else {
                    record.contains(family.legacy(), user)
                }
            }
            None => record.contains(capability.bucket(), user),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_protocol::{PermsSnapshot, Username};

    fn user(name: &str) -> Username {
        Username::new(name).unwrap()
    }

    fn caller(name: &str) -> CallerContext {
        CallerContext::user(name).unwrap()
    }

    const WRITE_FAMILY: [Capability; 7] = [
        Capability::Create,
        Capability::Edit,
        Capability::Rename,
        Capability::Copy,
        Capability::Move,
        Capability::Delete,
        Capability::Extract,
    ];

    #[test]
    fn test_admin_bypasses_everything() {
        let admin = CallerContext::admin("root").unwrap();
        assert!(derive(None, &admin, Capability::Manage));
        assert!(derive(None, &admin, Capability::Delete));
    }

    #[test]
    fn test_no_record_denies() {
        assert!(!derive(None, &caller("bob"), Capability::Read));
    }

    #[test]
    fn test_owner_implies_everything() {
        let record = GrantRecord::with_owner(user("alice"));
        let alice = caller("alice");
        for cap in [
            Capability::Read,
            Capability::ReadOwn,
            Capability::Write,
            Capability::Manage,
            Capability::Share,
            Capability::ShareFolder,
            Capability::Extract,
        ] {
            assert!(derive(Some(&record), &alice, cap), "{cap:?}");
        }
        assert!(!derive(Some(&record), &caller("bob"), Capability::Read));
    }

    #[test]
    fn test_read_implies_read_own_not_reverse() {
        let mut record = GrantRecord::default();
        record.read.insert(user("bob"));
        record.read_own.insert(user("carol"));

        assert!(derive(Some(&record), &caller("bob"), Capability::ReadOwn));
        assert!(derive(Some(&record), &caller("carol"), Capability::ReadOwn));
        assert!(!derive(Some(&record), &caller("carol"), Capability::Read));
    }

    #[test]
    fn test_legacy_write_implies_family() {
        let mut record = GrantRecord::default();
        record.write.insert(user("bob"));
        let bob = caller("bob");

        assert!(derive(Some(&record), &bob, Capability::Write));
        for cap in WRITE_FAMILY {
            assert!(derive(Some(&record), &bob, cap), "{cap:?}");
        }
        assert!(!derive(Some(&record), &bob, Capability::Manage));
        assert!(!derive(Some(&record), &bob, Capability::Read));
    }

    #[test]
    fn test_granular_grants_override_legacy_write() {
        let mut record = GrantRecord::default();
        record.write.insert(user("bob"));
        record.edit.insert(user("bob"));
        let bob = caller("bob");

        assert!(derive(Some(&record), &bob, Capability::Edit));
        assert!(!derive(Some(&record), &bob, Capability::Delete));
        assert!(!derive(Some(&record), &bob, Capability::Rename));
    }

    #[test]
    fn test_empty_legacy_does_not_revoke_granular() {
        let mut record = GrantRecord::default();
        record.delete.insert(user("bob"));
        let bob = caller("bob");

        assert!(derive(Some(&record), &bob, Capability::Delete));
        assert!(!derive(Some(&record), &bob, Capability::Write));
        assert!(!derive(Some(&record), &bob, Capability::Edit));
    }

    #[test]
    fn test_share_family() {
        let mut record = GrantRecord::default();
        record.share.insert(user("bob"));
        record.share.insert(user("carol"));
        record.share_folder.insert(user("carol"));

        let bob = caller("bob");
        assert!(derive(Some(&record), &bob, Capability::ShareFile));
        assert!(derive(Some(&record), &bob, Capability::ShareFolder));

        let carol = caller("carol");
        assert!(derive(Some(&record), &carol, Capability::ShareFolder));
        assert!(!derive(Some(&record), &carol, Capability::ShareFile));
        assert!(derive(Some(&record), &carol, Capability::Share));
    }

    #[test]
    fn test_account_flags_strip_mutations() {
        let record = GrantRecord::with_owner(user("bob"));
        let read_only = CallerContext::new(
            user("bob"),
            PermsSnapshot {
                read_only: true,
                ..PermsSnapshot::default()
            },
        );
        assert!(derive(Some(&record), &read_only, Capability::Read));
        assert!(!derive(Some(&record), &read_only, Capability::Delete));
        assert!(!derive(Some(&record), &read_only, Capability::Manage));

        let no_upload = CallerContext::new(
            user("bob"),
            PermsSnapshot {
                disable_upload: true,
                ..PermsSnapshot::default()
            },
        );
        assert!(!derive(Some(&record), &no_upload, Capability::Create));
        assert!(derive(Some(&record), &no_upload, Capability::Rename));
    }
}
