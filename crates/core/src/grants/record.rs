//! Per-folder grant records.

use std::collections::BTreeSet;

use folio_protocol::Username;
use serde::{Deserialize, Serialize};

/// A named set of usernames attached to a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bucket {
    Owners,
    Read,
    Write,
    Share,
    ReadOwn,
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

impl Bucket {
    /// Every bucket in storage order.
    pub const ALL: [Bucket; 14] = [
        Bucket::Owners,
        Bucket::Read,
        Bucket::Write,
        Bucket::Share,
        Bucket::ReadOwn,
        Bucket::Create,
        Bucket::Edit,
        Bucket::Rename,
        Bucket::Copy,
        Bucket::Move,
        Bucket::Delete,
        Bucket::Extract,
        Bucket::ShareFile,
        Bucket::ShareFolder,
    ];

    /// Name used in the JSON document.
    pub fn as_str(self) -> &'static str {
        match self {
            Bucket::Owners => "owners",
            Bucket::Read => "read",
            Bucket::Write => "write",
            Bucket::Share => "share",
            Bucket::ReadOwn => "read_own",
            Bucket::Create => "create",
            Bucket::Edit => "edit",
            Bucket::Rename => "rename",
            Bucket::Copy => "copy",
            Bucket::Move => "move",
            Bucket::Delete => "delete",
            Bucket::Extract => "extract",
            Bucket::ShareFile => "share_file",
            Bucket::ShareFolder => "share_folder",
        }
    }
}

/// The five legacy buckets of one folder.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LegacyBuckets {
    pub owners: BTreeSet<Username>,
    pub read: BTreeSet<Username>,
    pub write: BTreeSet<Username>,
    pub share: BTreeSet<Username>,
    pub read_own: BTreeSet<Username>,
}

/// All capability buckets of one folder.
///
/// Owners are never required to appear in any other bucket.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GrantRecord {
    pub owners: BTreeSet<Username>,
    pub read: BTreeSet<Username>,
    pub write: BTreeSet<Username>,
    pub share: BTreeSet<Username>,
    pub read_own: BTreeSet<Username>,
    pub create: BTreeSet<Username>,
    pub edit: BTreeSet<Username>,
    pub rename: BTreeSet<Username>,
    pub copy: BTreeSet<Username>,
    #[serde(rename = "move")]
    pub move_: BTreeSet<Username>,
    pub delete: BTreeSet<Username>,
    pub extract: BTreeSet<Username>,
    pub share_file: BTreeSet<Username>,
    pub share_folder: BTreeSet<Username>,
}

impl GrantRecord {
    /// A record whose only entry is `owner` in the owners bucket.
    pub fn with_owner(owner: Username) -> Self {
        let mut record = Self::default();
        record.owners.insert(owner);
        record
    }

    /// Members of one bucket.
    pub fn bucket(&self, bucket: Bucket) -> &BTreeSet<Username> {
        match bucket {
            Bucket::Owners => &self.owners,
            Bucket::Read => &self.read,
            Bucket::Write => &self.write,
            Bucket::Share => &self.share,
            Bucket::ReadOwn => &self.read_own,
            Bucket::Create => &self.create,
            Bucket::Edit => &self.edit,
            Bucket::Rename => &self.rename,
            Bucket::Copy => &self.copy,
            Bucket::Move => &self.move_,
            Bucket::Delete => &self.delete,
            Bucket::Extract => &self.extract,
            Bucket::ShareFile => &self.share_file,
            Bucket::ShareFolder => &self.share_folder,
        }
    }

    /// Mutable members of one bucket.
    pub fn bucket_mut(&mut self, bucket: Bucket) -> &mut BTreeSet<Username> {
        match bucket {
            Bucket::Owners => &mut self.owners,
            Bucket::Read => &mut self.read,
            Bucket::Write => &mut self.write,
            Bucket::Share => &mut self.share,
            Bucket::ReadOwn => &mut self.read_own,
            Bucket::Create => &mut self.create,
            Bucket::Edit => &mut self.edit,
            Bucket::Rename => &mut self.rename,
            Bucket::Copy => &mut self.copy,
            Bucket::Move => &mut self.move_,
            Bucket::Delete => &mut self.delete,
            Bucket::Extract => &mut self.extract,
            Bucket::ShareFile => &mut self.share_file,
            Bucket::ShareFolder => &mut self.share_folder,
        }
    }

    /// Whether `user` is a member of `bucket`.
    pub fn contains(&self, bucket: Bucket, user: &Username) -> bool {
        self.bucket(bucket).contains(user)
    }

    /// Add or remove `user` from `bucket`. Returns true if membership changed.
    pub fn set(&mut self, bucket: Bucket, user: &Username, present: bool) -> bool {
        let members = self.bucket_mut(bucket);
        if present {
            members.insert(user.clone())
        } else {
            members.remove(user)
        }
    }

    /// Remove `user` from every bucket. Returns true if anything changed.
    pub fn remove_user(&mut self, user: &Username) -> bool {
        let mut changed = false;
        for bucket in Bucket::ALL {
            changed |= self.bucket_mut(bucket).remove(user);
        }
        changed
    }

    /// The five legacy buckets.
    pub fn legacy(&self) -> LegacyBuckets {
        LegacyBuckets {
            owners: self.owners.clone(),
            read: self.read.clone(),
            write: self.write.clone(),
            share: self.share.clone(),
            read_own: self.read_own.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> Username {
        Username::new(name).unwrap()
    }

    #[test]
    fn test_bucket_accessors_cover_all() {
        let mut record = GrantRecord::default();
        let bob = user("bob");
        for bucket in Bucket::ALL {
            assert!(record.set(bucket, &bob, true));
            assert!(record.contains(bucket, &bob));
        }
        assert!(record.remove_user(&bob));
        for bucket in Bucket::ALL {
            assert!(record.bucket(bucket).is_empty());
        }
        assert!(!record.remove_user(&bob));
    }

    #[test]
    fn test_set_reports_changes() {
        let mut record = GrantRecord::default();
        let bob = user("bob");
        assert!(record.set(Bucket::Read, &bob, true));
        assert!(!record.set(Bucket::Read, &bob, true));
        assert!(record.set(Bucket::Read, &bob, false));
        assert!(!record.set(Bucket::Read, &bob, false));
    }

    #[test]
    fn test_json_names_and_case_normalization() {
        let record: GrantRecord = serde_json::from_str(
            r#"{"owners":["Alice"],"read_own":["BOB"],"move":["carol"]}"#,
        )
        .unwrap();
        assert!(record.owners.contains(&user("alice")));
        assert!(record.read_own.contains(&user("bob")));
        assert!(record.move_.contains(&user("carol")));

        let json = serde_json::to_value(&record).unwrap();
        for bucket in Bucket::ALL {
            assert!(json.get(bucket.as_str()).is_some(), "{}", bucket.as_str());
        }
    }
}
