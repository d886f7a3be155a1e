//! Folder keys and usernames.
//!
//! A [`FolderKey`] is the normalized identifier every store in Folio is keyed
//! by: either the sentinel `root` or a `/`-joined list of validated segments.
//! A [`Username`] is normalized to lowercase on construction so that grant
//! lookups downstream are plain set membership tests.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result, MAX_SEGMENT_LEN, MAX_USERNAME_LEN};

/// The sentinel key naming the upload root.
pub const ROOT_KEY: &str = "root";

/// Validate a single folder key segment.
///
/// Segments must be non-empty, must not be `.` or `..`, must not contain
/// control characters or path separators, and must be at most
/// [`MAX_SEGMENT_LEN`] bytes.
pub fn validate_segment(segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(ProtocolError::EmptySegment(segment.to_string()));
    }
    if segment == "." || segment == ".." {
        return Err(ProtocolError::ReservedSegment(segment.to_string()));
    }
    if segment.len() > MAX_SEGMENT_LEN {
        return Err(ProtocolError::SegmentTooLong {
            len: segment.len(),
            max: MAX_SEGMENT_LEN,
        });
    }
    if segment.chars().any(char::is_control) {
        return Err(ProtocolError::ControlCharacter(segment.to_string()));
    }
    if segment.contains('/') || segment.contains('\\') {
        return Err(ProtocolError::PathSeparator(segment.to_string()));
    }
    Ok(())
}

/// Normalized hierarchical folder identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FolderKey(String);

impl FolderKey {
    /// The upload root.
    pub fn root() -> Self {
        Self(ROOT_KEY.to_string())
    }

    /// Parse and normalize a raw folder key.
    ///
    /// Surrounding whitespace and slashes are trimmed; an empty string, `/`
    /// and `root` all name the root. A top-level segment literally named
    /// `root` is rejected because it would alias the sentinel.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim().trim_matches('/');
        if trimmed.is_empty() || trimmed == ROOT_KEY {
            return Ok(Self::root());
        }

        let mut segments = Vec::new();
        for segment in trimmed.split('/') {
            validate_segment(segment)?;
            segments.push(segment);
        }
        if segments[0] == ROOT_KEY {
            return Err(ProtocolError::ReservedSegment(ROOT_KEY.to_string()));
        }

        Ok(Self(segments.join("/")))
    }

    /// Returns true if this is the root key.
    pub fn is_root(&self) -> bool {
        self.0 == ROOT_KEY
    }

    /// The key as stored (`root` for the root).
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path relative to the storage root (empty for the root).
    pub fn storage_path(&self) -> &str {
        if self.is_root() {
            ""
        } else {
            &self.0
        }
    }

    /// Iterate over the segments (none for the root).
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.storage_path().split('/').filter(|s| !s.is_empty())
    }

    /// Number of segments below the root.
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Final segment, or `None` for the root.
    pub fn name(&self) -> Option<&str> {
        if self.is_root() {
            None
        } else {
            self.0.rsplit('/').next()
        }
    }

    /// Parent key, or `None` for the root.
    pub fn parent(&self) -> Option<FolderKey> {
        if self.is_root() {
            return None;
        }
        match self.0.rsplit_once('/') {
            Some((parent, _)) => Some(Self(parent.to_string())),
            None => Some(Self::root()),
        }
    }

    /// Key of a direct child named `name`.
    pub fn child(&self, name: &str) -> Result<FolderKey> {
        validate_segment(name)?;
        if self.is_root() {
            if name == ROOT_KEY {
                return Err(ProtocolError::ReservedSegment(name.to_string()));
            }
            Ok(Self(name.to_string()))
        } else {
            Ok(Self(format!("{}/{}", self.0, name)))
        }
    }

    /// True if `self` equals `ancestor` or lies beneath it.
    pub fn is_self_or_descendant_of(&self, ancestor: &FolderKey) -> bool {
        if ancestor.is_root() || self == ancestor {
            return true;
        }
        self.0
            .strip_prefix(ancestor.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }

    /// True if `self` lies strictly beneath `ancestor`.
    pub fn is_descendant_of(&self, ancestor: &FolderKey) -> bool {
        self != ancestor && self.is_self_or_descendant_of(ancestor)
    }

    /// Substitute the `old` prefix of this key with `new`.
    ///
    /// Returns `None` if this key is not `old` or beneath it.
    pub fn rebase(&self, old: &FolderKey, new: &FolderKey) -> Option<FolderKey> {
        if !self.is_self_or_descendant_of(old) {
            return None;
        }
        if self == old {
            return Some(new.clone());
        }
        let rest = if old.is_root() {
            self.as_str()
        } else {
            &self.0[old.0.len() + 1..]
        };
        if new.is_root() {
            Some(Self(rest.to_string()))
        } else {
            Some(Self(format!("{}/{}", new.0, rest)))
        }
    }

    /// This key followed by each ancestor up to and including the root.
    pub fn self_and_ancestors(&self) -> Vec<FolderKey> {
        let mut chain = vec![self.clone()];
        let mut current = self.parent();
        while let Some(key) = current {
            current = key.parent();
            chain.push(key);
        }
        chain
    }
}

impl Default for FolderKey {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Display for FolderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for FolderKey {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FolderKey {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<FolderKey> for String {
    fn from(key: FolderKey) -> Self {
        key.0
    }
}

/// A username normalized to lowercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    /// Validate and normalize a username.
    pub fn new(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed.len() > MAX_USERNAME_LEN
            || trimmed.chars().any(|c| c.is_control() || c == '/' || c == '\\')
        {
            return Err(ProtocolError::InvalidUsername(raw.to_string()));
        }
        Ok(Self(trimmed.to_lowercase()))
    }

    /// The normalized name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Username {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Username {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<Username> for String {
    fn from(name: Username) -> Self {
        name.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> FolderKey {
        FolderKey::parse(raw).unwrap()
    }

    #[test]
    fn test_parse_root_aliases() {
        assert!(key("").is_root());
        assert!(key("/").is_root());
        assert!(key("root").is_root());
        assert!(key("  /root/ ").is_root());
        assert_eq!(key("").storage_path(), "");
    }

    #[test]
    fn test_parse_trims_slashes() {
        assert_eq!(key("/team/docs/").as_str(), "team/docs");
    }

    #[test]
    fn test_parse_rejects_bad_segments() {
        assert!(matches!(
            FolderKey::parse("a//b"),
            Err(ProtocolError::EmptySegment(_))
        ));
        assert!(matches!(
            FolderKey::parse("a/../b"),
            Err(ProtocolError::ReservedSegment(_))
        ));
        assert!(matches!(
            FolderKey::parse("a/./b"),
            Err(ProtocolError::ReservedSegment(_))
        ));
        assert!(matches!(
            FolderKey::parse("a/b\u{7}"),
            Err(ProtocolError::ControlCharacter(_))
        ));
        assert!(matches!(
            FolderKey::parse("a\\b"),
            Err(ProtocolError::PathSeparator(_))
        ));
        assert!(matches!(
            FolderKey::parse("root/a"),
            Err(ProtocolError::ReservedSegment(_))
        ));
        let long = "x".repeat(256);
        assert!(matches!(
            FolderKey::parse(&long),
            Err(ProtocolError::SegmentTooLong { len: 256, max: 255 })
        ));
        assert!(FolderKey::parse(&"x".repeat(255)).is_ok());
    }

    #[test]
    fn test_parent_and_name() {
        let k = key("a/b/c");
        assert_eq!(k.name(), Some("c"));
        assert_eq!(k.parent(), Some(key("a/b")));
        assert_eq!(key("a").parent(), Some(FolderKey::root()));
        assert_eq!(FolderKey::root().parent(), None);
        assert_eq!(FolderKey::root().name(), None);
        assert_eq!(k.depth(), 3);
        assert_eq!(FolderKey::root().depth(), 0);
    }

    #[test]
    fn test_child() {
        assert_eq!(FolderKey::root().child("a").unwrap(), key("a"));
        assert_eq!(key("a").child("b").unwrap(), key("a/b"));
        assert!(FolderKey::root().child("root").is_err());
        assert!(key("a").child("root").is_ok());
        assert!(key("a").child("x/y").is_err());
    }

    #[test]
    fn test_descendant_checks() {
        let a = key("a");
        assert!(key("a/b").is_self_or_descendant_of(&a));
        assert!(a.is_self_or_descendant_of(&a));
        assert!(!a.is_descendant_of(&a));
        assert!(!key("ab").is_self_or_descendant_of(&a));
        assert!(key("ab").is_descendant_of(&FolderKey::root()));
    }

    #[test]
    fn test_rebase() {
        let old = key("a/b");
        let new = key("x");
        assert_eq!(key("a/b").rebase(&old, &new), Some(key("x")));
        assert_eq!(key("a/b/c/d").rebase(&old, &new), Some(key("x/c/d")));
        assert_eq!(key("a/bc").rebase(&old, &new), None);
        assert_eq!(key("a").rebase(&old, &new), None);
    }

    #[test]
    fn test_self_and_ancestors() {
        let chain = key("a/b/c").self_and_ancestors();
        assert_eq!(
            chain,
            vec![key("a/b/c"), key("a/b"), key("a"), FolderKey::root()]
        );
    }

    #[test]
    fn test_serde_validates() {
        let json = serde_json::to_string(&key("a/b")).unwrap();
        assert_eq!(json, "\"a/b\"");
        assert!(serde_json::from_str::<FolderKey>("\"a/../b\"").is_err());
    }

    #[test]
    fn test_username_normalization() {
        let name = Username::new("  Alice ").unwrap();
        assert_eq!(name.as_str(), "alice");
        assert_eq!(name, Username::new("ALICE").unwrap());
        assert!(Username::new("").is_err());
        assert!(Username::new("a/b").is_err());
        assert!(Username::new(&"u".repeat(129)).is_err());

        let parsed: Username = serde_json::from_str("\"Bob\"").unwrap();
        assert_eq!(parsed.as_str(), "bob");
    }
}
