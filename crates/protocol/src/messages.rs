//! Values returned to controllers and grant payloads accepted from them.
//!
//! Field names serialize in camelCase to match what browser clients consume.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::key::FolderKey;

/// One row of a folder tree listing.
///
/// Locked rows describe a folder the caller cannot open but which has a
/// visible descendant; they never carry `non_empty`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderListingRow {
    /// Entry name (not the full key).
    pub name: String,
    /// Whether the caller may only navigate through this folder.
    pub locked: bool,
    /// Whether the folder contains at least one subfolder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_subfolders: Option<bool>,
    /// Whether the folder contains any entry at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_empty: Option<bool>,
    /// Whether the folder or one of its ancestors is encrypted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<bool>,
}

impl FolderListingRow {
    /// A navigable placeholder carrying only structural existence.
    pub fn locked(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locked: true,
            has_subfolders: Some(true),
            non_empty: None,
            encrypted: None,
        }
    }

    /// A visible row with no probe results yet.
    pub fn visible(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locked: false,
            has_subfolders: None,
            non_empty: None,
            encrypted: None,
        }
    }
}

/// One page of `list_children`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage {
    /// Rows in natural name order.
    pub items: Vec<FolderListingRow>,
    /// Name to pass as the cursor for the next page, `None` at the end.
    pub next_cursor: Option<String>,
}

/// Result of a visibility-aware count.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountResult {
    /// Visible subfolders.
    pub folders: u64,
    /// Countable files.
    pub files: u64,
    /// Total size of counted files.
    pub bytes: u64,
    /// Set when the scan budget ran out before the walk completed.
    pub truncated: bool,
    /// Earliest recorded upload time among counted files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earliest_uploaded: Option<DateTime<Utc>>,
    /// Latest modification time among counted files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_mtime: Option<DateTime<Utc>>,
}

impl CountResult {
    /// Fold one counted file into the totals.
    pub fn add_file(
        &mut self,
        size: u64,
        mtime: Option<DateTime<Utc>>,
        uploaded: Option<DateTime<Utc>>,
    ) {
        self.files += 1;
        self.bytes = self.bytes.saturating_add(size);
        if let Some(mtime) = mtime {
            self.latest_mtime = Some(self.latest_mtime.map_or(mtime, |t| t.max(mtime)));
        }
        if let Some(uploaded) = uploaded {
            self.earliest_uploaded =
                Some(self.earliest_uploaded.map_or(uploaded, |t| t.min(uploaded)));
        }
    }
}

/// One entry of the flat folder list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderSummary {
    /// Folder key.
    pub folder: FolderKey,
    /// Immediate files the caller may count (0 when counts were not requested).
    pub file_count: u64,
    /// Name of the folder's metadata cache document.
    pub metadata_file: String,
}

/// Capabilities one user should hold on one folder, as sent by the admin UI.
///
/// `view` maps to the `read` bucket, `view_own` to `read_own`, `upload` to the
/// legacy `write` bucket and `manage` to `owners`; the rest map to the bucket
/// of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FolderGrants {
    pub view: bool,
    pub view_own: bool,
    pub upload: bool,
    pub manage: bool,
    pub share: bool,
    pub create: bool,
    pub edit: bool,
    pub rename: bool,
    pub copy: bool,
    #[serde(rename = "move")]
    pub move_: bool,
    pub delete: bool,
    pub extract: bool,
    pub share_file: bool,
    pub share_folder: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_locked_row_has_no_content_hints() {
        let row = FolderListingRow::locked("a");
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["locked"], true);
        assert!(json.get("nonEmpty").is_none());
        assert!(json.get("encrypted").is_none());
    }

    #[test]
    fn test_list_page_serializes_null_cursor() {
        let page = ListPage::default();
        let json = serde_json::to_string(&page).unwrap();
        assert_eq!(json, r#"{"items":[],"nextCursor":null}"#);
    }

    #[test]
    fn test_count_result_add_file() {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();

        let mut counts = CountResult::default();
        counts.add_file(10, Some(early), Some(late));
        counts.add_file(5, Some(late), Some(early));
        counts.add_file(1, None, None);

        assert_eq!(counts.files, 3);
        assert_eq!(counts.bytes, 16);
        assert_eq!(counts.latest_mtime, Some(late));
        assert_eq!(counts.earliest_uploaded, Some(early));
    }

    #[test]
    fn test_folder_grants_wire_names() {
        let grants: FolderGrants =
            serde_json::from_str(r#"{"shareFolder":true,"move":true,"viewOwn":true}"#).unwrap();
        assert!(grants.share_folder);
        assert!(grants.move_);
        assert!(grants.view_own);
        assert!(!grants.view);
    }
}
