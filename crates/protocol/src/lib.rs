//! # Folio Protocol Library
//!
//! Shared value types passed between Folio's HTTP controllers and the
//! permission-aware namespace engine in `folio-core`.
//!
//! ## Overview
//!
//! - **Folder keys**: validated, normalized folder identifiers (`root` or
//!   slash-joined segments)
//! - **Usernames**: lowercase-normalized so grant checks are exact lookups
//! - **Caller context**: the authenticated user plus their session bits,
//!   passed explicitly into every core call
//! - **Messages**: listing rows, pages, counts and grant payloads
//!
//! ## Example Usage
//!
//! ```rust
//! use folio_protocol::{CallerContext, FolderKey};
//!
//! let caller = CallerContext::user("Alice").unwrap();
//! assert_eq!(caller.username.as_str(), "alice");
//!
//! let key = FolderKey::parse("/team/reports/").unwrap();
//! assert_eq!(key.as_str(), "team/reports");
//! assert_eq!(key.parent().unwrap().as_str(), "team");
//! ```
//!
//! ## Modules
//!
//! - [`key`]: Folder keys and usernames
//! - [`caller`]: Caller identity and session permission bits
//! - [`messages`]: Listing rows, pages, counts and grant payloads
//! - [`error`]: Error types

pub mod caller;
pub mod error;
pub mod key;
pub mod messages;

pub use caller::{CallerContext, PermsSnapshot};
pub use error::{ProtocolError, Result, MAX_SEGMENT_LEN, MAX_USERNAME_LEN};
pub use key::{validate_segment, FolderKey, Username, ROOT_KEY};
pub use messages::{CountResult, FolderGrants, FolderListingRow, FolderSummary, ListPage};
