//! # Folio Core Library
//!
//! The permission-aware folder namespace behind Folio's file manager.
//!
//! ## Overview
//!
//! Folio stores uploads as a plain directory tree and keeps its
//! authorization and bookkeeping next to it in small JSON documents:
//!
//! - **Grants**: per-folder capability buckets deciding who may see, read,
//!   write and share each folder
//! - **Ownership**: a single recorded owner per folder
//! - **Traversal**: caller-safe listings, counts and folder lists that never
//!   leak what the caller may not see
//! - **Tree mutation**: create, rename and delete that keep every
//!   bookkeeping store aligned with the directory tree
//! - **Storage**: a narrow backend boundary with a local-filesystem and an
//!   in-memory object-store implementation
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          FileManager                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌────────────────────────┐      ┌────────────────────────────┐ │
//! │  │    FolderTraversal     │      │       TreeMutation         │ │
//! │  │  list / count / folders│      │  create / rename / delete  │ │
//! │  └────────────────────────┘      └────────────────────────────┘ │
//! │                                                                 │
//! │  ┌──────────┐ ┌──────────────┐ ┌────────────┐ ┌──────────────┐  │
//! │  │  Grant   │ │  Ownership   │ │ Encryption │ │   Metadata   │  │
//! │  │  Store   │ │    Index     │ │  Markers   │ │    Cache     │  │
//! │  └──────────┘ └──────────────┘ └────────────┘ └──────────────┘  │
//! │                                                                 │
//! │  ┌───────────────────────────────────────────────────────────┐  │
//! │  │              StorageAdapter (local / memory)              │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use folio_core::{Config, FileManager};
//! use folio_protocol::{CallerContext, FolderKey};
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut config = Config::load_default()?;
//!     config.apply_env_overrides();
//!     config.validate()?;
//!
//!     let manager = FileManager::open(&config)?;
//!     let caller = CallerContext::user("alice")?;
//!     let page = manager
//!         .traversal()
//!         .list_children(&FolderKey::root(), &caller, None, None, true)?;
//!     for row in page.items {
//!         println!("{}{}", row.name, if row.locked { " (locked)" } else { "" });
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`store`]: Locked, atomically written JSON documents
//! - [`grants`]: Per-folder capability grants and their derivation
//! - [`ownership`]: Single-owner index
//! - [`crypto`]: Encrypted-folder markers
//! - [`metadata`]: Per-folder upload metadata caches
//! - [`storage`]: Storage backend boundary and implementations
//! - [`traversal`]: Permission-filtered listings and counts
//! - [`tree`]: Folder creation, rename and deletion
//! - [`manager`]: Facade tying the stores to one backend

pub mod config;
pub mod crypto;
pub mod grants;
pub mod manager;
pub mod metadata;
pub mod ownership;
pub mod storage;
pub mod store;
pub mod traversal;
pub mod tree;

// Re-export protocol for convenience
pub use folio_protocol as protocol;

// Re-export config types for convenience
pub use config::{Config, ConfigError};

// Re-export store types for convenience
pub use grants::{Capability, GrantSnapshot, GrantStore};
pub use ownership::OwnershipIndex;
pub use crypto::{EncryptionMarkers, FolderCrypto};
pub use metadata::MetadataCache;

// Re-export storage types for convenience
pub use storage::{EntryKind, EntryStat, LocalStorage, MemoryStorage, StorageAdapter};

// Re-export engine types for convenience
pub use manager::{FileManager, RemovedUser};
pub use traversal::{FolderTraversal, TraversalError, TraversalLimits};
pub use tree::{MutationOptions, PathFailure, TreeError, TreeMutation};
