//! Folio
//!
//! Command-line access to a Folio folder namespace.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use folio_core::config::{default_config_path, Config};
use folio_core::FileManager;
use folio_protocol::{CallerContext, FolderGrants, FolderKey, PermsSnapshot, Username};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Folio - permission-aware folder namespace.
#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Act as this user
    #[arg(short, long, global = true, default_value = "admin")]
    pub user: String,

    /// Treat the user as a global administrator
    #[arg(long, global = true)]
    pub admin: bool,

    /// Treat the user's account as read-only
    #[arg(long, global = true)]
    pub read_only: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// List the subfolders of a folder
    Ls {
        /// Folder key (defaults to root)
        #[arg(default_value = "root")]
        folder: String,

        /// Resume after this name
        #[arg(long)]
        cursor: Option<String>,

        /// Page size
        #[arg(long)]
        limit: Option<usize>,

        /// Skip the locked-placeholder probe
        #[arg(long)]
        no_probe: bool,
    },

    /// Count what is visible inside a folder
    Count {
        /// Folder key (defaults to root)
        #[arg(default_value = "root")]
        folder: String,

        /// Walk the whole subtree
        #[arg(long)]
        deep: bool,

        /// Entry budget for a deep walk
        #[arg(long, requires = "deep")]
        max_scan: Option<usize>,

        /// Depth limit for a deep walk
        #[arg(long, requires = "deep")]
        max_depth: Option<usize>,
    },

    /// List every visible folder
    Folders {
        /// Start below this folder
        #[arg(long)]
        parent: Option<String>,

        /// Include immediate file counts
        #[arg(long)]
        counts: bool,
    },

    /// Create a folder
    Mkdir {
        /// Parent folder key
        parent: String,

        /// New folder name
        name: String,
    },

    /// Move or rename a folder
    Mv {
        /// Current folder key
        old: String,

        /// New folder key
        new: String,
    },

    /// Delete a folder
    Rmdir {
        /// Folder key
        folder: String,

        /// Delete contents too (administrators only)
        #[arg(long, short)]
        recursive: bool,
    },

    /// Replace a user's grants on one folder (administrators only)
    Grant {
        /// User receiving the grants
        target: String,

        /// Folder key
        folder: String,

        /// Capabilities to grant; omit to revoke everything
        #[arg(long, value_enum, value_delimiter = ',')]
        caps: Vec<GrantFlag>,
    },

    /// Record a folder's owner
    Owner {
        /// Folder key
        folder: String,

        /// New owner
        owner: String,
    },

    /// Mark or unmark a folder as encrypted (administrators only)
    Encrypt {
        /// Folder key
        folder: String,

        /// Remove the marker instead
        #[arg(long)]
        off: bool,
    },

    /// Remove a user from all grants and ownership records
    PurgeUser {
        /// User to remove
        target: String,
    },
}

/// One capability flag accepted by `grant --caps`.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantFlag {
    View,
    ViewOwn,
    Upload,
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

fn folder_grants(flags: &[GrantFlag]) -> FolderGrants {
    let mut grants = FolderGrants::default();
    for flag in flags {
        let slot = match flag {
            GrantFlag::View => &mut grants.view,
            GrantFlag::ViewOwn => &mut grants.view_own,
            GrantFlag::Upload => &mut grants.upload,
            GrantFlag::Manage => &mut grants.manage,
            GrantFlag::Share => &mut grants.share,
            GrantFlag::Create => &mut grants.create,
            GrantFlag::Edit => &mut grants.edit,
            GrantFlag::Rename => &mut grants.rename,
            GrantFlag::Copy => &mut grants.copy,
            GrantFlag::Move => &mut grants.move_,
            GrantFlag::Delete => &mut grants.delete,
            GrantFlag::Extract => &mut grants.extract,
            GrantFlag::ShareFile => &mut grants.share_file,
            GrantFlag::ShareFolder => &mut grants.share_folder,
        };
        *slot = true;
    }
    grants
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    if let Commands::Init { force } = cli.command {
        if config_path.exists() && !force {
            anyhow::bail!(
                "Config file already exists: {} (use --force to overwrite)",
                config_path.display()
            );
        }
        Config::default().save(&config_path)?;
        println!("Wrote default configuration to {}", config_path.display());
        return Ok(());
    }

    // Load configuration
    let mut config = if cli.config.is_some() {
        Config::load(&config_path)?
    } else {
        Config::load_default()?
    };

    // Apply environment variable overrides
    config.apply_env_overrides();

    // Validate configuration
    config.validate()?;

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let caller = CallerContext::new(
        Username::new(&cli.user).context("Invalid --user")?,
        PermsSnapshot {
            is_admin: cli.admin,
            read_only: cli.read_only,
            ..PermsSnapshot::default()
        },
    );
    tracing::debug!("Acting as {} (admin: {})", caller.username, caller.is_admin());

    let manager = FileManager::open(&config)?;

    match cli.command {
        Commands::Init { .. } => {}
        Commands::Ls {
            folder,
            cursor,
            limit,
            no_probe,
        } => {
            let folder = FolderKey::parse(&folder)?;
            let page = manager.traversal().list_children(
                &folder,
                &caller,
                cursor.as_deref(),
                limit,
                !no_probe,
            )?;
            print_json(&page)?;
        }
        Commands::Count {
            folder,
            deep,
            max_scan,
            max_depth,
        } => {
            let folder = FolderKey::parse(&folder)?;
            let traversal = manager.traversal();
            let counts = if deep {
                traversal.count_visible_deep(&folder, &caller, max_scan, max_depth)?
            } else {
                traversal.count_visible(&folder, &caller)?
            };
            print_json(&counts)?;
        }
        Commands::Folders { parent, counts } => {
            let parent = parent.as_deref().map(FolderKey::parse).transpose()?;
            let folders = manager
                .traversal()
                .folder_list(parent.as_ref(), Some(&caller), counts)?;
            print_json(&folders)?;
        }
        Commands::Mkdir { parent, name } => {
            let parent = FolderKey::parse(&parent)?;
            let created = manager.create_folder(&caller, &parent, &name)?;
            println!("Created {}", created);
        }
        Commands::Mv { old, new } => {
            let old = FolderKey::parse(&old)?;
            let new = FolderKey::parse(&new)?;
            manager.rename_folder(&caller, &old, &new)?;
            println!("Moved {} to {}", old, new);
        }
        Commands::Rmdir { folder, recursive } => {
            let folder = FolderKey::parse(&folder)?;
            if recursive {
                manager.delete_folder_recursive(&caller, &folder)?;
            } else {
                manager.delete_folder(&caller, &folder)?;
            }
            println!("Deleted {}", folder);
        }
        Commands::Grant {
            target,
            folder,
            caps,
        } => {
            let target = Username::new(&target)?;
            let folder = FolderKey::parse(&folder)?;
            let payload = BTreeMap::from([(folder, folder_grants(&caps))]);
            let changed = manager.save_user_grants(&caller, &target, &payload)?;
            print_json(&changed)?;
        }
        Commands::Owner { folder, owner } => {
            let folder = FolderKey::parse(&folder)?;
            let owner = Username::new(&owner)?;
            manager.set_folder_owner(&caller, &folder, &owner)?;
            println!("{} is now owned by {}", folder, owner);
        }
        Commands::Encrypt { folder, off } => {
            if !caller.is_admin() {
                anyhow::bail!("Only administrators may change encryption markers");
            }
            let folder = FolderKey::parse(&folder)?;
            let changed = if off {
                manager.crypto().unmark(&folder)?
            } else {
                manager.crypto().mark(&folder)?
            };
            if !changed {
                println!("{} was already {}", folder, if off { "unmarked" } else { "marked" });
            }
        }
        Commands::PurgeUser { target } => {
            let target = Username::new(&target)?;
            let removed = manager.remove_user(&caller, &target)?;
            print_json(&removed)?;
        }
    }

    Ok(())
}
