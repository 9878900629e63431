//! CLI command definitions and handlers.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};

use crate::config::SnapshotterConfig;
use crate::info::Info;
use crate::overlay::OverlaySnapshotter;
use crate::snapshotter::Snapshotter;
use crate::sweep::sweep_orphans;

/// Bock Snapshot - overlay layer management
#[derive(Parser)]
#[command(name = "bock-snapshot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Root directory for snapshot data
    #[arg(
        long,
        global = true,
        env = "BOCK_ROOT",
        default_value = "/var/lib/bock/snapshot/overlay"
    )]
    pub root: PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Snapshot commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Create a writable active snapshot and print its mounts
    Prepare {
        /// Key of the new active snapshot
        key: String,

        /// Name of the committed parent
        #[arg(default_value = "")]
        parent: String,
    },

    /// Create a read-only view and print its mounts
    View {
        /// Key of the new view
        key: String,

        /// Name of the committed parent
        #[arg(default_value = "")]
        parent: String,
    },

    /// Print the mounts of an active snapshot
    Mounts {
        /// Key of the active snapshot
        key: String,
    },

    /// Commit an active snapshot
    Commit {
        /// Name of the committed snapshot
        name: String,

        /// Key of the active snapshot
        key: String,
    },

    /// Remove a snapshot
    #[command(alias = "remove")]
    Rm {
        /// Key or name of the snapshot
        key: String,
    },

    /// Show snapshot information
    Stat {
        /// Key or name of the snapshot
        key: String,
    },

    /// List committed snapshots
    #[command(alias = "list")]
    Ls {
        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,

        /// Only display names
        #[arg(short, long)]
        quiet: bool,
    },

    /// Show disk usage of a snapshot
    Usage {
        /// Key or name of the snapshot
        key: String,
    },

    /// Remove leftovers of interrupted operations
    Sweep,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn execute(self) -> Result<()> {
        let config = SnapshotterConfig::default().with_root(&self.root);

        let snapshotter = OverlaySnapshotter::open(&config)
            .map_err(|e| eyre!("Failed to open snapshotter: {}", e))?;

        match self.command {
            Commands::Prepare { key, parent } => {
                let mounts = snapshotter
                    .prepare(&key, &parent)
                    .await
                    .map_err(|e| eyre!("Failed to prepare snapshot: {}", e))?;
                println!("{}", serde_json::to_string_pretty(&mounts)?);
            }

            Commands::View { key, parent } => {
                let mounts = snapshotter
                    .view(&key, &parent)
                    .await
                    .map_err(|e| eyre!("Failed to create view: {}", e))?;
                println!("{}", serde_json::to_string_pretty(&mounts)?);
            }

            Commands::Mounts { key } => {
                let mounts = snapshotter
                    .mounts(&key)
                    .await
                    .map_err(|e| eyre!("Failed to get mounts: {}", e))?;
                println!("{}", serde_json::to_string_pretty(&mounts)?);
            }

            Commands::Commit { name, key } => {
                snapshotter
                    .commit(&name, &key)
                    .await
                    .map_err(|e| eyre!("Failed to commit snapshot: {}", e))?;
                println!("Snapshot {} committed as {}", key, name);
            }

            Commands::Rm { key } => {
                snapshotter
                    .remove(&key)
                    .await
                    .map_err(|e| eyre!("Failed to remove snapshot: {}", e))?;
                println!("Snapshot {} removed", key);
            }

            Commands::Stat { key } => {
                let info = snapshotter
                    .stat(&key)
                    .await
                    .map_err(|e| eyre!("Failed to stat snapshot: {}", e))?;
                println!("{}", serde_json::to_string_pretty(&info)?);
            }

            Commands::Ls { format, quiet } => {
                let mut list: Vec<Info> = Vec::new();
                snapshotter
                    .walk(&mut |info: &Info| {
                        list.push(info.clone());
                        Ok(())
                    })
                    .await
                    .map_err(|e| eyre!("Failed to list snapshots: {}", e))?;

                if quiet {
                    for info in list {
                        println!("{}", info.name);
                    }
                } else if format == "json" {
                    println!("{}", serde_json::to_string_pretty(&list)?);
                } else {
                    println!("NAME\tPARENT\tCREATED");
                    for info in list {
                        println!(
                            "{}\t{}\t{}",
                            info.name,
                            info.parent.as_deref().unwrap_or("-"),
                            info.created.to_rfc3339()
                        );
                    }
                }
            }

            Commands::Usage { key } => {
                let usage = snapshotter
                    .usage(&key)
                    .await
                    .map_err(|e| eyre!("Failed to get usage: {}", e))?;
                println!("{}", serde_json::to_string_pretty(&usage)?);
            }

            Commands::Sweep => {
                let removed = sweep_orphans(snapshotter.paths())
                    .map_err(|e| eyre!("Failed to sweep snapshots: {}", e))?;
                for path in removed {
                    println!("{}", path.display());
                }
            }
        }

        Ok(())
    }
}
