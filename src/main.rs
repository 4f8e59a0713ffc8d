// src/main.rs
//! Pandora Package Manager - CLI Entry Point

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

/// Index used when none is given on the command line.
const DEFAULT_INDEX_URL: &str = "https://atlaslinux.github.io/pandora/index.acl";

// =============================================================================
// CLI Definitions
// =============================================================================

#[derive(Parser)]
#[command(name = "pandora")]
#[command(author = "Atlas Linux")]
#[command(version)]
#[command(about = "Home-directory package manager with an immutable store and atomic profile swaps", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the pandora root and run a recovery sweep
    Init,

    /// Fetch and cache a package's manifest without installing
    Fetch {
        /// Package name
        name: String,

        /// Package version
        version: String,

        /// Registry index URL (http/https or a local path)
        #[arg(long, default_value = DEFAULT_INDEX_URL)]
        index: String,
    },

    /// Install a package and activate it into a profile
    Install {
        /// Package spec as name@version
        spec: String,

        /// Registry index URL (http/https or a local path)
        #[arg(long, default_value = DEFAULT_INDEX_URL)]
        index: String,

        /// Import into the store but skip profile activation
        #[arg(long)]
        no_activate: bool,

        /// Profile label to activate into
        #[arg(long, default_value = "default")]
        profile: String,

        /// Assume yes for the activation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Pack files or directories into a .pnd archive
    Pack {
        /// Output archive path
        archive: PathBuf,

        /// Files or directories to pack
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Unpack a .pnd archive
    Unpack {
        /// Archive to unpack
        archive: PathBuf,

        /// Destination directory (defaults to the current directory)
        dest: Option<PathBuf>,
    },

    /// Show the active profile and store contents
    Show,

    /// Trust a manifest-signing key
    KeyAdd {
        /// File holding a base64 ed25519 public key
        file: PathBuf,

        /// Key id to store it under (defaults to the file stem)
        #[arg(long)]
        id: Option<String>,
    },
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => commands::cmd_init(),

        Commands::Fetch { name, version, index } => commands::cmd_fetch(&name, &version, &index),

        Commands::Install { spec, index, no_activate, profile, yes } => {
            commands::cmd_install(&spec, &index, no_activate, &profile, yes)
        }

        Commands::Pack { archive, inputs } => commands::cmd_pack(&archive, &inputs),

        Commands::Unpack { archive, dest } => commands::cmd_unpack(&archive, dest.as_deref()),

        Commands::Show => commands::cmd_show(),

        Commands::KeyAdd { file, id } => commands::cmd_key_add(&file, id.as_deref()),
    }
}
