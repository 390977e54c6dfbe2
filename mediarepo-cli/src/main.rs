//! mediarepo CLI - Command-line interface
//!
//! Thin front end over the `mediarepo` library: look up file metadata,
//! thumbnails and hash matches, batch-prefetch many files at once, and
//! manage the configuration file.

mod commands;
mod error;

use clap::{Parser, Subcommand};
use tracing::debug;

use commands::common::{self, GlobalArgs};
use commands::config::ConfigCommands;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "mediarepo", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show the metadata of a file
    Fetch {
        /// File name, with or without the File: prefix
        name: String,

        /// Extra query parameter (repeatable), e.g. --param iiurlwidth=320
        #[arg(long = "param", value_parser = common::parse_param)]
        params: Vec<(String, String)>,

        /// Print the raw API envelope as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the thumbnail URL of a file at a given size
    Thumb {
        name: String,

        /// Thumbnail width in pixels
        #[arg(long)]
        width: u32,

        /// Thumbnail height in pixels
        #[arg(long)]
        height: Option<u32>,

        /// Handler-specific parameter (e.g. page3 or 480p.webm)
        #[arg(long)]
        param: Option<String>,
    },

    /// Fetch several files in one batched round trip
    Prefetch {
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Evict cached metadata for files and reload it
    Purge {
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Find files by the base-36 SHA-1 of their content
    Sha1 { hash: String },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    if let Commands::Config { command } = cli.command {
        return commands::config::run(command, &cli.global.config_path());
    }

    let config = common::load_config(&cli.global)?;
    let _log_guard = mediarepo::logging::init(&config.logging)?;
    debug!(config = %cli.global.config_path().display(), "Configuration loaded");

    let mut repo = common::open_repo(config)?;
    let result = match &cli.command {
        Commands::Fetch { name, params, json } => {
            commands::lookup::run_fetch(&mut repo, name, &common::to_params(params), *json)
        }
        Commands::Thumb {
            name,
            width,
            height,
            param,
        } => commands::lookup::run_thumb(&mut repo, name, *width, *height, param.as_deref()),
        Commands::Prefetch { names } => commands::prefetch::run(&mut repo, names),
        Commands::Purge { names } => commands::purge::run(&mut repo, names),
        Commands::Sha1 { hash } => commands::lookup::run_sha1(&mut repo, hash),
        Commands::Config { .. } => Ok(()),
    };

    repo.close()?;
    result
}
