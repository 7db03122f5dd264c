//! MediaMirror CLI - mirror a photo and video tree into lightweight copies.
//!
//! Every image under the input root becomes a JPEG capped at a maximum
//! dimension and every video becomes an H.264 MP4, at the same relative path
//! under the output root. Capture dates and file timestamps are carried
//! over, and re-running only converts what is missing.
//!
//! # Usage
//!
//! ```bash
//! # Mirror a tree
//! mediamirror run ~/Pictures/Originals ~/Pictures/Mirror
//!
//! # Write a JSONL report of every file
//! mediamirror run ./in ./out --report run.jsonl
//!
//! # Check that ffmpeg and ffprobe are installed
//! mediamirror check
//!
//! # View configuration
//! mediamirror config show
//! ```

use clap::{Parser, Subcommand};
use mediamirror_core::Config;

mod cli;
mod logging;

/// MediaMirror - batch conversion of photos and videos into a mirrored tree.
#[derive(Parser, Debug)]
#[command(name = "mediamirror")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert every image and video under the input root
    Run(cli::run::RunArgs),

    /// Report whether the external tools are available
    Check(cli::check::CheckArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // A config file named on the command line must load; the default one may be absent or broken.
    let config = match &cli.command {
        Commands::Run(cli::run::RunArgs {
            config: Some(path), ..
        }) => Config::load_from(path)?,
        _ => match Config::load() {
            Ok(config) => config,
            Err(e) => {
                // Logging isn't initialized yet
                eprintln!(
                    "Warning: Failed to load config: {e}\n  \
                     Using default configuration. Check your config file with `mediamirror config path`."
                );
                Config::default()
            }
        },
    };
    let _log_guard = logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("MediaMirror v{}", mediamirror_core::VERSION);

    match cli.command {
        Commands::Run(args) => cli::run::execute(args, config).await,
        Commands::Check(args) => cli::check::execute(args, config).await,
        Commands::Config(args) => cli::config::execute(args, config).await,
    }
}
