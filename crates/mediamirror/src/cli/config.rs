//! The `mediamirror config` command for configuration management.

use clap::{Args, Subcommand};
use mediamirror_core::Config;
use std::path::{Path, PathBuf};

/// Arguments for the `config` command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Subcommands for configuration management.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,

    /// Show config file path
    Path,

    /// Initialize a new config file with defaults
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,

        /// Input root to record in the new file
        #[arg(long)]
        input: Option<PathBuf>,

        /// Output root to record in the new file
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

/// Execute the config command.
pub async fn execute(args: ConfigArgs, config: Config) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show => {
            println!("{}", config.to_toml()?);
        }

        ConfigCommand::Path => {
            let path = Config::default_path();
            let state = if path.exists() { "" } else { " (not created)" };
            println!("{}{}", path.display(), state);
        }

        ConfigCommand::Init {
            force,
            input,
            output,
        } => {
            let path = Config::default_path();
            init_config(&path, force, input, output)?;
            tracing::info!("Config file created at: {}", path.display());
            println!("Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn init_config(
    path: &Path,
    force: bool,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at: {}\nUse --force to overwrite.",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut config = Config::default();
    if let Some(input) = input {
        config.paths.input_root = input;
    }
    if let Some(output) = output {
        config.paths.output_root = output;
    }
    std::fs::write(path, config.to_toml()?)?;
    Ok(())
}
