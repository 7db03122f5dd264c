//! The `mediamirror check` command: external tool and decoder availability.

use clap::Args;
use mediamirror_core::pipeline::Classifier;
use mediamirror_core::{Config, OutputFormat, OutputWriter, ToolInfo, Toolchain};
use serde_json::json;

/// Arguments for the `check` command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Print the result as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

/// Execute the check command. Fails if a required tool is missing.
pub async fn execute(args: CheckArgs, config: Config) -> anyhow::Result<()> {
    let tools = Toolchain::check_all(&config.tools).await;
    let decoders = [
        ("raw", cfg!(feature = "raw")),
        ("heif", cfg!(feature = "heif")),
    ];
    let extensions: Vec<&str> = Classifier::supported_extensions().collect();

    if args.json {
        let report = json!({
            "tools": tools,
            "decoders": decoders
                .iter()
                .map(|(name, enabled)| json!({ "name": name, "enabled": enabled }))
                .collect::<Vec<_>>(),
            "extensions": extensions,
        });
        let mut writer = OutputWriter::new(std::io::stdout().lock(), OutputFormat::Json, true);
        writer.write(&report)?;
        writer.flush()?;
    } else {
        for tool in &tools {
            println!("{}", describe_tool(tool));
        }
        for (name, enabled) in decoders {
            let state = if enabled { "enabled" } else { "not compiled" };
            println!("  {:<8} {}", name, state);
        }
        println!("Supported extensions: {}", extensions.join(", "));
    }

    let missing: Vec<&str> = tools
        .iter()
        .filter(|t| !t.available)
        .map(|t| t.name.as_str())
        .collect();
    if !missing.is_empty() {
        anyhow::bail!(
            "Missing required tools: {}. Install ffmpeg or set [tools] paths in the config.",
            missing.join(", ")
        );
    }
    Ok(())
}

fn describe_tool(tool: &ToolInfo) -> String {
    match (&tool.path, &tool.version) {
        (Some(path), Some(version)) => {
            format!("  {:<8} {} ({})", tool.name, version, path.display())
        }
        (Some(path), None) => format!("  {:<8} unknown version ({})", tool.name, path.display()),
        _ => format!("  {:<8} NOT FOUND", tool.name),
    }
}
