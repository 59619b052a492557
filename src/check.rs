//! Config command - checks runtime and forwarder configuration offline

use anyhow::{Context, Result};
use clap::Args;
use esf_config::{ForwarderConfig, RuntimeConfig};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Args)]
pub struct CheckArgs {
    /// Runtime config file (TOML); defaults to ESF_CONFIG and ./esf.toml
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Forwarder config file (YAML) with inputs and outputs
    #[arg(short, long, value_name = "FILE")]
    pub forwarder: Option<PathBuf>,
}

pub fn execute(args: CheckArgs) -> Result<()> {
    let runtime = match &args.config {
        Some(path) => RuntimeConfig::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => RuntimeConfig::load().context("Failed to load configuration")?,
    };
    println!("Runtime config ({:?}):", runtime.platform);
    println!("  log: {} ({:?})", runtime.log.level, runtime.log.format);
    println!(
        "  continuing queue: {}",
        runtime.queues.continue_url.as_deref().unwrap_or("<unset>")
    );
    println!(
        "  replay queue: {}",
        runtime.queues.replay_url.as_deref().unwrap_or("<unset>")
    );
    println!(
        "  forwarder config: {}",
        runtime.forwarder.config_file.as_deref().unwrap_or("<unset>")
    );
    println!(
        "  completion grace period: {}ms",
        runtime.lambda.completion_grace_period_ms
    );

    if let Some(path) = &args.forwarder {
        let forwarder = load_forwarder(path)?;
        println!("Forwarder config {}:", path.display());
        for input in &forwarder.inputs {
            let outputs: Vec<&str> = input
                .outputs
                .iter()
                .map(|output| output.output_type().as_str())
                .collect();
            println!(
                "  {} {} -> {}",
                input.input_type,
                input.id,
                outputs.join(", ")
            );
        }
    }

    Ok(())
}

pub fn load_forwarder(path: &Path) -> Result<ForwarderConfig> {
    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let config = ForwarderConfig::parse(&text)
        .with_context(|| format!("Invalid forwarder config {}", path.display()))?;
    tracing::debug!(
        path = %path.display(),
        inputs = config.inputs.len(),
        "forwarder config loaded"
    );
    Ok(config)
}
