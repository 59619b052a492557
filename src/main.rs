use anyhow::Result;
use clap::{Parser, Subcommand};
use esf::check::CheckArgs;
use esf::deploy::TemplateCommand;
use esf_config::{Platform, RuntimeConfig};

/// Deployment tooling for the Elastic Serverless Forwarder
#[derive(Parser)]
#[command(name = "esf")]
#[command(version)]
#[command(about = "Render and validate the forwarder's SAM template", long_about = None)]
struct Cli {
    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render or validate the deployment template
    #[command(subcommand)]
    Template(TemplateCommand),
    /// Configuration commands
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Load runtime and forwarder configuration and print a summary
    Check(CheckArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logging = RuntimeConfig::from_platform_defaults(Platform::Local);
    if let Some(level) = cli.log_level {
        logging.log.level = level;
    }
    // logs go to stderr so rendered output on stdout stays clean
    esf_config::init_tracing(&logging.log, std::io::stderr);

    match cli.command {
        Command::Template(command) => command.run(),
        Command::Config(ConfigCommand::Check(args)) => esf::check::execute(args),
    }
}
