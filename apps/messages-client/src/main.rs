use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use messages_client::{AppConfig, logging};

/// Messages client - calls the messages API with resolver-selected OAuth2 tokens
#[derive(Parser)]
#[command(name = "messages-client")]
#[command(about = "Messages client - calls the messages API with resolver-selected OAuth2 tokens")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port override for HTTP server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Run,
    /// Validate configuration and exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Layered config:
    // 1) defaults -> 2) YAML (if provided) -> 3) env (MESSAGES__*) -> 4) CLI overrides
    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_cli_overrides(cli.port, cli.verbose);

    logging::init_logging(&config.logging);

    if cli.print_config {
        println!("Effective configuration:\n{}", config.to_yaml()?);
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            tracing::info!("Messages client starting");
            messages_client::serve(&config).await?;
        }
        Commands::Check => check_config(&config)?,
    }
    Ok(())
}

fn check_config(config: &AppConfig) -> Result<()> {
    tracing::info!("Checking configuration...");
    let registrations = config.validate()?;
    println!(
        "Configuration is valid ({} client registrations)",
        registrations.len()
    );
    println!("{}", config.to_yaml()?);
    Ok(())
}
