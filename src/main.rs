// ABOUTME: Entry point for the cloudship CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use cloudship::config::{self, Config};
use cloudship::error::Result;
use cloudship::output::{Output, OutputMode};
use cloudship::types::DeploymentId;
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbose flag when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };
    let output = Output::new(mode);

    if let Err(e) = run(cli.command, &output).await {
        output.error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(command: Commands, output: &Output) -> Result<()> {
    let cwd = env::current_dir()?;

    if let Commands::Init { name, repo, force } = &command {
        config::init_config(&cwd, name.as_deref(), repo.as_deref(), *force)?;
        output.success(&format!("Created {}", config::CONFIG_FILENAME));
        return Ok(());
    }

    let config = Config::discover(&cwd)?;
    let ctx = commands::Context::build(&config).await?;

    match command {
        Commands::Init { .. } => Ok(()),
        Commands::Deploy { branch } => commands::deploy(&ctx, branch.as_deref(), output).await,
        Commands::Status { id } => match id {
            Some(id) => commands::status(&ctx, &DeploymentId::new(id), output).await,
            None => commands::list(&ctx, output).await,
        },
        Commands::Logs { id } => commands::logs(&ctx, &DeploymentId::new(id), output).await,
        Commands::Retry { id } => commands::retry(&ctx, &DeploymentId::new(id), output).await,
        Commands::Redeploy { id } => {
            commands::redeploy(&ctx, &DeploymentId::new(id), output).await
        }
        Commands::Cancel { id } => commands::cancel(&ctx, &DeploymentId::new(id), output).await,
        Commands::Destroy { id } => commands::destroy(&ctx, &DeploymentId::new(id), output).await,
    }
}
