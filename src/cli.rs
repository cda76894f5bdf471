// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cloudship")]
#[command(about = "Provision, configure and deploy applications onto fresh cloud instances")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print final results
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Print JSON lines instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new cloudship.yml configuration file
    Init {
        /// Project name
        #[arg(long)]
        name: Option<String>,

        /// GitHub repository as owner/repo
        #[arg(long)]
        repo: Option<String>,

        /// Overwrite an existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Provision an instance and deploy the project onto it
    Deploy {
        /// Branch to deploy instead of target.branch
        #[arg(short, long)]
        branch: Option<String>,
    },

    /// Show a deployment's status, or list recent deployments
    Status {
        /// Deployment id; omit to list this project's deployments
        id: Option<String>,
    },

    /// Show a deployment's log
    Logs {
        /// Deployment id
        id: String,
    },

    /// Run a failed or cancelled deployment again
    Retry {
        /// Deployment id
        id: String,
    },

    /// Deploy again onto the instance of an earlier deployment
    Redeploy {
        /// Id of the deployment whose instance is reused
        id: String,
    },

    /// Mark a stalled deployment as cancelled
    Cancel {
        /// Deployment id
        id: String,
    },

    /// Destroy a deployment's infrastructure
    Destroy {
        /// Deployment id
        id: String,
    },
}
