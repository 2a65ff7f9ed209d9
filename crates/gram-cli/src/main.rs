//! Gram - deployment CLI
//!
//! Usage:
//!   gram validate                          # Check gram.deploy.json
//!   gram stage openapi --slug ... --location ...
//!   gram stage function --slug ... --location ... [--runtime nodejs:22]
//!   gram status [--id ID] [--wait]         # Show a deployment

mod client;
mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gram_core::config::DEFAULT_CONFIG_FILE;

use crate::client::{DEFAULT_API_URL, GramClient};
use crate::commands::{StageOptions, StatusOptions, run_stage, run_status, run_validate};

#[derive(Parser)]
#[command(name = "gram")]
#[command(about = "Deploy OpenAPI documents and functions to Gram", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a deployment config file
    Validate {
        /// Path to the deployment config file
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },

    /// Stage an artifact into a deployment config file
    Stage(StageArgs),

    /// Show the status of a deployment
    Status(StatusArgs),
}

#[derive(Args)]
struct StageArgs {
    /// Path to the deployment config file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: StageCommand,
}

#[derive(Args)]
struct SourceArgs {
    /// Slug identifying the source
    #[arg(long)]
    slug: String,

    /// Human-readable name (defaults to the slug)
    #[arg(long)]
    name: Option<String>,

    /// Local path or URL of the artifact
    #[arg(long)]
    location: String,
}

#[derive(Subcommand)]
enum StageCommand {
    /// Stage an OpenAPI document
    Openapi(SourceArgs),

    /// Stage a functions zip archive
    Function {
        #[command(flatten)]
        source: SourceArgs,

        /// Runtime for the functions
        #[arg(long, default_value = "nodejs:22")]
        runtime: String,
    },
}

#[derive(Args)]
struct ApiArgs {
    /// API key (must start with "gram")
    #[arg(long, env = "GRAM_API_KEY", hide_env_values = true)]
    api_key: String,

    /// API base URL
    #[arg(long, env = "GRAM_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Project slug
    #[arg(long, env = "GRAM_PROJECT")]
    project: Option<String>,
}

#[derive(Args)]
struct StatusArgs {
    #[command(flatten)]
    api: ApiArgs,

    /// Deployment id (defaults to the latest deployment)
    #[arg(long)]
    id: Option<String>,

    /// Poll until the deployment finishes processing
    #[arg(long)]
    wait: bool,

    /// Print the deployment's status log
    #[arg(long)]
    logs: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gram=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Validate { config } => {
            let loaded = run_validate(&config)?;
            println!(
                "{} is valid ({} source(s))",
                config.display(),
                loaded.sources.len()
            );
        }
        Commands::Stage(args) => {
            let opts = match args.command {
                StageCommand::Openapi(source) => stage_options(source, None),
                StageCommand::Function { source, runtime } => stage_options(source, Some(runtime)),
            };
            let staged = run_stage(&args.config, opts)?;
            println!(
                "Staged {} source {:?} in {}",
                staged.source_type,
                staged.slug,
                args.config.display()
            );
        }
        Commands::Status(args) => {
            let client = GramClient::new(
                &args.api.api_url,
                &args.api.api_key,
                args.api.project.as_deref(),
            )?;
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(run_status(
                &client,
                StatusOptions {
                    id: args.id,
                    wait: args.wait,
                    show_logs: args.logs,
                },
            ))?;
        }
    }
    Ok(())
}

fn stage_options(source: SourceArgs, runtime: Option<String>) -> StageOptions {
    StageOptions {
        slug: source.slug,
        name: source.name,
        location: source.location,
        runtime,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_stage_function() {
        let cli = Cli::try_parse_from([
            "gram", "stage", "--config", "deploy.json", "function", "--slug", "fns", "--location",
            "fns.zip",
        ])
        .unwrap();
        let Commands::Stage(args) = cli.command else {
            panic!("expected stage");
        };
        assert_eq!(args.config, PathBuf::from("deploy.json"));
        let StageCommand::Function { source, runtime } = args.command else {
            panic!("expected function");
        };
        assert_eq!(source.slug, "fns");
        assert_eq!(runtime, "nodejs:22");
    }

    #[test]
    fn test_parse_status_with_explicit_key() {
        let cli = Cli::try_parse_from([
            "gram", "status", "--api-key", "gram_key", "--api-url", "http://localhost:8080",
            "--wait",
        ])
        .unwrap();
        let Commands::Status(args) = cli.command else {
            panic!("expected status");
        };
        assert!(args.wait);
        assert_eq!(args.api.api_url, "http://localhost:8080");
    }
}
