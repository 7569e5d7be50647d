use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::engine::PostgresEngine;
use crate::logging;
use crate::naming;
use crate::server::Server;

#[derive(Parser)]
#[command(name = "rhythm-gateway")]
#[command(about = "Rhythm Gateway - Synchronous HTTP front door for durable workflows", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Engine database URL (overrides config file and env vars)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Listen port (overrides config file and env vars)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP gateway
    Serve,

    /// Print the workflow name a request path resolves to
    Resolve {
        /// First path segment
        workflow_type: String,

        /// Second path segment
        workflow_name: String,
    },

    /// Load and validate configuration, then print it with secrets masked
    CheckConfig,
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

pub async fn run_cli_with_args(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Resolve {
            workflow_type,
            workflow_name,
        } => {
            println!("{}", naming::resolve(&workflow_type, &workflow_name));
        }

        Commands::CheckConfig => {
            dotenvy::dotenv().ok();
            let config = Config::builder()
                .config_path(cli.config)
                .database_url(cli.database_url)
                .port(cli.port)
                .build()?;

            let rendered = toml::to_string_pretty(&config.redacted())
                .context("Failed to render configuration")?;
            println!("{}", rendered);
            if config.engine.url.is_empty() {
                eprintln!("Warning: engine.url is not set, `serve` will refuse to start");
            }
        }

        Commands::Serve => {
            dotenvy::dotenv().ok();
            let config = Config::builder()
                .config_path(cli.config)
                .database_url(cli.database_url)
                .port(cli.port)
                .require_engine(true)
                .build()?;

            logging::init_tracing(&config.logging);

            let engine = PostgresEngine::connect(&config.engine)
                .await
                .context("Failed to connect to workflow engine")?;
            tracing::info!(namespace = %config.engine.namespace, "Connected to workflow engine");

            Server::new(config, Arc::new(engine))?.run().await?;
        }
    }

    Ok(())
}
