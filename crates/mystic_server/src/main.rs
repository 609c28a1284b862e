//! Gnosis Mystic Server
//!
//! Serves the Mystic HTTP API with the builtin demo functions registered.

#![warn(missing_docs)]
#![warn(clippy::all)]

use anyhow::{Context, Result};
use clap::Parser;
use mystic_core::{Environment, MysticConfig};
use mystic_server::{builtins, ApiServer, MysticService};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mystic-server")]
#[command(about = "Gnosis Mystic server", long_about = None)]
struct Args {
    /// Config file (JSON)
    #[arg(short, long, default_value = ".mystic/config.json")]
    config: PathBuf,

    /// Bind address, overrides the config file
    #[arg(short, long)]
    bind: Option<String>,

    /// Environment (dev, test, prod), overrides config and MYSTIC_ENV
    #[arg(short, long)]
    environment: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mystic=debug,tower_http=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = MysticConfig::load(&args.config).with_process_env();
    if let Some(env) = &args.environment {
        let environment: Environment = env
            .parse()
            .with_context(|| format!("invalid environment {:?}", env))?;
        config = config.with_environment(environment);
    }
    let bind = args.bind.unwrap_or_else(|| config.bind.clone());

    tracing::info!(
        environment = %config.environment,
        data_dir = %config.data_dir.display(),
        "starting mystic server"
    );

    let service = MysticService::new(&config).with_functions(builtins::all());
    ApiServer::new(bind, Arc::new(service))
        .serve()
        .await
        .context("server failed")?;

    Ok(())
}
