use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use planner_gateway::{config::AppConfig, server};

#[derive(Parser)]
#[command(name = "planner-gateway", version, about = "API gateway for the planner services")]
struct Args {
    #[arg(long, help = "Port to listen on (overrides PORT / GATEWAY_PORT)")]
    port: Option<u16>,

    #[arg(long, help = "YAML route table (overrides GATEWAY_ROUTES_FILE)")]
    routes: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so local runs pick up JWT_SECRET and the service URLs
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = AppConfig::from_env().context("invalid configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(routes) = args.routes {
        config.routes_file = Some(routes);
    }

    tracing::info!("Starting API gateway in {:?} mode", config.environment);

    let state = server::AppState::from_config(config)?;
    server::serve(state).await
}
