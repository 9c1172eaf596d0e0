use anyhow::Result;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use comm_gateway::server;
use sat_comm::{CelestrakTleSource, Registry, RegistryConfig, Sgp4Toolkit};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "comm_gateway=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let host = std::env::var("GATEWAY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("GATEWAY_PORT").unwrap_or_else(|_| "5555".to_string());
    let tle_dir = std::env::var("TLE_DIR").unwrap_or_else(|_| "tle".to_string());
    let tle_url = std::env::var("TLE_SOURCE_URL")
        .unwrap_or_else(|_| CelestrakTleSource::DEFAULT_URL.to_string());

    let registry = Registry::new(
        RegistryConfig {
            tle_dir: PathBuf::from(&tle_dir),
        },
        Arc::new(Sgp4Toolkit),
        Arc::new(CelestrakTleSource::new(tle_url)),
    );

    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("comm-gateway listening on {addr}");
    tracing::info!("   TLE cache directory: {tle_dir}");

    server::serve(listener, Arc::new(Mutex::new(registry))).await
}
