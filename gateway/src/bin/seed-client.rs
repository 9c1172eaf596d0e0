//! Seeds a running gateway with one station/satellite pair and a day-long
//! prediction, then polls the current pointing data for a few seconds.
//!
//! Point it at a remote gateway with GATEWAY_HOST / GATEWAY_PORT.

use anyhow::Result;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use comm_gateway::client::GatewayClient;

const STATION_NAME: &str = "Samara";
const NORAD_ID: u32 = 57173;
const NOMINAL_FREQ_HZ: f64 = 437_398_600.0;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let host = std::env::var("GATEWAY_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("GATEWAY_PORT").unwrap_or_else(|_| "5555".to_string());

    let mut client = GatewayClient::connect(format!("{host}:{port}")).await?;
    tracing::info!("connected to comm-gateway at {host}:{port}");

    client
        .setup_ground_station(50.17763, 53.21204, 137.0, 0.0, STATION_NAME)
        .await?;
    client
        .setup_satellite(
            STATION_NAME,
            NORAD_ID,
            Some(NOMINAL_FREQ_HZ),
            Some(NOMINAL_FREQ_HZ),
        )
        .await?;
    client.setup_comm(STATION_NAME, NORAD_ID).await?;
    client
        .setup_new_tle_by_spacetrack(STATION_NAME, NORAD_ID)
        .await?;
    client
        .predict_comm(STATION_NAME, NORAD_ID, None, 86_400.0, 1.0)
        .await?;
    tracing::info!("prediction for NORAD ID {NORAD_ID} at '{STATION_NAME}' is ready");

    for _ in 0..10 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let point = client.get_data(STATION_NAME, NORAD_ID, None).await?;
        tracing::info!(
            "{}: azimuth {:?} deg, elevation {:?} deg, uplink {:?} Hz, downlink {:?} Hz",
            point.dt,
            point.azimuth,
            point.elevation,
            point.uplink,
            point.downlink,
        );
    }

    let sessions = client.get_comm_sessions_params(STATION_NAME, NORAD_ID).await?;
    tracing::info!("{} communication sessions over the next day", sessions.len());
    for (start, session) in &sessions {
        tracing::info!(
            "  {start} .. {} peaking at {:.1} deg",
            session.end_session_dt,
            session.max_elevation,
        );
    }

    client.close().await?;
    Ok(())
}
