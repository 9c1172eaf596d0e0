//! Satellite Communication Library
//!
//! Domain model for satellite-to-ground-station communication planning:
//! TLE ingest and caching, epoch state acquisition through an abstract SGP4
//! provider, center-of-mass prediction, per-sample visibility/look-angle/
//! Doppler computation, pass sessions, and the registry that multiplexes
//! many (station, satellite) records.

use thiserror::Error;

pub mod comm;
pub mod providers;
pub mod registry;
pub mod satellite;
pub mod station;
pub mod tle;

pub use comm::{Comm, CommSample, Session};
pub use providers::{CelestrakTleSource, Sgp4Provider, Sgp4Toolkit, TleSource};
pub use registry::{Registry, RegistryConfig};
pub use satellite::{SatPosition, Satellite};
pub use station::{Station, StationPosition};
pub use tle::TleRecord;

#[derive(Error, Debug)]
pub enum CommError {
    #[error("setup missing: {0}")]
    SetupMissing(String),
    #[error("no prediction data for NORAD {norad_id} at '{station}'")]
    NoPrediction { station: String, norad_id: u32 },
    #[error("satellite has no TLE set")]
    NoTle,
    #[error("TLE data error: {0}")]
    TleData(String),
    #[error("SGP4 provider error: {0}")]
    Sgp4Provider(String),
    #[error("NORAD ID {0} is outside the catalog range 1..=99999")]
    NoradIdRange(u32),
    #[error("invalid station definition: {0}")]
    StationDefinition(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CommError>;
