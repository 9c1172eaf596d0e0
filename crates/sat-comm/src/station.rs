//! Ground station record.

use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;
use tracing::info;

use orbit_dynamics::frames;

use crate::{CommError, Result};

/// Station position in both ECEF (meters) and geodetic (radians, meters)
/// form. Derived once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StationPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Longitude, rad.
    pub lam: f64,
    /// Latitude, rad.
    pub phi: f64,
    /// Altitude, m.
    pub alt: f64,
}

/// A ground station (mission control site).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub name: String,
    pub pos: StationPosition,
    /// Minimum elevation for mutual visibility, rad.
    pub min_elevation: f64,
}

impl Station {
    /// Geodetic coordinates come in wire units: degrees and meters.
    pub fn new(
        name: &str,
        longitude_deg: f64,
        latitude_deg: f64,
        altitude_m: f64,
        min_elevation_deg: f64,
    ) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(CommError::StationDefinition(
                "station name must not be empty".into(),
            ));
        }

        let min_elevation = min_elevation_deg.to_radians();
        if !(-FRAC_PI_2..=FRAC_PI_2).contains(&min_elevation) {
            return Err(CommError::StationDefinition(format!(
                "minimum elevation {min_elevation_deg} deg is outside [-90, 90]"
            )));
        }

        let lam = longitude_deg.to_radians();
        let phi = latitude_deg.to_radians();
        let [x, y, z] = frames::geodetic_to_ecef(lam, phi, altitude_m);

        info!(
            "ground station '{name}' at longitude {longitude_deg} deg, latitude {latitude_deg} deg, \
             altitude {altitude_m} m registered"
        );

        Ok(Self {
            name: name.to_string(),
            pos: StationPosition {
                x,
                y,
                z,
                lam,
                phi,
                alt: altitude_m,
            },
            min_elevation,
        })
    }
}
