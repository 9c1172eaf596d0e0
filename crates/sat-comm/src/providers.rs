//! External capabilities: SGP4 epoch states and TLE acquisition.
//!
//! Both are traits so the engine stays independent of any particular SGP4
//! library or catalog service; tests substitute fakes.

use chrono::NaiveDateTime;
use orbit_dynamics::EciState;
use tracing::info;

use crate::tle::TleRecord;
use crate::{CommError, Result};

/// Produces the inertial state of a satellite at an instant, in meters and
/// meters per second.
pub trait Sgp4Provider: Send + Sync {
    fn state_at(&self, tle: &TleRecord, at: NaiveDateTime) -> Result<EciState>;
}

/// Returns the freshest element set known for a catalog number.
pub trait TleSource: Send + Sync {
    fn fetch_latest(&self, norad_id: u32) -> Result<(String, String)>;
}

/// Default [`Sgp4Provider`] backed by the `sgp4` crate.
pub struct Sgp4Toolkit;

impl Sgp4Provider for Sgp4Toolkit {
    fn state_at(&self, tle: &TleRecord, at: NaiveDateTime) -> Result<EciState> {
        let elements = sgp4::Elements::from_tle(
            tle.name.clone(),
            tle.line1.as_bytes(),
            tle.line2.as_bytes(),
        )
        .map_err(|e| CommError::Sgp4Provider(format!("element parse failed: {e:?}")))?;

        let constants = sgp4::Constants::from_elements(&elements)
            .map_err(|e| CommError::Sgp4Provider(format!("initialization failed: {e:?}")))?;

        let minutes_since_epoch = (at - elements.datetime).num_milliseconds() as f64 / 60_000.0;
        let prediction = constants
            .propagate(minutes_since_epoch)
            .map_err(|e| CommError::Sgp4Provider(format!("propagation failed: {e:?}")))?;

        // The sgp4 crate works in kilometers.
        Ok(EciState {
            position: prediction.position.map(|v| v * 1000.0),
            velocity: prediction.velocity.map(|v| v * 1000.0),
        })
    }
}

/// [`TleSource`] over a CelesTrak-style GP endpoint: a plain GET by catalog
/// number, no authentication, text response of name plus the two lines.
pub struct CelestrakTleSource {
    base_url: String,
}

impl CelestrakTleSource {
    pub const DEFAULT_URL: &'static str = "https://celestrak.org/NORAD/elements/gp.php";

    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl Default for CelestrakTleSource {
    fn default() -> Self {
        Self::new(Self::DEFAULT_URL)
    }
}

impl TleSource for CelestrakTleSource {
    fn fetch_latest(&self, norad_id: u32) -> Result<(String, String)> {
        let url = format!("{}?CATNR={}&FORMAT=tle", self.base_url, norad_id);
        let body = reqwest::blocking::get(&url)
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text())
            .map_err(|e| CommError::TleData(format!("TLE download failed: {e}")))?;

        let lines: Vec<&str> = body
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .collect();

        // The feed answers with an optional name line followed by the pair.
        for window in lines.windows(2) {
            if window[0].starts_with("1 ") && window[1].starts_with("2 ") {
                info!("TLE for NORAD ID {norad_id} downloaded");
                return Ok((window[0].to_string(), window[1].to_string()));
            }
        }

        Err(CommError::TleData(format!(
            "downloaded TLE for NORAD ID {norad_id} has no data"
        )))
    }
}
