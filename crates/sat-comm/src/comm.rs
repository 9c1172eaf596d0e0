//! Communication record between one satellite and one ground station:
//! per-sample visibility, look angles and Doppler-shifted link frequencies,
//! plus session (pass) detection over the predicted period.

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::PI;
use tracing::{info, warn};

use orbit_dynamics::{frames, sun};

use crate::satellite::{SatPosition, Satellite};
use crate::station::{Station, StationPosition};

/// Effective Earth radius of the visibility test, m.
const VISIBILITY_RADIUS_M: f64 = 6_371_302.0;

/// Speed of light, m/s.
const SPEED_OF_LIGHT_M_S: f64 = 299_792_458.0;

/// Communication parameters at one predicted instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CommSample {
    pub pos: SatPosition,
    /// Elevation above the station horizon, deg.
    pub elevation: f64,
    /// Bearing from North, clockwise, deg in [0, 360).
    pub azimuth: f64,
    pub visibility: bool,
    /// Doppler-corrected command frequency, Hz. Unset on the first sample
    /// of a prediction and when the satellite has no nominal uplink.
    pub uplink: Option<f64>,
    pub downlink: Option<f64>,
}

/// One communication session (pass): geometry at the start, at maximum
/// elevation and at the end, with the matching Sun angles for each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub start_session_dt: NaiveDateTime,
    pub start_elevation: f64,
    pub start_azimuth: f64,
    pub start_sun_elevation: f64,
    pub start_sun_azimuth: f64,

    pub max_session_dt: NaiveDateTime,
    pub max_elevation: f64,
    pub max_azimuth: f64,
    pub max_sun_elevation: f64,
    pub max_sun_azimuth: f64,

    pub end_session_dt: NaiveDateTime,
    pub end_elevation: f64,
    pub end_azimuth: f64,
    pub end_sun_elevation: f64,
    pub end_sun_azimuth: f64,

    /// True when the azimuth track jumps across North (any adjacent-sample
    /// difference above 330 deg).
    pub zero_crossing_azimuth_flag: bool,
}

/// Communication between one satellite and one ground station. Holds
/// back-references (station name, catalog number), never the records
/// themselves; callers pass the referents into each operation.
pub struct Comm {
    pub station_name: String,
    pub norad_id: u32,
    pub comm_data: BTreeMap<NaiveDateTime, CommSample>,
    pub sessions: BTreeMap<NaiveDateTime, Session>,
}

impl Comm {
    pub fn new(station_name: &str, norad_id: u32) -> Self {
        info!(
            "communication between satellite with NORAD ID {norad_id} and ground station \
             '{station_name}' registered"
        );
        Self {
            station_name: station_name.to_string(),
            norad_id,
            comm_data: BTreeMap::new(),
            sessions: BTreeMap::new(),
        }
    }

    fn range(pos: &SatPosition, station: &StationPosition) -> f64 {
        ((pos.x - station.x).powi(2) + (pos.y - station.y).powi(2) + (pos.z - station.z).powi(2))
            .sqrt()
    }

    /// Line-of-sight test against the station's minimum elevation cone.
    fn visibility(pos: &SatPosition, station: &Station) -> bool {
        let stn = &station.pos;
        let r1 = [pos.x - stn.x, pos.y - stn.y, pos.z - stn.z];
        let dot = r1[0] * stn.x + r1[1] * stn.y + r1[2] * stn.z;
        let mod_r1 = (r1[0].powi(2) + r1[1].powi(2) + r1[2].powi(2)).sqrt();

        dot - mod_r1 * VISIBILITY_RADIUS_M * station.min_elevation.sin() > 0.0
    }

    /// Look angles in degrees: bearing to the sub-satellite point and
    /// elevation from the normalized station-to-satellite dot product.
    fn azimuth_elevation(pos: &SatPosition, station: &StationPosition) -> (f64, f64) {
        let (lam_sat, phi_sat, _) = frames::ecef_to_geodetic(pos.x, pos.y, pos.z);
        let delta = lam_sat - station.lam;
        let mut azimuth = (delta.sin() * phi_sat.cos()).atan2(
            station.phi.cos() * phi_sat.sin() - station.phi.sin() * phi_sat.cos() * delta.cos(),
        );
        if azimuth < 0.0 {
            azimuth += 2.0 * PI;
        }

        let r1 = [pos.x - station.x, pos.y - station.y, pos.z - station.z];
        let dot = r1[0] * station.x + r1[1] * station.y + r1[2] * station.z;
        let mod_r1 = (r1[0].powi(2) + r1[1].powi(2) + r1[2].powi(2)).sqrt();
        let mod_r2 = (station.x.powi(2) + station.y.powi(2) + station.z.powi(2)).sqrt();
        let elevation = (dot / (mod_r1 * mod_r2)).asin();

        (azimuth.to_degrees(), elevation.to_degrees())
    }

    /// One-way Doppler from the range change between two consecutive
    /// samples; positive range change means the satellite recedes.
    fn doppler_links(
        prev: &SatPosition,
        current: &SatPosition,
        satellite: &Satellite,
        station: &StationPosition,
    ) -> (Option<f64>, Option<f64>) {
        let v = Self::range(current, station) - Self::range(prev, station);

        let uplink = satellite
            .uplink_freq
            .map(|f| f / (1.0 - v / SPEED_OF_LIGHT_M_S));
        let downlink = satellite
            .downlink_freq
            .map(|f| f / (1.0 + v / SPEED_OF_LIGHT_M_S));

        (uplink, downlink)
    }

    /// Rebuild `comm_data` from the satellite's current trajectory. The
    /// first sample has no predecessor, so its link frequencies stay unset.
    pub fn compute_over_prediction(&mut self, satellite: &Satellite, station: &Station) {
        self.comm_data.clear();

        let mut prev: Option<&SatPosition> = None;
        for (instant, pos) in satellite.trajectory() {
            let (azimuth, elevation) = Self::azimuth_elevation(pos, &station.pos);
            let (uplink, downlink) = match prev {
                Some(prev) => Self::doppler_links(prev, pos, satellite, &station.pos),
                None => (None, None),
            };

            self.comm_data.insert(
                *instant,
                CommSample {
                    pos: *pos,
                    elevation,
                    azimuth,
                    visibility: Self::visibility(pos, station),
                    uplink,
                    downlink,
                },
            );
            prev = Some(pos);
        }

        info!(
            "communication calculation for satellite with NORAD ID {} and ground station '{}' \
             completed over {} samples",
            self.norad_id,
            self.station_name,
            self.comm_data.len()
        );
    }

    /// Detect sessions with a single forward scan over the visibility flag.
    /// A session still open at the end of the horizon is closed at the final
    /// sample. Sessions are keyed by their start instant.
    pub fn define_sessions(&mut self, station: &Station) {
        self.sessions.clear();

        let mut open: Option<OpenSession> = None;
        for (instant, sample) in &self.comm_data {
            if sample.visibility {
                match open.as_mut() {
                    Some(tracker) => tracker.extend(*instant, sample),
                    None => open = Some(OpenSession::start(*instant, sample)),
                }
            } else if let Some(tracker) = open.take() {
                self.sessions.insert(
                    tracker.start.with_nanosecond(0).unwrap_or(tracker.start),
                    tracker.close(station),
                );
            }
        }
        if let Some(tracker) = open.take() {
            self.sessions.insert(
                tracker.start.with_nanosecond(0).unwrap_or(tracker.start),
                tracker.close(station),
            );
        }

        info!(
            "total {} communication sessions between satellite with NORAD ID {} and ground \
             station '{}' defined",
            self.sessions.len(),
            self.norad_id,
            self.station_name
        );
    }

    /// Refresh link frequencies for every sample at or after `from`,
    /// leaving geometry untouched. The earliest affected trajectory sample
    /// serves as the range baseline and keeps its stored values.
    pub fn recalculate_links_from(
        &mut self,
        from: NaiveDateTime,
        satellite: &Satellite,
        station: &Station,
    ) {
        if satellite.trajectory().is_empty() {
            warn!(
                "satellite with NORAD ID {} has no completed prediction, link frequencies were \
                 not recalculated",
                self.norad_id
            );
            return;
        }

        let mut prev: Option<&SatPosition> = None;
        for (instant, pos) in satellite.trajectory().range(from..) {
            if let Some(prev) = prev {
                let (uplink, downlink) = Self::doppler_links(prev, pos, satellite, &station.pos);
                if let Some(sample) = self.comm_data.get_mut(instant) {
                    sample.uplink = uplink;
                    sample.downlink = downlink;
                }
            }
            prev = Some(pos);
        }

        info!(
            "link frequencies for satellite with NORAD ID {} recalculated from {from}",
            self.norad_id
        );
    }
}

/// Accumulator for the session currently in progress.
struct OpenSession {
    start: NaiveDateTime,
    start_elevation: f64,
    start_azimuth: f64,
    max: NaiveDateTime,
    max_elevation: f64,
    max_azimuth: f64,
    end: NaiveDateTime,
    end_elevation: f64,
    end_azimuth: f64,
    prev_azimuth: f64,
    zero_crossing: bool,
}

impl OpenSession {
    fn start(instant: NaiveDateTime, sample: &CommSample) -> Self {
        Self {
            start: instant,
            start_elevation: sample.elevation,
            start_azimuth: sample.azimuth,
            max: instant,
            max_elevation: sample.elevation,
            max_azimuth: sample.azimuth,
            end: instant,
            end_elevation: sample.elevation,
            end_azimuth: sample.azimuth,
            prev_azimuth: sample.azimuth,
            zero_crossing: false,
        }
    }

    fn extend(&mut self, instant: NaiveDateTime, sample: &CommSample) {
        if (self.prev_azimuth - sample.azimuth).abs() > 330.0 {
            self.zero_crossing = true;
        }
        self.prev_azimuth = sample.azimuth;

        if sample.elevation > self.max_elevation {
            self.max_elevation = sample.elevation;
            self.max_azimuth = sample.azimuth;
            self.max = instant;
        }

        self.end = instant;
        self.end_elevation = sample.elevation;
        self.end_azimuth = sample.azimuth;
    }

    fn close(self, station: &Station) -> Session {
        let (start_sun_elevation, start_sun_azimuth) =
            sun::sun_angles(self.start, station.pos.lam, station.pos.phi);
        let (max_sun_elevation, max_sun_azimuth) =
            sun::sun_angles(self.max, station.pos.lam, station.pos.phi);
        let (end_sun_elevation, end_sun_azimuth) =
            sun::sun_angles(self.end, station.pos.lam, station.pos.phi);

        Session {
            start_session_dt: self.start,
            start_elevation: self.start_elevation,
            start_azimuth: self.start_azimuth,
            start_sun_elevation,
            start_sun_azimuth,
            max_session_dt: self.max,
            max_elevation: self.max_elevation,
            max_azimuth: self.max_azimuth,
            max_sun_elevation,
            max_sun_azimuth,
            end_session_dt: self.end,
            end_elevation: self.end_elevation,
            end_azimuth: self.end_azimuth,
            end_sun_elevation,
            end_sun_azimuth,
            zero_crossing_azimuth_flag: self.zero_crossing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::satellite::tests::{sample_start, test_satellite};
    use chrono::Duration;

    fn samara() -> Station {
        Station::new("Samara", 50.17763, 53.21204, 137.0, 0.0).unwrap()
    }

    fn synthetic_sample(elevation: f64, azimuth: f64) -> CommSample {
        CommSample {
            pos: SatPosition {
                x: 7.0e6,
                y: 0.0,
                z: 0.0,
            },
            elevation,
            azimuth,
            visibility: elevation >= 0.0,
            uplink: None,
            downlink: None,
        }
    }

    fn comm_with_elevations(elevations: &[f64]) -> Comm {
        let mut comm = Comm::new("Samara", 24793);
        let start = sample_start();
        for (i, &elevation) in elevations.iter().enumerate() {
            comm.comm_data.insert(
                start + Duration::seconds(i as i64),
                synthetic_sample(elevation, 120.0 + i as f64),
            );
        }
        comm
    }

    #[test]
    fn detects_one_session_with_bounds_and_peak() {
        let mut comm = comm_with_elevations(&[-1.0, -0.5, 0.5, 5.0, 10.0, 8.0, 3.0, -1.0]);
        comm.define_sessions(&samara());

        assert_eq!(comm.sessions.len(), 1);
        let start = sample_start() + Duration::seconds(2);
        let session = &comm.sessions[&start];
        assert_eq!(session.start_session_dt, start);
        assert_eq!(session.end_session_dt, sample_start() + Duration::seconds(6));
        assert_eq!(session.max_session_dt, sample_start() + Duration::seconds(4));
        assert_eq!(session.max_elevation, 10.0);
        assert_eq!(session.end_elevation, 3.0);
        assert!(!session.zero_crossing_azimuth_flag);
    }

    #[test]
    fn open_session_is_closed_at_the_final_sample() {
        let mut comm = comm_with_elevations(&[-1.0, 2.0, 4.0, 6.0]);
        comm.define_sessions(&samara());

        assert_eq!(comm.sessions.len(), 1);
        let session = comm.sessions.values().next().unwrap();
        assert_eq!(session.end_session_dt, sample_start() + Duration::seconds(3));
        assert_eq!(session.max_elevation, 6.0);
    }

    #[test]
    fn no_sessions_below_the_horizon() {
        let mut comm = comm_with_elevations(&[-5.0, -3.0, -1.0]);
        comm.define_sessions(&samara());
        assert!(comm.sessions.is_empty());
    }

    #[test]
    fn flags_azimuth_track_crossing_north() {
        let mut comm = Comm::new("Samara", 24793);
        let start = sample_start();
        for (i, azimuth) in [350.0, 355.0, 359.0, 1.0, 5.0].into_iter().enumerate() {
            comm.comm_data.insert(
                start + Duration::seconds(i as i64),
                synthetic_sample(10.0, azimuth),
            );
        }
        comm.define_sessions(&samara());
        assert!(comm.sessions.values().next().unwrap().zero_crossing_azimuth_flag);
    }

    #[test]
    fn doppler_shifts_split_around_the_nominal_frequency() {
        let dir = tempfile::tempdir().unwrap();
        let satellite = test_satellite(dir.path());
        let station = StationPosition {
            x: 6_378_136.0,
            y: 0.0,
            z: 0.0,
            lam: 0.0,
            phi: 0.0,
            alt: 0.0,
        };

        // Receding radially by 1 km over one second.
        let prev = SatPosition {
            x: 7_378_136.0,
            y: 0.0,
            z: 0.0,
        };
        let current = SatPosition {
            x: 7_379_136.0,
            y: 0.0,
            z: 0.0,
        };

        let (uplink, downlink) = Comm::doppler_links(&prev, &current, &satellite, &station);
        let uplink = uplink.unwrap();
        let downlink = downlink.unwrap();

        assert!((uplink - 437_400_059.0).abs() < 2.0, "uplink = {uplink}");
        assert!((downlink - 437_397_141.0).abs() < 2.0, "downlink = {downlink}");
        assert!(uplink > 437_398_600.0);
        assert!(downlink < 437_398_600.0);
    }

    #[test]
    fn computed_samples_cover_the_whole_prediction() {
        let dir = tempfile::tempdir().unwrap();
        let mut satellite = test_satellite(dir.path());
        satellite.predict_cm(sample_start(), 600.0, 1.0).unwrap();

        let station = samara();
        let mut comm = Comm::new("Samara", 24793);
        comm.compute_over_prediction(&satellite, &station);

        assert_eq!(comm.comm_data.len(), 600);
        let first = comm.comm_data.values().next().unwrap();
        assert!(first.uplink.is_none() && first.downlink.is_none());
        assert!(comm
            .comm_data
            .values()
            .skip(1)
            .all(|s| s.uplink.is_some() && s.downlink.is_some()));

        // Visibility at zero minimum elevation implies a positive elevation.
        for sample in comm.comm_data.values() {
            if sample.visibility {
                assert!(sample.elevation >= -1e-6, "elevation = {}", sample.elevation);
            }
            assert!((0.0..360.0).contains(&sample.azimuth));
        }
    }

    #[test]
    fn recompute_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let mut satellite = test_satellite(dir.path());
        satellite.predict_cm(sample_start(), 120.0, 1.0).unwrap();

        let station = samara();
        let mut comm = Comm::new("Samara", 24793);
        comm.compute_over_prediction(&satellite, &station);
        let first_run = comm.comm_data.clone();

        satellite.predict_cm(sample_start(), 120.0, 1.0).unwrap();
        comm.compute_over_prediction(&satellite, &station);
        assert_eq!(comm.comm_data, first_run);
    }

    #[test]
    fn recalculation_rewrites_only_later_samples() {
        let dir = tempfile::tempdir().unwrap();
        let mut satellite = test_satellite(dir.path());
        satellite.predict_cm(sample_start(), 120.0, 1.0).unwrap();

        let station = samara();
        let mut comm = Comm::new("Samara", 24793);
        comm.compute_over_prediction(&satellite, &station);
        let before = comm.comm_data.clone();

        satellite.uplink_freq = Some(145_800_000.0);
        satellite.downlink_freq = Some(145_800_000.0);
        let pivot = sample_start() + Duration::seconds(60);
        comm.recalculate_links_from(pivot, &satellite, &station);

        for (instant, sample) in &comm.comm_data {
            let old = &before[instant];
            if *instant <= pivot {
                assert_eq!(sample.uplink, old.uplink, "sample {instant} must keep its links");
            } else {
                assert!(sample.uplink.unwrap() < 437_000_000.0);
                assert!(sample.downlink.unwrap() < 437_000_000.0);
            }
            assert_eq!(sample.azimuth, old.azimuth);
            assert_eq!(sample.elevation, old.elevation);
            assert_eq!(sample.visibility, old.visibility);
        }
    }
}
