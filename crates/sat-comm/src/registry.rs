//! Process-wide directory of ground stations, their satellites and the
//! communication records binding the two.
//!
//! Three two-level maps keyed by station name own every record; a `Comm`
//! only carries back-references. All mutating operations check their
//! prerequisites and fail with `SetupMissing` before touching anything.

use chrono::{Duration, NaiveDateTime, Timelike, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::comm::{Comm, CommSample, Session};
use crate::providers::{Sgp4Provider, TleSource};
use crate::satellite::Satellite;
use crate::station::Station;
use crate::{CommError, Result};

pub const DEFAULT_HORIZON_SEC: f64 = 86_400.0;
pub const DEFAULT_STEP_SEC: f64 = 1.0;

/// Registry-wide settings, passed in explicitly.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Directory for cached TLE files.
    pub tle_dir: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            tle_dir: PathBuf::from("tle"),
        }
    }
}

pub struct Registry {
    stations: HashMap<String, Station>,
    satellites: HashMap<String, HashMap<u32, Satellite>>,
    comms: HashMap<String, HashMap<u32, Comm>>,
    config: RegistryConfig,
    sgp4: Arc<dyn Sgp4Provider>,
    tle_source: Arc<dyn TleSource>,
}

fn missing_station(station_name: &str) -> CommError {
    CommError::SetupMissing(format!(
        "ground station '{station_name}' has no setup in the registry"
    ))
}

fn missing_satellite(station_name: &str, norad_id: u32) -> CommError {
    CommError::SetupMissing(format!(
        "satellite with NORAD ID {norad_id} has no setup for ground station '{station_name}'"
    ))
}

fn missing_comm(station_name: &str, norad_id: u32) -> CommError {
    CommError::SetupMissing(format!(
        "no communication between satellite with NORAD ID {norad_id} and ground station \
         '{station_name}'"
    ))
}

fn now_whole_seconds() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    now.with_nanosecond(0).unwrap_or(now)
}

fn truncate(at: NaiveDateTime) -> NaiveDateTime {
    at.with_nanosecond(0).unwrap_or(at)
}

impl Registry {
    pub fn new(
        config: RegistryConfig,
        sgp4: Arc<dyn Sgp4Provider>,
        tle_source: Arc<dyn TleSource>,
    ) -> Self {
        Self {
            stations: HashMap::new(),
            satellites: HashMap::new(),
            comms: HashMap::new(),
            config,
            sgp4,
            tle_source,
        }
    }

    // ---- setup ----

    /// Register a ground station. Re-registering a name resets its
    /// satellites and communications.
    pub fn setup_ground_station(
        &mut self,
        longitude_deg: f64,
        latitude_deg: f64,
        altitude_m: f64,
        min_elevation_deg: f64,
        station_name: &str,
    ) -> Result<()> {
        let station = Station::new(
            station_name,
            longitude_deg,
            latitude_deg,
            altitude_m,
            min_elevation_deg,
        )?;
        self.stations.insert(station_name.to_string(), station);
        self.satellites.insert(station_name.to_string(), HashMap::new());
        self.comms.insert(station_name.to_string(), HashMap::new());
        Ok(())
    }

    pub fn setup_satellite(
        &mut self,
        station_name: &str,
        norad_id: u32,
        uplink: Option<f64>,
        downlink: Option<f64>,
    ) -> Result<()> {
        if !(1..=99_999).contains(&norad_id) {
            return Err(CommError::NoradIdRange(norad_id));
        }
        let satellites = self
            .satellites
            .get_mut(station_name)
            .ok_or_else(|| missing_station(station_name))?;
        satellites.insert(
            norad_id,
            Satellite::new(
                norad_id,
                uplink,
                downlink,
                self.config.tle_dir.clone(),
                Arc::clone(&self.sgp4),
            ),
        );
        info!(
            "satellite with NORAD ID {norad_id} registered for ground station '{station_name}'"
        );
        Ok(())
    }

    pub fn setup_comm(&mut self, station_name: &str, norad_id: u32) -> Result<()> {
        self.satellite_ref(station_name, norad_id)?;
        let comms = self
            .comms
            .get_mut(station_name)
            .ok_or_else(|| missing_station(station_name))?;
        comms.insert(norad_id, Comm::new(station_name, norad_id));
        Ok(())
    }

    /// Change the nominal link frequencies and refresh every predicted
    /// sample from one second ago onward; earlier samples keep the old
    /// frequencies.
    pub fn setup_new_frequencies(
        &mut self,
        station_name: &str,
        norad_id: u32,
        uplink: f64,
        downlink: f64,
    ) -> Result<()> {
        let station = self
            .stations
            .get(station_name)
            .ok_or_else(|| missing_station(station_name))?;
        let satellite = self
            .satellites
            .get_mut(station_name)
            .and_then(|m| m.get_mut(&norad_id))
            .ok_or_else(|| missing_satellite(station_name, norad_id))?;

        satellite.uplink_freq = Some(uplink);
        satellite.downlink_freq = Some(downlink);
        info!(
            "uplink and downlink frequencies for satellite with NORAD ID {norad_id} at \
             '{station_name}' set to {uplink} Hz and {downlink} Hz"
        );

        match self
            .comms
            .get_mut(station_name)
            .and_then(|m| m.get_mut(&norad_id))
        {
            Some(comm) => {
                comm.recalculate_links_from(
                    now_whole_seconds() - Duration::seconds(1),
                    satellite,
                    station,
                );
            }
            None => warn!(
                "no communication registered for NORAD ID {norad_id} at '{station_name}', \
                 nothing to recalculate"
            ),
        }
        Ok(())
    }

    // ---- TLE management ----

    pub fn setup_new_tle_by_str(
        &mut self,
        station_name: &str,
        norad_id: u32,
        tle_str: &str,
    ) -> Result<()> {
        self.satellite_mut(station_name, norad_id)?
            .setup_tle_from_str(tle_str)
    }

    pub fn setup_new_tle_by_file(
        &mut self,
        station_name: &str,
        norad_id: u32,
        tle_file_name: &str,
        default_folder: bool,
    ) -> Result<()> {
        let path = if default_folder {
            self.config.tle_dir.join(tle_file_name)
        } else {
            PathBuf::from(tle_file_name)
        };
        self.satellite_mut(station_name, norad_id)?
            .setup_tle_from_file(&path)
    }

    pub fn setup_new_tle_by_source(&mut self, station_name: &str, norad_id: u32) -> Result<()> {
        let source = Arc::clone(&self.tle_source);
        self.satellite_mut(station_name, norad_id)?
            .setup_tle_from_source(source.as_ref())
    }

    /// Batch-refresh TLEs for the listed satellites of one station. IDs
    /// without a setup are skipped with a warning.
    pub fn update_tles_by_source(&mut self, station_name: &str, norad_ids: &[u32]) -> Result<()> {
        let source = Arc::clone(&self.tle_source);
        let satellites = self
            .satellites
            .get_mut(station_name)
            .ok_or_else(|| missing_station(station_name))?;

        for norad_id in norad_ids {
            match satellites.get_mut(norad_id) {
                Some(satellite) => {
                    info!(
                        "updating TLE for satellite with NORAD ID {norad_id} at '{station_name}'"
                    );
                    satellite.update_tle_from_source(source.as_ref())?;
                }
                None => warn!(
                    "satellite with NORAD ID {norad_id} has no setup for '{station_name}', TLE \
                     update skipped"
                ),
            }
        }
        Ok(())
    }

    // ---- prediction ----

    /// Predict the satellite trajectory and rebuild the communication data.
    /// `start` defaults to the current UTC instant, truncated to the whole
    /// second.
    pub fn predict_comm(
        &mut self,
        station_name: &str,
        norad_id: u32,
        start: Option<NaiveDateTime>,
        horizon_sec: f64,
        step_sec: f64,
    ) -> Result<()> {
        let start = truncate(start.unwrap_or_else(now_whole_seconds));

        let station = self
            .stations
            .get(station_name)
            .ok_or_else(|| missing_station(station_name))?;
        let satellite = self
            .satellites
            .get_mut(station_name)
            .and_then(|m| m.get_mut(&norad_id))
            .ok_or_else(|| missing_satellite(station_name, norad_id))?;
        let comm = self
            .comms
            .get_mut(station_name)
            .and_then(|m| m.get_mut(&norad_id))
            .ok_or_else(|| missing_comm(station_name, norad_id))?;

        satellite.predict_cm(start, horizon_sec, step_sec)?;
        comm.compute_over_prediction(satellite, station);

        info!(
            "communication prediction for NORAD ID {norad_id} with '{station_name}' from {start} \
             over {horizon_sec} s with {step_sec} s step completed"
        );
        Ok(())
    }

    // ---- queries ----

    /// Azimuth and elevation at an instant (default: now). Instants outside
    /// the predicted horizon echo back with empty fields.
    pub fn get_azimuth_elevation(
        &self,
        station_name: &str,
        norad_id: u32,
        at: Option<NaiveDateTime>,
    ) -> Result<(NaiveDateTime, Option<f64>, Option<f64>)> {
        let (at, sample) = self.sample_at(station_name, norad_id, at)?;
        Ok(match sample {
            Some(sample) => (at, Some(sample.azimuth), Some(sample.elevation)),
            None => (at, None, None),
        })
    }

    /// Doppler-corrected link frequencies at an instant (default: now).
    pub fn get_frequencies(
        &self,
        station_name: &str,
        norad_id: u32,
        at: Option<NaiveDateTime>,
    ) -> Result<(NaiveDateTime, Option<f64>, Option<f64>)> {
        let (at, sample) = self.sample_at(station_name, norad_id, at)?;
        Ok(match sample {
            Some(sample) => (at, sample.uplink, sample.downlink),
            None => (at, None, None),
        })
    }

    /// Angles and frequencies in one lookup.
    #[allow(clippy::type_complexity)]
    pub fn get_data(
        &self,
        station_name: &str,
        norad_id: u32,
        at: Option<NaiveDateTime>,
    ) -> Result<(
        NaiveDateTime,
        Option<f64>,
        Option<f64>,
        Option<f64>,
        Option<f64>,
    )> {
        let (at, sample) = self.sample_at(station_name, norad_id, at)?;
        Ok(match sample {
            Some(sample) => (
                at,
                Some(sample.azimuth),
                Some(sample.elevation),
                sample.uplink,
                sample.downlink,
            ),
            None => (at, None, None, None, None),
        })
    }

    /// Session parameters over the predicted period. Missing prediction
    /// data is computed on the spot with the default horizon and step.
    pub fn get_comm_sessions_params(
        &mut self,
        station_name: &str,
        norad_id: u32,
    ) -> Result<&BTreeMap<NaiveDateTime, Session>> {
        let station = self
            .stations
            .get(station_name)
            .ok_or_else(|| missing_station(station_name))?;
        let satellite = self
            .satellites
            .get_mut(station_name)
            .and_then(|m| m.get_mut(&norad_id))
            .ok_or_else(|| missing_satellite(station_name, norad_id))?;
        let comm = self
            .comms
            .get_mut(station_name)
            .and_then(|m| m.get_mut(&norad_id))
            .ok_or_else(|| missing_comm(station_name, norad_id))?;

        if comm.comm_data.is_empty() {
            warn!(
                "communication for NORAD ID {norad_id} at '{station_name}' has no computed data, \
                 computing with defaults"
            );
            if satellite.trajectory().is_empty() {
                warn!(
                    "satellite with NORAD ID {norad_id} has no predicted positions, predicting \
                     with defaults"
                );
                satellite.predict_cm(now_whole_seconds(), DEFAULT_HORIZON_SEC, DEFAULT_STEP_SEC)?;
            }
            comm.compute_over_prediction(satellite, station);
        }

        comm.define_sessions(station);
        info!(
            "total {} communication sessions defined for NORAD ID {norad_id} with \
             '{station_name}' over the predicted period",
            comm.sessions.len()
        );
        Ok(&comm.sessions)
    }

    /// The full per-instant communication data of one record.
    pub fn get_all_data(
        &self,
        station_name: &str,
        norad_id: u32,
    ) -> Result<&BTreeMap<NaiveDateTime, CommSample>> {
        Ok(&self.comm_ref(station_name, norad_id)?.comm_data)
    }

    pub fn stations(&self) -> &HashMap<String, Station> {
        &self.stations
    }

    pub fn station_satellites(&self, station_name: &str) -> Result<&HashMap<u32, Satellite>> {
        self.satellites
            .get(station_name)
            .ok_or_else(|| missing_station(station_name))
    }

    /// Drop every satellite and communication of a station; the station
    /// itself stays registered.
    pub fn clear_ground_station_data(&mut self, station_name: &str) -> Result<()> {
        let satellites = self
            .satellites
            .get_mut(station_name)
            .ok_or_else(|| missing_station(station_name))?;
        satellites.clear();
        if let Some(comms) = self.comms.get_mut(station_name) {
            comms.clear();
        }
        info!("satellite and communication data for '{station_name}' cleared");
        Ok(())
    }

    // ---- internals ----

    fn satellite_ref(&self, station_name: &str, norad_id: u32) -> Result<&Satellite> {
        if !self.stations.contains_key(station_name) {
            return Err(missing_station(station_name));
        }
        self.satellites
            .get(station_name)
            .and_then(|m| m.get(&norad_id))
            .ok_or_else(|| missing_satellite(station_name, norad_id))
    }

    fn satellite_mut(&mut self, station_name: &str, norad_id: u32) -> Result<&mut Satellite> {
        if !self.stations.contains_key(station_name) {
            return Err(missing_station(station_name));
        }
        self.satellites
            .get_mut(station_name)
            .and_then(|m| m.get_mut(&norad_id))
            .ok_or_else(|| missing_satellite(station_name, norad_id))
    }

    fn comm_ref(&self, station_name: &str, norad_id: u32) -> Result<&Comm> {
        self.satellite_ref(station_name, norad_id)?;
        self.comms
            .get(station_name)
            .and_then(|m| m.get(&norad_id))
            .ok_or_else(|| missing_comm(station_name, norad_id))
    }

    /// Shared lookup for the instant queries: resolves the comm record,
    /// warns when no prediction exists, and returns the sample at the
    /// truncated instant if the horizon covers it.
    fn sample_at(
        &self,
        station_name: &str,
        norad_id: u32,
        at: Option<NaiveDateTime>,
    ) -> Result<(NaiveDateTime, Option<&CommSample>)> {
        let comm = self.comm_ref(station_name, norad_id)?;
        if comm.comm_data.is_empty() {
            warn!(
                "no predicted data for communication between satellite with NORAD ID {norad_id} \
                 and ground station '{station_name}'"
            );
        }

        let at = truncate(at.unwrap_or_else(now_whole_seconds));
        let sample = comm.comm_data.get(&at);
        if sample.is_none() {
            warn!(
                "communication between satellite with NORAD ID {norad_id} and ground station \
                 '{station_name}' has no prediction at {at}"
            );
        }
        Ok((at, sample))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::satellite::tests::{sample_start, FixedOrbitProvider, LINE1, LINE2};

    struct StaticTle;
    impl TleSource for StaticTle {
        fn fetch_latest(&self, _norad_id: u32) -> Result<(String, String)> {
            Ok((LINE1.to_string(), LINE2.to_string()))
        }
    }

    fn test_registry() -> (Registry, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::new(
            RegistryConfig {
                tle_dir: dir.path().to_path_buf(),
            },
            Arc::new(FixedOrbitProvider),
            Arc::new(StaticTle),
        );
        (registry, dir)
    }

    fn full_setup(registry: &mut Registry) {
        registry
            .setup_ground_station(50.17763, 53.21204, 137.0, 0.0, "Samara")
            .unwrap();
        registry
            .setup_satellite("Samara", 57173, Some(437_398_600.0), Some(437_398_600.0))
            .unwrap();
        registry.setup_comm("Samara", 57173).unwrap();
    }

    #[test]
    fn setup_chain_requires_each_level() {
        let (mut registry, _dir) = test_registry();

        let err = registry
            .setup_satellite("Samara", 57173, None, None)
            .unwrap_err();
        assert!(matches!(err, CommError::SetupMissing(_)));

        registry
            .setup_ground_station(50.17763, 53.21204, 137.0, 0.0, "Samara")
            .unwrap();
        let err = registry.setup_comm("Samara", 57173).unwrap_err();
        assert!(matches!(err, CommError::SetupMissing(_)));

        registry
            .setup_satellite("Samara", 57173, None, None)
            .unwrap();
        registry.setup_comm("Samara", 57173).unwrap();
    }

    #[test]
    fn rejects_out_of_catalog_norad_id() {
        let (mut registry, _dir) = test_registry();
        registry
            .setup_ground_station(50.17763, 53.21204, 137.0, 0.0, "Samara")
            .unwrap();
        assert!(matches!(
            registry.setup_satellite("Samara", 100_000, None, None),
            Err(CommError::NoradIdRange(100_000))
        ));
    }

    #[test]
    fn query_without_prediction_returns_empty_fields() {
        let (mut registry, _dir) = test_registry();
        full_setup(&mut registry);

        let (_, azimuth, elevation) = registry
            .get_azimuth_elevation("Samara", 57173, None)
            .unwrap();
        assert_eq!(azimuth, None);
        assert_eq!(elevation, None);
    }

    #[test]
    fn predict_then_query_inside_and_outside_the_horizon() {
        let (mut registry, _dir) = test_registry();
        full_setup(&mut registry);
        registry
            .setup_new_tle_by_str("Samara", 57173, &format!("{LINE1}\n{LINE2}"))
            .unwrap();
        registry
            .predict_comm("Samara", 57173, Some(sample_start()), 300.0, 1.0)
            .unwrap();

        let inside = sample_start() + Duration::seconds(100);
        let (at, azimuth, elevation) = registry
            .get_azimuth_elevation("Samara", 57173, Some(inside))
            .unwrap();
        assert_eq!(at, inside);
        assert!(azimuth.is_some() && elevation.is_some());

        let outside = sample_start() + Duration::seconds(301);
        let (at, azimuth, _) = registry
            .get_azimuth_elevation("Samara", 57173, Some(outside))
            .unwrap();
        assert_eq!(at, outside);
        assert_eq!(azimuth, None);

        let (_, uplink, downlink) = registry
            .get_frequencies("Samara", 57173, Some(inside))
            .unwrap();
        assert!(uplink.is_some() && downlink.is_some());

        let all = registry.get_all_data("Samara", 57173).unwrap();
        assert_eq!(all.len(), 300);
    }

    #[test]
    fn predict_without_tle_reports_the_error() {
        let (mut registry, _dir) = test_registry();
        full_setup(&mut registry);
        let err = registry
            .predict_comm("Samara", 57173, Some(sample_start()), 60.0, 1.0)
            .unwrap_err();
        assert!(matches!(err, CommError::NoTle));
    }

    #[test]
    fn new_frequencies_update_the_satellite() {
        let (mut registry, _dir) = test_registry();
        full_setup(&mut registry);
        registry
            .setup_new_frequencies("Samara", 57173, 145_800_000.0, 435_000_000.0)
            .unwrap();

        let satellites = registry.station_satellites("Samara").unwrap();
        let satellite = &satellites[&57173];
        assert_eq!(satellite.uplink_freq, Some(145_800_000.0));
        assert_eq!(satellite.downlink_freq, Some(435_000_000.0));
    }

    #[test]
    fn tle_by_source_installs_the_fetched_record() {
        let (mut registry, dir) = test_registry();
        full_setup(&mut registry);
        registry.setup_new_tle_by_source("Samara", 57173).unwrap();

        let satellites = registry.station_satellites("Samara").unwrap();
        assert!(satellites[&57173].tle().is_some());
        assert!(dir.path().join("24793_2024-02-01.tle").exists());
    }

    #[test]
    fn batch_update_skips_unregistered_ids() {
        let (mut registry, _dir) = test_registry();
        full_setup(&mut registry);
        registry.setup_new_tle_by_source("Samara", 57173).unwrap();
        // 11111 has no setup; the batch must still refresh 57173 and succeed.
        registry
            .update_tles_by_source("Samara", &[57173, 11111])
            .unwrap();
    }

    #[test]
    fn sessions_computed_implicitly_from_a_prediction() {
        let (mut registry, _dir) = test_registry();
        full_setup(&mut registry);
        registry
            .setup_new_tle_by_str("Samara", 57173, &format!("{LINE1}\n{LINE2}"))
            .unwrap();
        registry
            .predict_comm("Samara", 57173, Some(sample_start()), 600.0, 1.0)
            .unwrap();

        let sessions = registry.get_comm_sessions_params("Samara", 57173).unwrap();
        for session in sessions.values() {
            assert!(session.start_session_dt <= session.max_session_dt);
            assert!(session.max_session_dt <= session.end_session_dt);
        }
    }

    #[test]
    fn clear_keeps_the_station_but_drops_its_records() {
        let (mut registry, _dir) = test_registry();
        full_setup(&mut registry);
        registry.clear_ground_station_data("Samara").unwrap();

        assert!(registry.stations().contains_key("Samara"));
        assert!(registry.station_satellites("Samara").unwrap().is_empty());
        let err = registry.get_all_data("Samara", 57173).unwrap_err();
        assert!(matches!(err, CommError::SetupMissing(_)));
    }
}
