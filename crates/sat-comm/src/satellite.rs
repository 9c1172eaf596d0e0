//! Satellite record: frequencies, TLE lifecycle and center-of-mass
//! prediction.

use chrono::{Duration, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use orbit_dynamics::{frames, ZonalGravity};

use crate::providers::{Sgp4Provider, TleSource};
use crate::tle::TleRecord;
use crate::{CommError, Result};

/// Satellite center-of-mass position in ECEF, meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SatPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// A satellite tracked for one ground station.
pub struct Satellite {
    pub norad_id: u32,
    /// Nominal command frequency, Hz.
    pub uplink_freq: Option<f64>,
    /// Nominal telemetry frequency, Hz.
    pub downlink_freq: Option<f64>,
    tle: Option<TleRecord>,
    trajectory: BTreeMap<NaiveDateTime, SatPosition>,
    cache_dir: PathBuf,
    cache_path: Option<PathBuf>,
    sgp4: Arc<dyn Sgp4Provider>,
}

impl Satellite {
    pub fn new(
        norad_id: u32,
        uplink_freq: Option<f64>,
        downlink_freq: Option<f64>,
        cache_dir: PathBuf,
        sgp4: Arc<dyn Sgp4Provider>,
    ) -> Self {
        Self {
            norad_id,
            uplink_freq,
            downlink_freq,
            tle: None,
            trajectory: BTreeMap::new(),
            cache_dir,
            cache_path: None,
            sgp4,
        }
    }

    pub fn tle(&self) -> Option<&TleRecord> {
        self.tle.as_ref()
    }

    pub fn trajectory(&self) -> &BTreeMap<NaiveDateTime, SatPosition> {
        &self.trajectory
    }

    pub fn position_at(&self, at: NaiveDateTime) -> Option<&SatPosition> {
        self.trajectory.get(&at)
    }

    /// Adopt a validated record: persist it to the cache and keep it as the
    /// active element set.
    fn install(&mut self, record: TleRecord) -> Result<()> {
        let path = record.save_to(&self.cache_dir)?;
        self.cache_path = Some(path);
        self.tle = Some(record);
        Ok(())
    }

    pub fn setup_tle_from_lines(&mut self, line1: &str, line2: &str) -> Result<()> {
        self.install(TleRecord::from_lines(line1, line2)?)
    }

    pub fn setup_tle_from_str(&mut self, text: &str) -> Result<()> {
        self.install(TleRecord::from_text(text)?)
    }

    pub fn setup_tle_from_file(&mut self, path: &Path) -> Result<()> {
        self.install(TleRecord::from_file(path)?)
    }

    pub fn setup_tle_from_source(&mut self, source: &dyn TleSource) -> Result<()> {
        let (line1, line2) = source.fetch_latest(self.norad_id)?;
        self.install(TleRecord::from_lines(&line1, &line2)?)
    }

    /// Replace the cached element set with the source's freshest one. The
    /// fetch and validation happen before anything is touched, so a failure
    /// leaves both the file and the in-memory record as they were.
    pub fn update_tle_from_source(&mut self, source: &dyn TleSource) -> Result<()> {
        let (line1, line2) = source.fetch_latest(self.norad_id)?;
        let record = TleRecord::from_lines(&line1, &line2)?;

        let superseded = self.cache_path.clone();
        self.install(record)?;

        if let Some(old) = superseded {
            if self.cache_path.as_ref() != Some(&old) {
                if let Err(e) = fs::remove_file(&old) {
                    warn!("superseded TLE file {} was not removed: {e}", old.display());
                }
            }
        }
        Ok(())
    }

    /// Predict the center-of-mass ECEF trajectory from `start` over
    /// `horizon_sec` with `step_sec` spacing.
    ///
    /// The sidereal angle is evaluated once at `start`; each sample advances
    /// the seconds-of-day term instead. Samples are keyed by instant;
    /// `floor(horizon/step)` of them are produced, the start included.
    pub fn predict_cm(
        &mut self,
        start: NaiveDateTime,
        horizon_sec: f64,
        step_sec: f64,
    ) -> Result<()> {
        let tle = self.tle.as_ref().ok_or(CommError::NoTle)?;

        let start = start.with_nanosecond(0).unwrap_or(start);
        let gmst = frames::gmst(start);
        let mut seconds_of_day = frames::seconds_of_day(start);

        let initial = self.sgp4.state_at(tle, start)?;
        let samples = (horizon_sec / step_sec) as usize;
        let states = ZonalGravity::EARTH.propagate(initial, step_sec, samples);

        let step = Duration::nanoseconds((step_sec * 1e9).round() as i64);
        let mut trajectory = BTreeMap::new();
        let mut current = start;
        for (index, state) in states.iter().enumerate() {
            if index > 0 {
                seconds_of_day += step_sec;
                current += step;
            }
            let [x, y, z] = frames::eci_to_ecef(state.position, gmst, seconds_of_day);
            trajectory.insert(current, SatPosition { x, y, z });
        }

        self.trajectory = trajectory;
        info!(
            "center-of-mass prediction for NORAD ID {} from {start} over {horizon_sec} s with {step_sec} s step completed",
            self.norad_id
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use orbit_dynamics::{EciState, EARTH_MU};

    pub(crate) const LINE1: &str =
        "1 24793U 97020B   24032.50148130  .00000467  00000-0  15686-3 0  9992";
    pub(crate) const LINE2: &str =
        "2 24793  86.3955  27.0408 0002108  82.9242 277.2194 14.35058745399928";

    /// Hands out a circular 780 km orbit state regardless of the TLE.
    pub(crate) struct FixedOrbitProvider;

    impl Sgp4Provider for FixedOrbitProvider {
        fn state_at(&self, _tle: &TleRecord, _at: NaiveDateTime) -> Result<EciState> {
            let radius = 7_158_136.0;
            Ok(EciState {
                position: [radius, 0.0, 0.0],
                velocity: [0.0, 0.0, (EARTH_MU / radius).sqrt()],
            })
        }
    }

    pub(crate) fn test_satellite(dir: &Path) -> Satellite {
        let mut satellite = Satellite::new(
            24793,
            Some(437_398_600.0),
            Some(437_398_600.0),
            dir.to_path_buf(),
            Arc::new(FixedOrbitProvider),
        );
        satellite.setup_tle_from_lines(LINE1, LINE2).unwrap();
        satellite
    }

    #[test]
    fn predict_without_tle_fails() {
        let mut satellite = Satellite::new(
            24793,
            None,
            None,
            PathBuf::from("tle"),
            Arc::new(FixedOrbitProvider),
        );
        let err = satellite.predict_cm(sample_start(), 60.0, 1.0).unwrap_err();
        assert!(matches!(err, CommError::NoTle));
    }

    #[test]
    fn predict_produces_evenly_spaced_samples() {
        let dir = tempfile::tempdir().unwrap();
        let mut satellite = test_satellite(dir.path());
        satellite.predict_cm(sample_start(), 600.0, 1.0).unwrap();

        let trajectory = satellite.trajectory();
        assert_eq!(trajectory.len(), 600);

        let mut expected = sample_start();
        for instant in trajectory.keys() {
            assert_eq!(*instant, expected);
            expected += Duration::seconds(1);
        }
    }

    #[test]
    fn predict_truncates_start_to_whole_seconds() {
        let dir = tempfile::tempdir().unwrap();
        let mut satellite = test_satellite(dir.path());
        let ragged = sample_start().with_nanosecond(250_000_000).unwrap();
        satellite.predict_cm(ragged, 10.0, 1.0).unwrap();
        assert!(satellite.position_at(sample_start()).is_some());
    }

    #[test]
    fn setup_writes_cache_file() {
        let dir = tempfile::tempdir().unwrap();
        let satellite = test_satellite(dir.path());
        assert!(dir.path().join("24793_2024-02-01.tle").exists());
        assert_eq!(satellite.tle().unwrap().norad_id, 24793);
    }

    #[test]
    fn update_replaces_superseded_cache_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut satellite = test_satellite(dir.path());

        // Same satellite, one epoch day later (day 033, checksum-compatible
        // because the validation regex does not check the checksum digit).
        struct NewerEpoch;
        impl TleSource for NewerEpoch {
            fn fetch_latest(&self, _norad_id: u32) -> Result<(String, String)> {
                Ok((LINE1.replace("24032.50148130", "24033.50148130"), LINE2.to_string()))
            }
        }

        satellite.update_tle_from_source(&NewerEpoch).unwrap();
        assert!(dir.path().join("24793_2024-02-02.tle").exists());
        assert!(!dir.path().join("24793_2024-02-01.tle").exists());
    }

    #[test]
    fn failed_update_keeps_previous_tle() {
        let dir = tempfile::tempdir().unwrap();
        let mut satellite = test_satellite(dir.path());

        struct EmptyFeed;
        impl TleSource for EmptyFeed {
            fn fetch_latest(&self, norad_id: u32) -> Result<(String, String)> {
                Err(CommError::TleData(format!(
                    "downloaded TLE for NORAD ID {norad_id} has no data"
                )))
            }
        }

        assert!(satellite.update_tle_from_source(&EmptyFeed).is_err());
        assert!(satellite.tle().is_some());
        assert!(dir.path().join("24793_2024-02-01.tle").exists());
    }

    pub(crate) fn sample_start() -> NaiveDateTime {
        "2024-02-01T12:00:00".parse().unwrap()
    }
}
