//! Topocentric Sun position.
//!
//! Low-precision ephemeris after Schlyter's "Computing planetary positions"
//! (stjarnhimlen.se): mean orbital elements, equation-of-center via the
//! eccentric anomaly, rotation to equatorial, then hour angle and a
//! horizontal-frame rotation at the observer. Accuracy is a few arc minutes,
//! plenty for judging whether a pass happens in daylight.

use chrono::{Datelike, NaiveDateTime, Timelike};
use std::f64::consts::PI;

/// Sun elevation and azimuth in degrees as seen from an observer at
/// longitude/latitude given in radians. Azimuth is measured from North,
/// clockwise, in [0, 360).
pub fn sun_angles(at: NaiveDateTime, lon_rad: f64, lat_rad: f64) -> (f64, f64) {
    let year = at.year() as i64;
    let month = at.month() as i64;
    let day = at.day() as i64;

    // Day number relative to 2000 Jan 0.0.
    let d = (367 * year - 7 * (year + (month + 9) / 12) / 4 + (275 * month) / 9 + day - 730530)
        as f64;

    // Mean elements of the Sun's apparent orbit.
    let w = 282.9404 + 4.70935e-5 * d;
    let e = 0.016709 - 1.151e-9 * d;
    let mean_anomaly = (356.0470 + 0.9856002585 * d).rem_euclid(360.0);
    let oblecl = (23.4393 - 3.563e-7 * d).rem_euclid(360.0);
    let mean_longitude = (w + mean_anomaly).rem_euclid(360.0);

    // One iteration of Kepler's equation is enough at solar eccentricity.
    let ecc_anomaly = mean_anomaly
        + (180.0 / PI)
            * e
            * mean_anomaly.to_radians().sin()
            * (1.0 + e * mean_anomaly.to_radians().cos());

    // Position in the orbital plane, X towards perihelion.
    let xv = ecc_anomaly.to_radians().cos() - e;
    let yv = ecc_anomaly.to_radians().sin() * (1.0 - e * e).sqrt();
    let r = (xv * xv + yv * yv).sqrt();
    let true_anomaly = yv.atan2(xv).to_degrees();

    // Ecliptic rectangular, then rotate by the obliquity to equatorial.
    let sun_longitude = (true_anomaly + w).rem_euclid(360.0);
    let xs = r * sun_longitude.to_radians().cos();
    let ys = r * sun_longitude.to_radians().sin();

    let xe = xs;
    let ye = ys * oblecl.to_radians().cos();
    let ze = ys * oblecl.to_radians().sin();

    let ra = ye.atan2(xe).to_degrees();
    let decl = ze.atan2((xe * xe + ye * ye).sqrt());

    // Hour angle from the local sidereal time.
    let gmst0 = (mean_longitude + 180.0) / 15.0;
    let ut = at.hour() as f64 + at.minute() as f64 / 60.0 + at.second() as f64 / 3600.0;
    let sidtime = gmst0 + ut + lon_rad.to_degrees() / 15.0;
    let hour_angle = (sidtime * 15.0 - ra).to_radians();

    // Equatorial rectangular at the observer, then tilt to the horizon.
    let x = hour_angle.cos() * decl.cos();
    let y = hour_angle.sin() * decl.cos();
    let z = decl.sin();

    let xhor = x * lat_rad.sin() - z * lat_rad.cos();
    let yhor = y;
    let zhor = x * lat_rad.cos() + z * lat_rad.sin();

    let azimuth = (yhor.atan2(xhor) + PI).to_degrees().rem_euclid(360.0);
    let elevation = zhor.asin().to_degrees();

    (elevation, azimuth)
}
