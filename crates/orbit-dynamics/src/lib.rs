//! Orbit Dynamics Library
//!
//! Coordinate frames (geodetic, ECEF, ECI), Greenwich sidereal time, a
//! fixed-step Runge-Kutta propagator with J2/J4 zonal harmonics, and a
//! low-precision Sun position model for pass planning.

pub mod frames;
pub mod propagator;
pub mod sun;

pub use propagator::{EciState, ZonalGravity};

/// WGS-84 equatorial radius used by every frame transform, in meters.
pub const EARTH_EQUATORIAL_RADIUS_M: f64 = 6_378_136.0;

/// WGS-84 flattening.
pub const EARTH_FLATTENING: f64 = 1.0 / 298.257223563;

/// Earth rotation rate, in rad/s.
pub const EARTH_ROTATION_RATE_RAD_S: f64 = 7.29211e-5;

/// Geocentric gravitational constant, in m^3/s^2.
pub const EARTH_MU: f64 = 3.98600044e14;

/// Second zonal harmonic of the geopotential.
pub const EARTH_J2: f64 = 1.082627e-3;

/// Fourth zonal harmonic of the geopotential.
pub const EARTH_J4: f64 = -1.617608e-6;
