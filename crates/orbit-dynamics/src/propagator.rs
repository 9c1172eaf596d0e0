//! Fixed-step orbit propagation under a zonal-harmonic gravity model.
//!
//! The force model is a central body plus the J2 and J4 zonal terms; the
//! integrator is the classical 4th-order Runge-Kutta with a constant step.
//! Good enough for day-scale ground-contact prediction from a fresh epoch
//! state; drag and third-body effects are deliberately absent.

use serde::{Deserialize, Serialize};
use std::array;

use crate::{EARTH_EQUATORIAL_RADIUS_M, EARTH_J2, EARTH_J4, EARTH_MU};

/// Inertial position/velocity pair, in meters and meters per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EciState {
    pub position: [f64; 3],
    pub velocity: [f64; 3],
}

/// Gravity model parameters for the propagator.
#[derive(Debug, Clone, Copy)]
pub struct ZonalGravity {
    /// Gravitational parameter, m^3/s^2.
    pub mu: f64,
    pub j2: f64,
    pub j4: f64,
    /// Radius the zonal terms are scaled by, m.
    pub reference_radius: f64,
}

impl ZonalGravity {
    pub const EARTH: Self = Self {
        mu: EARTH_MU,
        j2: EARTH_J2,
        j4: EARTH_J4,
        reference_radius: EARTH_EQUATORIAL_RADIUS_M,
    };

    /// Acceleration at an inertial position.
    pub fn acceleration(&self, position: [f64; 3]) -> [f64; 3] {
        let [x, y, z] = position;
        let r = (x * x + y * y + z * z).sqrt();

        let mun = self.mu / (r * r);
        let xn = x / r;
        let yn = y / r;
        let zn = z / r;
        let an2 = (self.reference_radius / r).powi(2);
        let an4 = an2 * an2;
        let zn2 = zn * zn;

        // Zonal correction factors differ between the equatorial components
        // and the polar one.
        let c2_eq = 1.0 - 5.0 * zn2;
        let c4_eq = 3.0 + (63.0 * zn2 - 42.0) * zn2;
        let c2_pol = 3.0 - 5.0 * zn2;
        let c4_pol = 15.0 + (63.0 * zn2 - 70.0) * zn2;

        [
            -mun * xn - 1.5 * self.j2 * mun * xn * an2 * c2_eq
                + 0.625 * self.j4 * mun * xn * an4 * c4_eq,
            -mun * yn - 1.5 * self.j2 * mun * yn * an2 * c2_eq
                + 0.625 * self.j4 * mun * yn * an4 * c4_eq,
            -mun * zn - 1.5 * self.j2 * mun * zn * an2 * c2_pol
                + 0.625 * self.j4 * mun * zn * an4 * c4_pol,
        ]
    }

    /// Advance one step with classical RK4.
    pub fn rk4_step(&self, state: &EciState, step: f64) -> EciState {
        let half = step / 2.0;

        let k1v = state.velocity;
        let k1a = self.acceleration(state.position);

        let k2v: [f64; 3] = array::from_fn(|i| state.velocity[i] + half * k1a[i]);
        let k2a = self.acceleration(array::from_fn(|i| state.position[i] + half * k1v[i]));

        let k3v: [f64; 3] = array::from_fn(|i| state.velocity[i] + half * k2a[i]);
        let k3a = self.acceleration(array::from_fn(|i| state.position[i] + half * k2v[i]));

        let k4v: [f64; 3] = array::from_fn(|i| state.velocity[i] + step * k3a[i]);
        let k4a = self.acceleration(array::from_fn(|i| state.position[i] + step * k3v[i]));

        let sixth = step / 6.0;
        EciState {
            position: array::from_fn(|i| {
                state.position[i] + sixth * (k1v[i] + 2.0 * (k2v[i] + k3v[i]) + k4v[i])
            }),
            velocity: array::from_fn(|i| {
                state.velocity[i] + sixth * (k1a[i] + 2.0 * (k2a[i] + k3a[i]) + k4a[i])
            }),
        }
    }

    /// Propagate a dense trajectory of `samples` states, the initial state
    /// included, spaced `step` seconds apart.
    pub fn propagate(&self, initial: EciState, step: f64, samples: usize) -> Vec<EciState> {
        let mut states = Vec::with_capacity(samples);
        if samples == 0 {
            return states;
        }

        states.push(initial);
        let mut current = initial;
        for _ in 1..samples {
            current = self.rk4_step(&current, step);
            states.push(current);
        }

        states
    }
}

impl Default for ZonalGravity {
    fn default() -> Self {
        Self::EARTH
    }
}
