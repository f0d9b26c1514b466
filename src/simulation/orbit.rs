//! Classical orbital elements from state vectors and back
//!
//! `OrbitData::from_state` turns a position/velocity relative to a central
//! mass into elements; `to_state` is the inverse and `propagate` advances an
//! unperturbed conic with Kepler's equation. Everything is in physics units
//! with `mu` = physics mass of the centre. Angles are stored in degrees.
//!
//! Angle conventions:
//! - Ω is measured from +x to the ascending node; 0 for equatorial orbits.
//! - ω is measured from the node (or +x when equatorial) to periapsis,
//!   in the direction of motion. Circular orbits have no periapsis, so ω
//!   holds the argument of latitude (true longitude when also equatorial)
//!   and the true anomaly is 0.
//! - In-plane angles are signed with the angular momentum, which takes care
//!   of retrograde equatorial orbits without a separate branch.

use std::f64::consts::{PI, TAU};

use nalgebra::{Rotation3, Vector3};

use crate::simulation::error::{SimError, SimResult};
use crate::simulation::math::{angle_from_sin_cos, wrap_degrees, wrap_radians, SMALL};
use crate::simulation::states::NVec3;

/// |h| below this fraction of |r||v| is a radial (degenerate) trajectory
pub(crate) const RADIAL_RATIO: f64 = 1e-9;

/// |1/a| below this fraction of 2/r is treated as exactly parabolic
const PARABOLIC_TOLERANCE: f64 = 1e-12;

/// Eccentricity given to exactly parabolic input, kept on the ellipse branch
const PARABOLIC_ECC: f64 = 1.0 - 1e-9;

/// Below this eccentricity periapsis is undefined
const CIRCULAR_ECC: f64 = 1e-8;

/// sin(i) below this counts as equatorial
const EQUATORIAL_SIN: f64 = 1e-9;

const KEPLER_ITERATIONS: usize = 50;
const KEPLER_TOLERANCE: f64 = 1e-14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrbitKind {
    Ellipse,
    Hyperbola,
}

/// Derived description of an orbit about a reference body
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitData {
    pub kind: OrbitKind,
    pub ecc: f64,
    pub a: f64,                 // semi-major axis, positive on both branches
    pub perihelion: f64,        // periapsis distance
    pub node: f64,              // longitude of ascending node Ω, degrees
    pub arg_periapsis: f64,     // ω, degrees
    pub inclination: f64,       // degrees in [0, 180]
    pub true_anomaly: f64,      // ν at epoch, degrees
    pub period: f64,            // infinite for hyperbolas
    pub time_to_periapsis: f64, // to the next periapsis; negative once a hyperbola has passed it
    pub mu: f64,
}

impl OrbitData {
    /// Elements of a body at `r` with velocity `v`, both relative to a
    /// centre with gravitational parameter `mu`.
    ///
    /// Fails with `DegenerateOrbit` when the angular momentum vanishes
    /// (radial motion, zero velocity, or the body sitting on the centre)
    pub fn from_state(r: &NVec3, v: &NVec3, mu: f64) -> SimResult<Self> {
        let r_mag = r.norm();
        let v2 = v.norm_squared();
        let h = r.cross(v);
        let h_mag = h.norm();
        // relative only, so tiny unit systems are not flagged
        if !(mu > 0.0) || r_mag == 0.0 || v2 == 0.0 || h_mag <= RADIAL_RATIO * r_mag * v2.sqrt() {
            return Err(SimError::DegenerateOrbit);
        }

        // vis-viva: 1/a = 2/r - v²/μ
        let inv_a = 2.0 / r_mag - v2 / mu;
        let parabolic = inv_a.abs() <= PARABOLIC_TOLERANCE * 2.0 / r_mag;
        let kind = if inv_a > 0.0 || parabolic {
            OrbitKind::Ellipse
        } else {
            OrbitKind::Hyperbola
        };

        let p = h_mag * h_mag / mu;
        let (a, ecc) = match kind {
            OrbitKind::Ellipse => {
                let a = if parabolic {
                    p / (1.0 - PARABOLIC_ECC * PARABOLIC_ECC)
                } else {
                    1.0 / inv_a
                };
                (a, (1.0 - p / a).max(0.0).sqrt())
            }
            OrbitKind::Hyperbola => {
                let a = -1.0 / inv_a;
                (a, (1.0 + p / a).sqrt())
            }
        };

        let h_hat = h / h_mag;
        // acos(h_z/h), via atan2 to keep precision next to 0° and 180°
        let inclination = h.x.hypot(h.y).atan2(h.z);

        // node line, or +x for equatorial orbits
        let node_vec = NVec3::new(-h.y, h.x, 0.0);
        let (node, reference) = if node_vec.norm() > EQUATORIAL_SIN * h_mag {
            let n_hat = node_vec.normalize();
            (angle_from_sin_cos(n_hat.y, n_hat.x), n_hat)
        } else {
            (0.0, NVec3::x())
        };

        let r_hat = r / r_mag;
        let (arg_periapsis, true_anomaly) = if ecc < CIRCULAR_ECC {
            (in_plane_angle(&reference, &r_hat, &h_hat), 0.0)
        } else {
            let e_vec = ((v2 - mu / r_mag) * r - r.dot(v) * v) / mu;
            let e_hat = e_vec.normalize();
            (
                in_plane_angle(&reference, &e_hat, &h_hat),
                in_plane_angle(&e_hat, &r_hat, &h_hat),
            )
        };

        Ok(Self::assemble(
            kind,
            ecc,
            a,
            inclination,
            node,
            arg_periapsis,
            true_anomaly,
            mu,
        ))
    }

    /// Build elements from their classical values (angles in degrees).
    /// `ecc < 1` gives an ellipse, otherwise a hyperbola; `a` is positive
    /// for both
    #[allow(clippy::too_many_arguments)]
    pub fn from_elements(
        a: f64,
        ecc: f64,
        inclination: f64,
        node: f64,
        arg_periapsis: f64,
        true_anomaly: f64,
        mu: f64,
    ) -> SimResult<Self> {
        if !(mu > 0.0) || !(a > 0.0) || !(ecc >= 0.0) || (ecc - 1.0).abs() < 1e-12 {
            return Err(SimError::config(format!(
                "invalid orbital elements a={a} ecc={ecc} mu={mu}"
            )));
        }
        let kind = if ecc < 1.0 {
            OrbitKind::Ellipse
        } else {
            OrbitKind::Hyperbola
        };
        Ok(Self::assemble(
            kind,
            ecc,
            a,
            inclination.to_radians(),
            node.to_radians(),
            arg_periapsis.to_radians(),
            true_anomaly.to_radians(),
            mu,
        ))
    }

    /// Fill the derived fields; angles come in as radians
    #[allow(clippy::too_many_arguments)]
    fn assemble(
        kind: OrbitKind,
        ecc: f64,
        a: f64,
        inclination: f64,
        node: f64,
        arg_periapsis: f64,
        true_anomaly: f64,
        mu: f64,
    ) -> Self {
        let mut orbit = Self {
            kind,
            ecc,
            a,
            perihelion: match kind {
                OrbitKind::Ellipse => a * (1.0 - ecc),
                OrbitKind::Hyperbola => a * (ecc - 1.0),
            },
            node: wrap_degrees(node.to_degrees()),
            arg_periapsis: wrap_degrees(arg_periapsis.to_degrees()),
            inclination: inclination.to_degrees().clamp(0.0, 180.0),
            true_anomaly: wrap_degrees(true_anomaly.to_degrees()),
            period: match kind {
                OrbitKind::Ellipse => TAU * (a.powi(3) / mu).sqrt(),
                OrbitKind::Hyperbola => f64::INFINITY,
            },
            time_to_periapsis: 0.0,
            mu,
        };
        orbit.time_to_periapsis = orbit.compute_time_to_periapsis();
        orbit
    }

    fn compute_time_to_periapsis(&self) -> f64 {
        let m = self.mean_anomaly();
        match self.kind {
            OrbitKind::Ellipse => {
                if m <= SMALL {
                    0.0
                } else {
                    // outbound bodies have most of the period still to go
                    self.period - m / self.mean_motion()
                }
            }
            // inbound (M < 0) gives a positive time, past periapsis negative
            OrbitKind::Hyperbola => -m / self.mean_motion(),
        }
    }

    pub fn is_ellipse(&self) -> bool {
        self.kind == OrbitKind::Ellipse
    }

    pub fn semi_latus_rectum(&self) -> f64 {
        match self.kind {
            OrbitKind::Ellipse => self.a * (1.0 - self.ecc * self.ecc),
            OrbitKind::Hyperbola => self.a * (self.ecc * self.ecc - 1.0),
        }
    }

    /// Apoapsis distance (infinite for hyperbolas)
    pub fn apoapsis(&self) -> f64 {
        match self.kind {
            OrbitKind::Ellipse => self.a * (1.0 + self.ecc),
            OrbitKind::Hyperbola => f64::INFINITY,
        }
    }

    /// n = sqrt(μ / |a|³)
    pub fn mean_motion(&self) -> f64 {
        (self.mu / self.a.powi(3)).sqrt()
    }

    /// Mean anomaly in radians: [0, 2π) for ellipses, signed for hyperbolas
    pub fn mean_anomaly(&self) -> f64 {
        let nu = self.true_anomaly.to_radians();
        let e = self.ecc;
        match self.kind {
            OrbitKind::Ellipse => {
                let denom = 1.0 + e * nu.cos();
                let cos_e = (e + nu.cos()) / denom;
                let sin_e = (1.0 - e * e).sqrt() * nu.sin() / denom;
                let ecc_anomaly = angle_from_sin_cos(sin_e, cos_e);
                wrap_radians(ecc_anomaly - e * ecc_anomaly.sin())
            }
            OrbitKind::Hyperbola => {
                let f = hyperbolic_anomaly(signed_angle(nu), e);
                e * f.sinh() - f
            }
        }
    }

    /// Position and velocity relative to the centre
    pub fn to_state(&self) -> (NVec3, NVec3) {
        let nu = self.true_anomaly.to_radians();
        let p = self.semi_latus_rectum();
        let radius = p / (1.0 + self.ecc * nu.cos());
        let speed = (self.mu / p).sqrt();

        let r_pf = NVec3::new(radius * nu.cos(), radius * nu.sin(), 0.0);
        let v_pf = NVec3::new(-speed * nu.sin(), speed * (self.ecc + nu.cos()), 0.0);

        let rotation = self.orientation();
        (rotation * r_pf, rotation * v_pf)
    }

    /// Perifocal -> reference frame: R_z(Ω) R_x(i) R_z(ω)
    fn orientation(&self) -> Rotation3<f64> {
        Rotation3::from_axis_angle(&Vector3::z_axis(), self.node.to_radians())
            * Rotation3::from_axis_angle(&Vector3::x_axis(), self.inclination.to_radians())
            * Rotation3::from_axis_angle(&Vector3::z_axis(), self.arg_periapsis.to_radians())
    }

    /// Elements after `dt` of unperturbed two-body motion
    pub fn propagate(&self, dt: f64) -> Self {
        let e = self.ecc;
        let m = self.mean_anomaly() + self.mean_motion() * dt;
        let nu = match self.kind {
            OrbitKind::Ellipse => {
                let ecc_anomaly = solve_kepler_ellipse(wrap_radians(m), e);
                let (sin_e, cos_e) = ecc_anomaly.sin_cos();
                let denom = 1.0 - e * cos_e;
                angle_from_sin_cos((1.0 - e * e).sqrt() * sin_e / denom, (cos_e - e) / denom)
            }
            OrbitKind::Hyperbola => {
                let f = solve_kepler_hyperbola(m, e);
                2.0 * (((e + 1.0) / (e - 1.0)).sqrt() * (0.5 * f).tanh()).atan()
            }
        };
        Self::assemble(
            self.kind,
            e,
            self.a,
            self.inclination.to_radians(),
            self.node.to_radians(),
            self.arg_periapsis.to_radians(),
            nu,
            self.mu,
        )
    }
}

/// Angle from unit vector `from` to unit vector `to`, positive about `axis`
fn in_plane_angle(from: &NVec3, to: &NVec3, axis: &NVec3) -> f64 {
    angle_from_sin_cos(from.cross(to).dot(axis), from.dot(to))
}

/// Map [0, 2π) onto (-π, π]
fn signed_angle(angle: f64) -> f64 {
    if angle > PI {
        angle - TAU
    } else {
        angle
    }
}

/// Hyperbolic anomaly F from a signed true anomaly
fn hyperbolic_anomaly(nu: f64, e: f64) -> f64 {
    let x = ((e - 1.0) / (e + 1.0)).sqrt() * (0.5 * nu).tan();
    2.0 * x.clamp(-1.0 + 1e-15, 1.0 - 1e-15).atanh()
}

/// Solve M = E - e sin E with Newton-Raphson
pub fn solve_kepler_ellipse(mean_anomaly: f64, e: f64) -> f64 {
    let mut ecc_anomaly = if e < 0.8 { mean_anomaly } else { PI };
    for _ in 0..KEPLER_ITERATIONS {
        let f = ecc_anomaly - e * ecc_anomaly.sin() - mean_anomaly;
        let delta = f / (1.0 - e * ecc_anomaly.cos());
        ecc_anomaly -= delta;
        if delta.abs() < KEPLER_TOLERANCE {
            break;
        }
    }
    ecc_anomaly
}

/// Solve M = e sinh F - F with Newton-Raphson
pub fn solve_kepler_hyperbola(mean_anomaly: f64, e: f64) -> f64 {
    let mut f = (mean_anomaly / e).asinh();
    for _ in 0..KEPLER_ITERATIONS {
        let g = e * f.sinh() - f - mean_anomaly;
        let delta = g / (e * f.cosh() - 1.0);
        f -= delta;
        if delta.abs() < KEPLER_TOLERANCE * f.abs().max(1.0) {
            break;
        }
    }
    f
}
