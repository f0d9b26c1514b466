//! Transfer planning between orbits about a common centre
//!
//! Candidates are chosen from the shape of the two orbits:
//! - ship eccentric: circularize at the next periapsis first,
//! - both near-circular and coplanar: Hohmann, plus bi-elliptic when it
//!   needs less delta-v,
//! - anything else: no candidate.
//!
//! Inputs and outputs are in physics units; maneuver times are absolute.

use std::f64::consts::PI;

use log::debug;

use crate::simulation::maneuver::{circular_velocity, Maneuver};
use crate::simulation::math::wrap_radians;
use crate::simulation::orbit::{OrbitData, OrbitKind};
use crate::simulation::states::{BodyId, NVec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Hohmann,
    BiElliptic,
    Circularize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrbitTransfer {
    pub kind: TransferKind,
    pub maneuvers: Vec<Maneuver>,
    pub delta_v: f64,  // total |dv|
    pub duration: f64, // from planning time to the last burn
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferOptions {
    pub circular_tolerance: f64, // eccentricity counted as circular
    pub coplanar_tolerance: f64, // degrees between orbit normals
    pub bi_elliptic_ratio: f64,  // intermediate apoapsis / larger radius
    pub rendezvous: bool,        // wait so the target is met at arrival
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            circular_tolerance: 1e-2,
            coplanar_tolerance: 1.0,
            bi_elliptic_ratio: 2.0,
            rendezvous: false,
        }
    }
}

/// Speed on an orbit of semi-major axis `a` at radius `r`
fn vis_viva(r: f64, a: f64, mu: f64) -> f64 {
    (mu * (2.0 / r - 1.0 / a)).sqrt()
}

fn orbit_normal(orbit: &OrbitData) -> NVec3 {
    let (i, node) = (orbit.inclination.to_radians(), orbit.node.to_radians());
    NVec3::new(i.sin() * node.sin(), -i.sin() * node.cos(), i.cos())
}

/// Propose transfers that take `ship` from `ship_orbit` onto `target_orbit`.
/// Both orbits must be about the same centre (`center`)
pub fn plan_transfers(
    ship: BodyId,
    ship_orbit: &OrbitData,
    target_orbit: &OrbitData,
    center: BodyId,
    now: f64,
    opts: &TransferOptions,
) -> Vec<OrbitTransfer> {
    if ship_orbit.ecc > opts.circular_tolerance {
        return circularize_first(ship, ship_orbit, center, now).into_iter().collect();
    }
    if target_orbit.kind == OrbitKind::Hyperbola || target_orbit.ecc > opts.circular_tolerance {
        debug!("no transfer from {ship}: target orbit is not circular");
        return Vec::new();
    }
    let tilt = orbit_normal(ship_orbit)
        .dot(&orbit_normal(target_orbit))
        .clamp(-1.0, 1.0)
        .acos()
        .to_degrees();
    if tilt > opts.coplanar_tolerance {
        debug!("no transfer from {ship}: orbits differ by {tilt:.2} degrees");
        return Vec::new();
    }

    let mu = ship_orbit.mu;
    let (r1, r2) = (ship_orbit.a, target_orbit.a);
    if (r2 - r1).abs() <= 1e-9 * r1 {
        return Vec::new();
    }

    let wait = if opts.rendezvous {
        rendezvous_wait(ship_orbit, target_orbit)
    } else {
        0.0
    };
    let start = now + wait;

    let mut transfers = vec![hohmann(ship, r1, r2, mu, start, wait)];
    let bi = bi_elliptic(ship, r1, r2, opts.bi_elliptic_ratio * r1.max(r2), mu, start, wait);
    if bi.delta_v < transfers[0].delta_v {
        transfers.push(bi);
    }
    debug!(
        "planned {} transfer(s) for {ship}: r {r1:.4} -> {r2:.4}",
        transfers.len()
    );
    transfers
}

fn hohmann(ship: BodyId, r1: f64, r2: f64, mu: f64, start: f64, wait: f64) -> OrbitTransfer {
    let a_t = 0.5 * (r1 + r2);
    // signed along the velocity: positive raises, negative lowers
    let dv1 = vis_viva(r1, a_t, mu) - (mu / r1).sqrt();
    let dv2 = (mu / r2).sqrt() - vis_viva(r2, a_t, mu);
    let flight = PI * (a_t.powi(3) / mu).sqrt();
    OrbitTransfer {
        kind: TransferKind::Hohmann,
        maneuvers: vec![
            Maneuver::scalar(start, ship, dv1),
            Maneuver::scalar(start + flight, ship, dv2),
        ],
        delta_v: dv1.abs() + dv2.abs(),
        duration: wait + flight,
    }
}

fn bi_elliptic(
    ship: BodyId,
    r1: f64,
    r2: f64,
    rb: f64,
    mu: f64,
    start: f64,
    wait: f64,
) -> OrbitTransfer {
    let a1 = 0.5 * (r1 + rb);
    let a2 = 0.5 * (r2 + rb);
    let dv1 = vis_viva(r1, a1, mu) - (mu / r1).sqrt();
    let dv2 = vis_viva(rb, a2, mu) - vis_viva(rb, a1, mu);
    let dv3 = (mu / r2).sqrt() - vis_viva(r2, a2, mu);
    let t1 = PI * (a1.powi(3) / mu).sqrt();
    let t2 = PI * (a2.powi(3) / mu).sqrt();
    OrbitTransfer {
        kind: TransferKind::BiElliptic,
        maneuvers: vec![
            Maneuver::scalar(start, ship, dv1),
            Maneuver::scalar(start + t1, ship, dv2),
            Maneuver::scalar(start + t1 + t2, ship, dv3),
        ],
        delta_v: dv1.abs() + dv2.abs() + dv3.abs(),
        duration: wait + t1 + t2,
    }
}

/// Circularize at the next periapsis, or right away once it has passed
fn circularize_first(
    ship: BodyId,
    orbit: &OrbitData,
    center: BodyId,
    now: f64,
) -> Option<OrbitTransfer> {
    let delay = orbit.time_to_periapsis.max(0.0);
    let (r, v) = orbit.propagate(delay).to_state();
    let v_circ = circular_velocity(&r, &v, orbit.mu).ok()?;
    debug!("{ship} is eccentric (e = {:.4}): circularize in {delay:.4}", orbit.ecc);
    Some(OrbitTransfer {
        kind: TransferKind::Circularize,
        maneuvers: vec![Maneuver::circularize(now + delay, ship, center)],
        delta_v: (v_circ - v).norm(),
        duration: delay,
    })
}

/// Time to wait until the target leads the ship by the Hohmann phase angle
fn rendezvous_wait(ship: &OrbitData, target: &OrbitData) -> f64 {
    let (r_ship, v_ship) = ship.to_state();
    let (r_target, _) = target.to_state();
    let axis = r_ship.cross(&v_ship).normalize();
    let (s, t) = (r_ship.normalize(), r_target.normalize());
    let lead = wrap_radians(s.cross(&t).dot(&axis).atan2(s.dot(&t)));

    let a_t = 0.5 * (ship.a + target.a);
    let flight = PI * (a_t.powi(3) / ship.mu).sqrt();
    let required = wrap_radians(PI - target.mean_motion() * flight);

    // target angle relative to the ship changes at n_target - n_ship
    let closing = target.mean_motion() - ship.mean_motion();
    if closing.abs() < 1e-12 {
        return 0.0;
    }
    if closing > 0.0 {
        wrap_radians(required - lead) / closing
    } else {
        wrap_radians(lead - required) / -closing
    }
}
