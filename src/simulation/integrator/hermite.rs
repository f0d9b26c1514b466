//! Adaptive 4th-order Hermite predictor-corrector
//!
//! Carries acceleration and jerk for every body. A step predicts positions
//! and velocities with a Taylor series, re-evaluates acceleration and jerk
//! there and applies the Hermite corrector, repeating evaluate-correct
//! `corrector_iterations` times (P(EC)^n).
//! After each step every body proposes its own step from the Aarseth
//! criterion using snap and crackle reconstructed from the step end points;
//! the next shared step is the smallest proposal, so close encounters shrink
//! the step automatically.
//!
//! All bodies share that one step (no individual block time steps) and the
//! scheme is 4th order only; there is no 8th-order variant.

use crate::simulation::error::SimResult;
use crate::simulation::forces::Gravity;
use crate::simulation::states::{BodyArrays, NVec3};

use super::{kinetic_energy, shuffle_down, Integrator};

/// Steps never shrink below `h_max * MIN_STEP_FRACTION`
const MIN_STEP_FRACTION: f64 = 1e-9;

/// Accuracy used for the very first step, which only has a and j to go on
const STARTUP_ETA_FACTOR: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct HermiteIntegrator {
    gravity: Gravity,
    h_max: f64,
    eta: f64,
    corrector_iterations: u32,
    v: Vec<NVec3>,
    a: Vec<NVec3>,
    j: Vec<NVec3>,
    // scratch for the step start, kept to avoid reallocating every step
    x0: Vec<NVec3>,
    v0: Vec<NVec3>,
    a0: Vec<NVec3>,
    j0: Vec<NVec3>,
    dt_next: f64,
    primed: bool,
}

impl HermiteIntegrator {
    pub fn new(gravity: Gravity, h_max: f64, eta: f64) -> Self {
        Self {
            gravity,
            h_max,
            eta,
            corrector_iterations: 1,
            v: Vec::new(),
            a: Vec::new(),
            j: Vec::new(),
            x0: Vec::new(),
            v0: Vec::new(),
            a0: Vec::new(),
            j0: Vec::new(),
            dt_next: h_max,
            primed: false,
        }
    }

    /// Number of evaluate-correct passes per step (at least one)
    pub fn with_corrector_iterations(mut self, iterations: u32) -> Self {
        self.corrector_iterations = iterations.max(1);
        self
    }

    fn clamp_step(&self, dt: f64) -> f64 {
        dt.clamp(self.h_max * MIN_STEP_FRACTION, self.h_max)
    }

    fn evaluate(&mut self, bodies: &BodyArrays) {
        self.gravity
            .accelerations_and_jerks(bodies, &self.v, &mut self.a, &mut self.j);
    }

    /// Startup estimate dt = eta' |a| / |j|
    fn startup_step(&self, bodies: &BodyArrays) -> f64 {
        let mut dt = self.h_max;
        for i in 0..bodies.len() {
            if !bodies.is_movable(i) {
                continue;
            }
            let a = self.a[i].norm();
            let j = self.j[i].norm();
            if j > 0.0 && a > 0.0 {
                dt = dt.min(STARTUP_ETA_FACTOR * self.eta.sqrt() * a / j);
            }
        }
        self.clamp_step(dt)
    }

    fn sync_fixed_velocities(&mut self, t: f64, bodies: &BodyArrays) {
        for i in 0..bodies.len() {
            if let Some(v) = bodies.fixed_velocity(i, t) {
                self.v[i] = v;
            }
        }
    }

    /// One Hermite step of length `dt` from time `t`
    fn step(&mut self, t: f64, dt: f64, bodies: &mut BodyArrays) {
        let n = bodies.len();
        let dt2 = dt * dt;
        let dt3 = dt2 * dt;

        self.x0[..n].copy_from_slice(&bodies.r[..n]);
        self.v0[..n].copy_from_slice(&self.v[..n]);
        self.a0[..n].copy_from_slice(&self.a[..n]);
        self.j0[..n].copy_from_slice(&self.j[..n]);

        // Predict
        for i in 0..n {
            if !bodies.is_movable(i) {
                continue;
            }
            bodies.r[i] = self.x0[i]
                + dt * self.v0[i]
                + (dt2 / 2.0) * self.a0[i]
                + (dt3 / 6.0) * self.j0[i];
            self.v[i] = self.v0[i] + dt * self.a0[i] + (dt2 / 2.0) * self.j0[i];
        }
        bodies.update_fixed(t + dt);
        self.sync_fixed_velocities(t + dt, bodies);

        // Evaluate + correct
        for _ in 0..self.corrector_iterations {
            self.evaluate(bodies);
            for i in 0..n {
                if !bodies.is_movable(i) {
                    continue;
                }
                let v1 = self.v0[i]
                    + (dt / 2.0) * (self.a0[i] + self.a[i])
                    + (dt2 / 12.0) * (self.j0[i] - self.j[i]);
                bodies.r[i] = self.x0[i]
                    + (dt / 2.0) * (self.v0[i] + v1)
                    + (dt2 / 12.0) * (self.a0[i] - self.a[i]);
                self.v[i] = v1;
            }
        }

        // Next step from the Aarseth criterion per body
        let mut dt_new = self.h_max;
        for i in 0..n {
            if !bodies.is_movable(i) {
                continue;
            }
            let da = self.a0[i] - self.a[i];
            let snap0 = (-6.0 * da - dt * (4.0 * self.j0[i] + 2.0 * self.j[i])) / dt2;
            let crackle = (12.0 * da + 6.0 * dt * (self.j0[i] + self.j[i])) / dt3;
            let snap1 = snap0 + dt * crackle;

            let a1 = self.a[i].norm();
            let j1 = self.j[i].norm();
            let s1 = snap1.norm();
            let c1 = crackle.norm();
            let num = a1 * s1 + j1 * j1;
            let den = j1 * c1 + s1 * s1;
            if den > 0.0 && num > 0.0 {
                dt_new = dt_new.min((self.eta * num / den).sqrt());
            }
        }
        // do not grow faster than 2x per step
        self.dt_next = self.clamp_step(dt_new.min(2.0 * self.dt_next.max(dt)));
    }
}

impl Integrator for HermiteIntegrator {
    fn name(&self) -> &'static str {
        "hermite"
    }

    fn nominal_step(&self) -> f64 {
        self.h_max
    }

    fn setup(&mut self, bodies: &BodyArrays, velocities: &[NVec3]) -> SimResult<()> {
        self.grow_arrays(bodies.capacity())?;
        for a in [&mut self.v, &mut self.a, &mut self.j] {
            a.iter_mut().for_each(|x| *x = NVec3::zeros());
        }
        self.v[..velocities.len()].copy_from_slice(velocities);
        self.primed = false;
        Ok(())
    }

    fn add_body(&mut self, index: usize, v: NVec3) -> SimResult<()> {
        self.v[index] = v;
        self.a[index] = NVec3::zeros();
        self.j[index] = NVec3::zeros();
        self.primed = false;
        Ok(())
    }

    fn remove_body_at(&mut self, index: usize, count: usize) -> SimResult<()> {
        shuffle_down(&mut self.v, index, count);
        shuffle_down(&mut self.a, index, count);
        shuffle_down(&mut self.j, index, count);
        self.primed = false;
        Ok(())
    }

    fn grow_arrays(&mut self, capacity: usize) -> SimResult<()> {
        for a in [
            &mut self.v,
            &mut self.a,
            &mut self.j,
            &mut self.x0,
            &mut self.v0,
            &mut self.a0,
            &mut self.j0,
        ] {
            if a.len() < capacity {
                a.resize(capacity, NVec3::zeros());
            }
        }
        Ok(())
    }

    fn velocity(&self, index: usize) -> NVec3 {
        self.v[index]
    }

    fn set_velocity(&mut self, index: usize, v: NVec3) {
        // jerk depends on velocity
        self.v[index] = v;
        self.primed = false;
    }

    fn invalidate(&mut self) {
        self.primed = false;
    }

    fn pre_evolve(&mut self, t: f64, bodies: &mut BodyArrays) {
        bodies.update_fixed(t);
        self.sync_fixed_velocities(t, bodies);
        self.evaluate(bodies);
        self.dt_next = self.startup_step(bodies);
        self.primed = true;
    }

    /// Adaptive: always lands exactly on `t + dt`, shortening the last step
    fn evolve(&mut self, t: f64, dt: f64, bodies: &mut BodyArrays) -> f64 {
        if dt <= 0.0 {
            return 0.0;
        }
        if !self.primed {
            self.pre_evolve(t, bodies);
        }
        let end = t + dt;
        let mut time = t;
        while time < end {
            let remaining = end - time;
            let mut h = self.dt_next;
            if h >= remaining * (1.0 - 1e-12) {
                h = remaining;
            }
            self.step(time, h, bodies);
            time = if h == remaining { end } else { time + h };
        }
        dt
    }

    fn evolve_exact(&mut self, t: f64, dt: f64, bodies: &mut BodyArrays) -> f64 {
        self.evolve(t, dt, bodies)
    }

    fn energy(&self, bodies: &BodyArrays) -> f64 {
        kinetic_energy(bodies, &self.v) + self.gravity.potential_energy(bodies)
    }

    fn clone_box(&self) -> Box<dyn Integrator> {
        Box::new(self.clone())
    }
}
