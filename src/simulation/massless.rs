//! Massless-body sub-engine
//!
//! Test bodies feel the massive bodies but pull on nothing, so they are kept
//! out of the O(N²) massive sweep and advanced here with their own fixed-step
//! kick-drift-kick leapfrog. Cost is O(N_massive × N_massless) per step.
//!
//! Bodies may carry a `Propulsion` profile whose acceleration is added to
//! gravity, queried with the simulation time of the force evaluation.

use std::sync::Arc;

use log::debug;

use crate::simulation::forces::Gravity;
use crate::simulation::math::{steps_covering, steps_within};
use crate::simulation::states::{BodyArrays, NVec3};

/// Initial slot count of a fresh engine
const INITIAL_CAPACITY: usize = 8;

/// Non-gravitational acceleration applied to a massless body
pub trait Propulsion: Send + Sync {
    /// Acceleration at simulation time `t` for a body at `r` moving with `v`
    fn acceleration(&self, t: f64, r: &NVec3, v: &NVec3) -> NVec3;
}

/// Constant acceleration vector during the burn window [start, end)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantThrust {
    pub acceleration: NVec3,
    pub start: f64,
    pub end: f64,
}

impl Propulsion for ConstantThrust {
    fn acceleration(&self, t: f64, _r: &NVec3, _v: &NVec3) -> NVec3 {
        if t >= self.start && t < self.end {
            self.acceleration
        } else {
            NVec3::zeros()
        }
    }
}

/// Thrust of fixed magnitude along the current velocity (negative brakes)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgradeThrust {
    pub magnitude: f64,
    pub start: f64,
    pub end: f64,
}

impl Propulsion for ProgradeThrust {
    fn acceleration(&self, t: f64, _r: &NVec3, v: &NVec3) -> NVec3 {
        if t < self.start || t >= self.end {
            return NVec3::zeros();
        }
        v.try_normalize(0.0)
            .map_or_else(NVec3::zeros, |dir| self.magnitude * dir)
    }
}

#[derive(Clone)]
pub struct MasslessEngine {
    gravity: Gravity,
    h: f64,
    r: Vec<NVec3>,
    v: Vec<NVec3>,
    a: Vec<NVec3>,
    active: Vec<bool>,
    propulsion: Vec<Option<Arc<dyn Propulsion>>>,
    n: usize,
    primed: bool,
}

impl MasslessEngine {
    pub fn new(gravity: Gravity, h: f64) -> Self {
        Self {
            gravity,
            h,
            r: vec![NVec3::zeros(); INITIAL_CAPACITY],
            v: vec![NVec3::zeros(); INITIAL_CAPACITY],
            a: vec![NVec3::zeros(); INITIAL_CAPACITY],
            active: vec![false; INITIAL_CAPACITY],
            propulsion: vec![None; INITIAL_CAPACITY],
            n: 0,
            primed: false,
        }
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn capacity(&self) -> usize {
        self.r.len()
    }

    pub fn step_size(&self) -> f64 {
        self.h
    }

    /// Change the internal step; only done between runs (algorithm switch)
    pub fn set_step(&mut self, h: f64) {
        self.h = h;
        self.primed = false;
    }

    fn grow(&mut self) {
        let capacity = (self.capacity() * 2).max(INITIAL_CAPACITY);
        self.r.resize(capacity, NVec3::zeros());
        self.v.resize(capacity, NVec3::zeros());
        self.a.resize(capacity, NVec3::zeros());
        self.active.resize(capacity, false);
        self.propulsion.resize(capacity, None);
        debug!("massless storage grown to {capacity}");
    }

    /// Append a body and return its index
    pub fn add(&mut self, r: NVec3, v: NVec3, propulsion: Option<Arc<dyn Propulsion>>) -> usize {
        if self.n == self.capacity() {
            self.grow();
        }
        let i = self.n;
        self.r[i] = r;
        self.v[i] = v;
        self.a[i] = NVec3::zeros();
        self.active[i] = true;
        self.propulsion[i] = propulsion;
        self.n += 1;
        self.primed = false;
        i
    }

    /// Remove by shuffling later bodies down one slot
    pub fn remove_at(&mut self, i: usize) {
        for j in i..self.n - 1 {
            self.r[j] = self.r[j + 1];
            self.v[j] = self.v[j + 1];
            self.a[j] = self.a[j + 1];
            self.active[j] = self.active[j + 1];
            self.propulsion[j] = self.propulsion[j + 1].take();
        }
        self.n -= 1;
        let last = self.n;
        self.r[last] = NVec3::zeros();
        self.v[last] = NVec3::zeros();
        self.a[last] = NVec3::zeros();
        self.active[last] = false;
        self.propulsion[last] = None;
    }

    pub fn set_active(&mut self, i: usize, active: bool) {
        self.active[i] = active;
        self.primed = false;
    }

    pub fn is_active(&self, i: usize) -> bool {
        self.active[i]
    }

    pub fn position(&self, i: usize) -> NVec3 {
        self.r[i]
    }

    pub fn velocity(&self, i: usize) -> NVec3 {
        self.v[i]
    }

    pub fn set_position(&mut self, i: usize, r: NVec3) {
        self.r[i] = r;
        self.primed = false;
    }

    pub fn set_velocity(&mut self, i: usize, v: NVec3) {
        self.v[i] = v;
        // thrust may depend on velocity
        if self.propulsion[i].is_some() {
            self.primed = false;
        }
    }

    /// Cached accelerations no longer match the massive bodies
    pub fn invalidate(&mut self) {
        self.primed = false;
    }

    fn accelerations(&mut self, t: f64, bodies: &BodyArrays) {
        let n = self.n;
        self.gravity
            .field(bodies, &self.r[..n], &self.active[..n], &mut self.a[..n]);
        for i in 0..n {
            if !self.active[i] {
                continue;
            }
            if let Some(p) = &self.propulsion[i] {
                self.a[i] += p.acceleration(t, &self.r[i], &self.v[i]);
            }
        }
    }

    /// Seed accelerations at time `t` from the current massive positions
    pub fn pre_evolve(&mut self, t: f64, bodies: &BodyArrays) {
        self.accelerations(t, bodies);
        self.primed = true;
    }

    fn step(&mut self, t: f64, dt: f64, bodies: &BodyArrays) {
        let half_dt = 0.5 * dt;
        for i in 0..self.n {
            if self.active[i] {
                self.v[i] += half_dt * self.a[i];
                self.r[i] += dt * self.v[i];
            }
        }
        self.accelerations(t + dt, bodies);
        for i in 0..self.n {
            if self.active[i] {
                self.v[i] += half_dt * self.a[i];
            }
        }
    }

    /// Advance by whole steps covering `dt`; returns the time advanced.
    ///
    /// The massive bodies are sampled once, at the positions they hold on
    /// entry (their state at the end of the interval, since the massive
    /// integrator always runs first)
    pub fn evolve(&mut self, t: f64, dt: f64, bodies: &BodyArrays) -> f64 {
        let steps = steps_covering(dt, self.h);
        if self.n > 0 && steps > 0 {
            if !self.primed {
                self.pre_evolve(t, bodies);
            }
            let mut time = t;
            for _ in 0..steps {
                self.step(time, self.h, bodies);
                time += self.h;
            }
        }
        steps as f64 * self.h
    }

    /// Advance by exactly `dt`, finishing with a short step
    pub fn evolve_exact(&mut self, t: f64, dt: f64, bodies: &BodyArrays) -> f64 {
        if dt <= 0.0 {
            return 0.0;
        }
        if self.n > 0 {
            if !self.primed {
                self.pre_evolve(t, bodies);
            }
            let steps = steps_within(dt, self.h);
            let mut time = t;
            for _ in 0..steps {
                self.step(time, self.h, bodies);
                time += self.h;
            }
            let rest = dt - steps as f64 * self.h;
            if rest > self.h * 1e-9 {
                self.step(time, rest, bodies);
            }
        }
        dt
    }
}
