//! Fixed-step kick-drift-kick leapfrog for the massive bodies
//!
//! Symplectic with good long-term energy behaviour as long as the step never
//! changes during a run. One force evaluation per step: the acceleration at
//! the end of a step is kept for the opening kick of the next one.

use crate::simulation::error::SimResult;
use crate::simulation::forces::Gravity;
use crate::simulation::math::{steps_covering, steps_within};
use crate::simulation::states::{BodyArrays, NVec3};

use super::{kinetic_energy, shuffle_down, Integrator};

#[derive(Debug, Clone)]
pub struct LeapfrogIntegrator {
    gravity: Gravity,
    h: f64,          // fixed internal step
    v: Vec<NVec3>,   // velocities
    a: Vec<NVec3>,   // accelerations at the current positions
    primed: bool,    // `a` matches the current positions
}

impl LeapfrogIntegrator {
    pub fn new(gravity: Gravity, h: f64) -> Self {
        Self {
            gravity,
            h,
            v: Vec::new(),
            a: Vec::new(),
            primed: false,
        }
    }

    /// One kick-drift-kick step of length `dt` starting at time `t`
    fn step(&mut self, t: f64, dt: f64, bodies: &mut BodyArrays) {
        let n = bodies.len();
        let half_dt = 0.5 * dt;

        // Kick: v_n+1/2 = v_n + (dt/2) a_n
        // Drift: x_n+1 = x_n + dt v_n+1/2
        for i in 0..n {
            if !bodies.is_movable(i) {
                continue;
            }
            self.v[i] += half_dt * self.a[i];
            bodies.r[i] += dt * self.v[i];
        }

        // fixed bodies jump to where their path is at t_n+1
        bodies.update_fixed(t + dt);

        // a_n+1 from x_n+1
        self.gravity.accelerations(bodies, &mut self.a);

        // Second kick: v_n+1 = v_n+1/2 + (dt/2) a_n+1
        for i in 0..n {
            if bodies.is_movable(i) {
                self.v[i] += half_dt * self.a[i];
            }
        }
    }
}

impl Integrator for LeapfrogIntegrator {
    fn name(&self) -> &'static str {
        "leapfrog"
    }

    fn nominal_step(&self) -> f64 {
        self.h
    }

    fn setup(&mut self, bodies: &BodyArrays, velocities: &[NVec3]) -> SimResult<()> {
        let capacity = bodies.capacity();
        self.v = vec![NVec3::zeros(); capacity];
        self.a = vec![NVec3::zeros(); capacity];
        self.v[..velocities.len()].copy_from_slice(velocities);
        self.primed = false;
        Ok(())
    }

    fn add_body(&mut self, index: usize, v: NVec3) -> SimResult<()> {
        self.v[index] = v;
        self.a[index] = NVec3::zeros();
        self.primed = false;
        Ok(())
    }

    fn remove_body_at(&mut self, index: usize, count: usize) -> SimResult<()> {
        shuffle_down(&mut self.v, index, count);
        shuffle_down(&mut self.a, index, count);
        self.primed = false;
        Ok(())
    }

    fn grow_arrays(&mut self, capacity: usize) -> SimResult<()> {
        self.v.resize(capacity, NVec3::zeros());
        self.a.resize(capacity, NVec3::zeros());
        Ok(())
    }

    fn velocity(&self, index: usize) -> NVec3 {
        self.v[index]
    }

    fn set_velocity(&mut self, index: usize, v: NVec3) {
        // accelerations depend on positions only, `a` stays valid
        self.v[index] = v;
    }

    fn invalidate(&mut self) {
        self.primed = false;
    }

    fn pre_evolve(&mut self, t: f64, bodies: &mut BodyArrays) {
        bodies.update_fixed(t);
        self.gravity.accelerations(bodies, &mut self.a);
        self.primed = true;
    }

    fn evolve(&mut self, t: f64, dt: f64, bodies: &mut BodyArrays) -> f64 {
        let steps = steps_covering(dt, self.h);
        if steps > 0 && !self.primed {
            self.pre_evolve(t, bodies);
        }
        let mut time = t;
        for _ in 0..steps {
            self.step(time, self.h, bodies);
            time += self.h;
        }
        steps as f64 * self.h
    }

    fn evolve_exact(&mut self, t: f64, dt: f64, bodies: &mut BodyArrays) -> f64 {
        if dt <= 0.0 {
            return 0.0;
        }
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
        dt
    }

    fn energy(&self, bodies: &BodyArrays) -> f64 {
        kinetic_energy(bodies, &self.v) + self.gravity.potential_energy(bodies)
    }

    fn clone_box(&self) -> Box<dyn Integrator> {
        Box::new(self.clone())
    }
}
