//! Regularized integrator for exactly three massive bodies
//!
//! The bodies are held as a chain: centre of mass plus two relative vectors
//! `x[0] = r_b - r_a`, `x[1] = r_c - r_b`, ordered so the pair left out of the
//! chain (a, c) is always the widest one. Close pairs are then represented by
//! short, directly integrated vectors instead of differences of large
//! coordinates.
//!
//! Motion is advanced with the logarithmic-Hamiltonian leapfrog in a
//! fictitious time `s`:
//!
//! ```text
//! drift  dt = (ds/2) / (T + B)     x += dt * w
//! kick   dt = ds / U               w += dt * A(x)
//! drift  dt = (ds/2) / (T + B)     x += dt * w
//! ```
//!
//! with `U` the (positive) force function and `B = U - T` the binding energy.
//! The physical step shrinks as `1/U`, so two-body collisions are passed
//! without the step or the error blowing up. The last fraction of each
//! requested interval is covered with ordinary leapfrog so `evolve` lands
//! exactly on `t + dt`.
//!
//! Growth past three bodies, removal, deactivation and fixed-path bodies are
//! configuration errors for this variant.

use crate::simulation::error::{SimError, SimResult};
use crate::simulation::forces::{ForceLaw, Gravity};
use crate::simulation::states::{BodyArrays, NVec3};

use super::{kinetic_energy, Integrator};

const BODIES: usize = 3;

#[derive(Debug, Clone)]
pub struct RegularizedIntegrator {
    h: f64,             // nominal physical step, sets the fictitious step
    v: Vec<NVec3>,      // body velocities in storage order
    order: [usize; 3],  // storage index of chain members a, b, c
    mass: [f64; 3],     // masses in chain order
    x: [NVec3; 2],      // chain separations
    w: [NVec3; 2],      // chain relative velocities
    com: NVec3,
    vcom: NVec3,
    binding: f64,       // B = U - T, constant without external forces
    ds: f64,            // fictitious time step
    primed: bool,
}

impl RegularizedIntegrator {
    pub fn new(h: f64) -> Self {
        Self {
            h,
            v: Vec::new(),
            order: [0, 1, 2],
            mass: [0.0; 3],
            x: [NVec3::zeros(); 2],
            w: [NVec3::zeros(); 2],
            com: NVec3::zeros(),
            vcom: NVec3::zeros(),
            binding: 0.0,
            ds: 0.0,
            primed: false,
        }
    }

    fn total_mass(&self) -> f64 {
        self.mass.iter().sum()
    }

    /// Positive force function U = Σ m_i m_j / r_ij
    fn force_function(&self, x: &[NVec3; 2]) -> f64 {
        let [ma, mb, mc] = self.mass;
        ma * mb / x[0].norm() + mb * mc / x[1].norm() + ma * mc / (x[0] + x[1]).norm()
    }

    /// Velocities of a, b, c relative to the centre of mass
    fn member_velocities(&self, w: &[NVec3; 2]) -> [NVec3; 3] {
        let [_, mb, mc] = self.mass;
        let va = -(mb * w[0] + mc * (w[0] + w[1])) / self.total_mass();
        let vb = va + w[0];
        let vc = vb + w[1];
        [va, vb, vc]
    }

    /// Positions of a, b, c relative to the centre of mass
    fn member_positions(&self, x: &[NVec3; 2]) -> [NVec3; 3] {
        let [_, mb, mc] = self.mass;
        let ra = -(mb * x[0] + mc * (x[0] + x[1])) / self.total_mass();
        let rb = ra + x[0];
        let rc = rb + x[1];
        [ra, rb, rc]
    }

    fn kinetic(&self, w: &[NVec3; 2]) -> f64 {
        self.member_velocities(w)
            .iter()
            .zip(self.mass.iter())
            .map(|(v, m)| 0.5 * m * v.norm_squared())
            .sum()
    }

    /// Accelerations of the chain vectors
    fn chain_acceleration(&self, x: &[NVec3; 2]) -> [NVec3; 2] {
        let [ma, mb, mc] = self.mass;
        let x02 = x[0] + x[1];
        let f01 = x[0] / x[0].norm().powi(3);
        let f12 = x[1] / x[1].norm().powi(3);
        let f02 = x02 / x02.norm().powi(3);

        let acc_a = mb * f01 + mc * f02;
        let acc_b = -ma * f01 + mc * f12;
        let acc_c = -ma * f02 - mb * f12;
        [acc_b - acc_a, acc_c - acc_b]
    }

    /// Build the chain from COM-relative positions/velocities indexed by storage slot
    fn set_chain(&mut self, r: [NVec3; 3], v: [NVec3; 3], m: [f64; 3]) {
        // leave the widest pair out of the chain
        let d01 = (r[1] - r[0]).norm();
        let d12 = (r[2] - r[1]).norm();
        let d02 = (r[2] - r[0]).norm();
        self.order = if d01 >= d12 && d01 >= d02 {
            [0, 2, 1]
        } else if d12 >= d01 && d12 >= d02 {
            [1, 0, 2]
        } else {
            [0, 1, 2]
        };
        let [a, b, c] = self.order;
        self.mass = [m[a], m[b], m[c]];
        self.x = [r[b] - r[a], r[c] - r[b]];
        self.w = [v[b] - v[a], v[c] - v[b]];
    }

    fn load(&mut self, bodies: &BodyArrays) {
        let m = [bodies.m[0], bodies.m[1], bodies.m[2]];
        let total: f64 = m.iter().sum();
        let r = [bodies.r[0], bodies.r[1], bodies.r[2]];
        let v = [self.v[0], self.v[1], self.v[2]];

        self.com = (0..BODIES).map(|i| m[i] * r[i]).sum::<NVec3>() / total;
        self.vcom = (0..BODIES).map(|i| m[i] * v[i]).sum::<NVec3>() / total;
        let rel_r = [r[0] - self.com, r[1] - self.com, r[2] - self.com];
        let rel_v = [v[0] - self.vcom, v[1] - self.vcom, v[2] - self.vcom];
        self.set_chain(rel_r, rel_v, m);

        let u = self.force_function(&self.x);
        self.binding = u - self.kinetic(&self.w);
        self.ds = self.h * u;
    }

    /// Re-order the chain when the widest pair is no longer (a, c)
    fn rechain_if_needed(&mut self) {
        let d02 = (self.x[0] + self.x[1]).norm();
        if d02 >= self.x[0].norm() && d02 >= self.x[1].norm() {
            return;
        }
        let pos = self.member_positions(&self.x);
        let vel = self.member_velocities(&self.w);
        let mut r = [NVec3::zeros(); 3];
        let mut v = [NVec3::zeros(); 3];
        let mut m = [0.0; 3];
        for k in 0..BODIES {
            r[self.order[k]] = pos[k];
            v[self.order[k]] = vel[k];
            m[self.order[k]] = self.mass[k];
        }
        self.set_chain(r, v, m);
    }

    fn store(&mut self, bodies: &mut BodyArrays) {
        let pos = self.member_positions(&self.x);
        let vel = self.member_velocities(&self.w);
        for k in 0..BODIES {
            let i = self.order[k];
            bodies.r[i] = self.com + pos[k];
            self.v[i] = self.vcom + vel[k];
        }
    }

    /// One regularized leapfrog step in fictitious time; returns physical time
    fn leap(&mut self, ds: f64) -> f64 {
        let dt1 = 0.5 * ds / self.drift_rate();
        self.x[0] += dt1 * self.w[0];
        self.x[1] += dt1 * self.w[1];

        let dt_kick = ds / self.force_function(&self.x);
        let acc = self.chain_acceleration(&self.x);
        self.w[0] += dt_kick * acc[0];
        self.w[1] += dt_kick * acc[1];

        let dt2 = 0.5 * ds / self.drift_rate();
        self.x[0] += dt2 * self.w[0];
        self.x[1] += dt2 * self.w[1];
        dt1 + dt2
    }

    /// T + B, which equals U along the exact solution
    fn drift_rate(&self) -> f64 {
        let rate = self.kinetic(&self.w) + self.binding;
        if rate > 0.0 {
            rate
        } else {
            self.force_function(&self.x)
        }
    }

    /// Ordinary kick-drift-kick in physical time for the tail of an interval
    fn plain(&mut self, dt: f64) {
        let acc = self.chain_acceleration(&self.x);
        self.w[0] += 0.5 * dt * acc[0];
        self.w[1] += 0.5 * dt * acc[1];
        self.x[0] += dt * self.w[0];
        self.x[1] += dt * self.w[1];
        let acc = self.chain_acceleration(&self.x);
        self.w[0] += 0.5 * dt * acc[0];
        self.w[1] += 0.5 * dt * acc[1];
    }

    fn three_bodies_error() -> SimError {
        SimError::config("regularized integrator holds exactly three bodies")
    }
}

impl Integrator for RegularizedIntegrator {
    fn name(&self) -> &'static str {
        "regularized"
    }

    fn nominal_step(&self) -> f64 {
        self.h
    }

    fn setup(&mut self, bodies: &BodyArrays, velocities: &[NVec3]) -> SimResult<()> {
        if velocities.len() > BODIES {
            return Err(Self::three_bodies_error());
        }
        self.v = vec![NVec3::zeros(); bodies.capacity().max(BODIES)];
        self.v[..velocities.len()].copy_from_slice(velocities);
        self.primed = false;
        Ok(())
    }

    fn add_body(&mut self, index: usize, v: NVec3) -> SimResult<()> {
        if index >= BODIES {
            return Err(Self::three_bodies_error());
        }
        self.v[index] = v;
        self.primed = false;
        Ok(())
    }

    fn remove_body_at(&mut self, _index: usize, _count: usize) -> SimResult<()> {
        Err(SimError::config("regularized integrator does not allow removal"))
    }

    fn grow_arrays(&mut self, capacity: usize) -> SimResult<()> {
        if self.v.len() < capacity {
            self.v.resize(capacity, NVec3::zeros());
        }
        Ok(())
    }

    fn set_active(&mut self, _index: usize, _active: bool) -> SimResult<()> {
        Err(SimError::config("regularized integrator does not allow deactivation"))
    }

    fn supports_fixed(&self) -> bool {
        false
    }

    fn validate(&self, bodies: &BodyArrays) -> SimResult<()> {
        if bodies.len() != BODIES {
            return Err(SimError::config(format!(
                "regularized integrator needs exactly three bodies, found {}",
                bodies.len()
            )));
        }
        if (0..BODIES).any(|i| !bodies.is_movable(i) || !(bodies.m[i] > 0.0)) {
            return Err(SimError::config(
                "regularized integrator needs three active, free bodies with positive mass",
            ));
        }
        Ok(())
    }

    fn velocity(&self, index: usize) -> NVec3 {
        self.v[index]
    }

    fn set_velocity(&mut self, index: usize, v: NVec3) {
        self.v[index] = v;
        self.primed = false;
    }

    fn invalidate(&mut self) {
        self.primed = false;
    }

    fn pre_evolve(&mut self, _t: f64, bodies: &mut BodyArrays) {
        if self.validate(bodies).is_err() {
            return;
        }
        self.load(bodies);
        self.primed = true;
    }

    fn evolve(&mut self, t: f64, dt: f64, bodies: &mut BodyArrays) -> f64 {
        if dt <= 0.0 {
            return 0.0;
        }
        if !self.primed {
            self.pre_evolve(t, bodies);
            if !self.primed {
                // body set rejected by validate(); the driver refuses to run it
                return 0.0;
            }
        }

        let mut elapsed = 0.0;
        while elapsed < dt {
            let remaining = dt - elapsed;
            let estimate = self.ds / self.force_function(&self.x);
            if 2.0 * estimate >= remaining {
                self.plain(0.5 * remaining);
                self.plain(0.5 * remaining);
                break;
            }
            elapsed += self.leap(self.ds);
            self.rechain_if_needed();
        }
        self.com += dt * self.vcom;
        self.store(bodies);
        dt
    }

    fn evolve_exact(&mut self, t: f64, dt: f64, bodies: &mut BodyArrays) -> f64 {
        self.evolve(t, dt, bodies)
    }

    fn energy(&self, bodies: &BodyArrays) -> f64 {
        let newton = Gravity::new(ForceLaw::InverseSquare, 0.0);
        kinetic_energy(bodies, &self.v) + newton.potential_energy(bodies)
    }

    fn clone_box(&self) -> Box<dyn Integrator> {
        Box::new(self.clone())
    }
}
