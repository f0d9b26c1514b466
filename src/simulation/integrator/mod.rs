//! Interchangeable integrators for the massive bodies
//!
//! All variants share the `Integrator` contract: `evolve` is the single hot
//! entry point, dispatched once per call (never per body pair), and leaves
//! positions and velocities advanced together. Each variant keeps velocities
//! and its own auxiliary arrays sized to the state capacity.

pub mod hermite;
pub mod leapfrog;
pub mod regularized;

pub use hermite::HermiteIntegrator;
pub use leapfrog::LeapfrogIntegrator;
pub use regularized::RegularizedIntegrator;

use crate::simulation::engine::{Algorithm, EngineSettings};
use crate::simulation::error::SimResult;
use crate::simulation::forces::Gravity;
use crate::simulation::states::{BodyArrays, NVec3};

pub trait Integrator: Send {
    fn name(&self) -> &'static str;

    /// Internal step for fixed-step variants, the maximum step otherwise
    fn nominal_step(&self) -> f64;

    /// Size internal arrays to `bodies.capacity()` and load velocities for
    /// the bodies already present
    fn setup(&mut self, bodies: &BodyArrays, velocities: &[NVec3]) -> SimResult<()>;

    /// Register the velocity of a body about to be stored at `index`
    fn add_body(&mut self, index: usize, v: NVec3) -> SimResult<()>;

    /// Shuffle-down removal matching `BodyArrays::remove_at`; `count` is the
    /// body count before removal
    fn remove_body_at(&mut self, index: usize, count: usize) -> SimResult<()>;

    fn grow_arrays(&mut self, capacity: usize) -> SimResult<()>;

    fn set_active(&mut self, _index: usize, _active: bool) -> SimResult<()> {
        self.invalidate();
        Ok(())
    }

    /// Whether bodies on fixed paths may be mixed in
    fn supports_fixed(&self) -> bool {
        true
    }

    /// Check the current body set is one this variant can evolve
    fn validate(&self, _bodies: &BodyArrays) -> SimResult<()> {
        Ok(())
    }

    fn velocity(&self, index: usize) -> NVec3;

    fn set_velocity(&mut self, index: usize, v: NVec3);

    /// Forget cached accelerations; they are recomputed before the next step
    fn invalidate(&mut self);

    /// Seed accelerations at time `t` so the first step is continuous
    fn pre_evolve(&mut self, t: f64, bodies: &mut BodyArrays);

    /// Advance from physics time `t` by at least `dt`; returns the time
    /// actually advanced. Fixed-step variants take whole steps only
    fn evolve(&mut self, t: f64, dt: f64, bodies: &mut BodyArrays) -> f64;

    /// Advance by exactly `dt` (used to land on maneuver times)
    fn evolve_exact(&mut self, t: f64, dt: f64, bodies: &mut BodyArrays) -> f64;

    /// Kinetic energy of the massive bodies plus force-law potential
    fn energy(&self, bodies: &BodyArrays) -> f64;

    fn clone_box(&self) -> Box<dyn Integrator>;
}

impl Clone for Box<dyn Integrator> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Build the integrator `settings` select, with internal step `h`
pub fn build_integrator(
    settings: &EngineSettings,
    gravity: Gravity,
    h: f64,
    accuracy: f64,
) -> Box<dyn Integrator> {
    match settings.algorithm {
        Algorithm::Leapfrog => Box::new(LeapfrogIntegrator::new(gravity, h)),
        Algorithm::Hermite => Box::new(
            HermiteIntegrator::new(gravity, h, accuracy)
                .with_corrector_iterations(settings.corrector_iterations),
        ),
        Algorithm::Regularized => Box::new(RegularizedIntegrator::new(h)),
    }
}

/// Σ ½ m v² over integrated bodies; fixed-path bodies are driven from
/// outside and carry no kinetic term
pub(crate) fn kinetic_energy(bodies: &BodyArrays, v: &[NVec3]) -> f64 {
    (0..bodies.len())
        .filter(|&i| bodies.is_movable(i))
        .map(|i| 0.5 * bodies.m[i] * v[i].norm_squared())
        .sum()
}

/// Shuffle a per-body array down over `index`, mirroring `BodyArrays::remove_at`
pub(crate) fn shuffle_down(values: &mut [NVec3], index: usize, count: usize) {
    for j in index..count - 1 {
        values[j] = values[j + 1];
    }
    values[count - 1] = NVec3::zeros();
}
