//! Bodies on prescribed paths
//!
//! A fixed body still pulls on everything else, but its own motion comes from
//! a closed-form law queried with the simulation time instead of from the
//! integrator. Paths are immutable and shared by `Arc` between the world
//! state and its trajectory clone.

use crate::simulation::orbit::OrbitData;
use crate::simulation::states::NVec3;

pub trait FixedMotion: Send + Sync {
    /// Position at simulation time `t`
    fn position(&self, t: f64) -> NVec3;

    /// Velocity at simulation time `t`
    fn velocity(&self, t: f64) -> NVec3;
}

/// Body that never moves
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stationary(pub NVec3);

impl FixedMotion for Stationary {
    fn position(&self, _t: f64) -> NVec3 {
        self.0
    }

    fn velocity(&self, _t: f64) -> NVec3 {
        NVec3::zeros()
    }
}

/// Unperturbed conic around a fixed point; `orbit` holds the elements at
/// simulation time `epoch`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeplerPath {
    pub orbit: OrbitData,
    pub center: NVec3,
    pub epoch: f64,
}

impl KeplerPath {
    pub fn new(orbit: OrbitData, center: NVec3, epoch: f64) -> Self {
        Self { orbit, center, epoch }
    }

    fn state(&self, t: f64) -> (NVec3, NVec3) {
        self.orbit.propagate(t - self.epoch).to_state()
    }
}

impl FixedMotion for KeplerPath {
    fn position(&self, t: f64) -> NVec3 {
        self.center + self.state(t).0
    }

    fn velocity(&self, t: f64) -> NVec3 {
        self.state(t).1
    }
}

/// Path given by caller-supplied closures
pub struct FixedPath<P, V> {
    position: P,
    velocity: V,
}

impl<P, V> FixedPath<P, V>
where
    P: Fn(f64) -> NVec3 + Send + Sync,
    V: Fn(f64) -> NVec3 + Send + Sync,
{
    pub fn new(position: P, velocity: V) -> Self {
        Self { position, velocity }
    }
}

impl<P, V> FixedMotion for FixedPath<P, V>
where
    P: Fn(f64) -> NVec3 + Send + Sync,
    V: Fn(f64) -> NVec3 + Send + Sync,
{
    fn position(&self, t: f64) -> NVec3 {
        (self.position)(t)
    }

    fn velocity(&self, t: f64) -> NVec3 {
        (self.velocity)(t)
    }
}
