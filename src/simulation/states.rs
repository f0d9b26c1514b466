//! Core state types for the N-body simulation.
//!
//! - `BodyArrays`      dense mass / position / flag arrays for massive bodies
//! - `SimTimes`        elapsed physics time per evolvable category
//! - `SimulationState` arrays + active integrator + massless sub-engine
//! - `BodyRegistry`    stable `BodyId` handles -> storage slots
//!
//! Velocities of massive bodies live inside the integrator (each variant keeps
//! its own auxiliary arrays next to them). Arrays are sized to a capacity that
//! is always >= the body count and only grow, so indices 0..n never move
//! because of growth.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use log::debug;
use nalgebra::Vector3;

use crate::simulation::error::{SimError, SimResult};
use crate::simulation::fixed::FixedMotion;
use crate::simulation::integrator::Integrator;
use crate::simulation::massless::{MasslessEngine, Propulsion};
use crate::simulation::math::steps_within;

pub type NVec3 = Vector3<f64>;

/// Opaque handle handed out on registration. Stays valid until the body is
/// removed, even when removal of other bodies shuffles storage indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(pub u64);

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a body currently lives inside a `SimulationState`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Massive(usize),
    Massless(usize),
}

/// Handle -> slot map. Removal shuffles storage down, so every later slot of
/// the same category is rewritten to keep handles pointing at their body
#[derive(Debug, Clone, Default)]
pub struct BodyRegistry {
    slots: BTreeMap<BodyId, Slot>,
    next: u64,
}

impl BodyRegistry {
    pub fn insert(&mut self, slot: Slot) -> BodyId {
        let id = BodyId(self.next);
        self.next += 1;
        self.slots.insert(id, slot);
        id
    }

    pub fn slot(&self, id: BodyId) -> SimResult<Slot> {
        self.slots.get(&id).copied().ok_or(SimError::UnknownBody(id))
    }

    pub fn contains(&self, id: BodyId) -> bool {
        self.slots.contains_key(&id)
    }

    /// Forget `id` and rewrite the slots that shuffle down after it
    pub fn remove(&mut self, id: BodyId) -> SimResult<Slot> {
        let removed = self.slots.remove(&id).ok_or(SimError::UnknownBody(id))?;
        for slot in self.slots.values_mut() {
            *slot = match (*slot, removed) {
                (Slot::Massive(i), Slot::Massive(k)) if i > k => Slot::Massive(i - 1),
                (Slot::Massless(i), Slot::Massless(k)) if i > k => Slot::Massless(i - 1),
                (other, _) => other,
            };
        }
        Ok(removed)
    }

    /// Handles in registration order
    pub fn iter(&self) -> impl Iterator<Item = (BodyId, Slot)> + '_ {
        self.slots.iter().map(|(id, slot)| (*id, *slot))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drop every handle; ids are never reused
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyFlags {
    pub active: bool, // inactive bodies are skipped in force sums and frozen
    pub fixed: bool,  // position comes from a FixedMotion, never integrated
}

impl Default for BodyFlags {
    fn default() -> Self {
        Self { active: true, fixed: false }
    }
}

/// Dense storage for massive bodies
#[derive(Clone)]
pub struct BodyArrays {
    pub m: Vec<f64>,     // physics mass (world mass * mass_scale)
    pub r: Vec<NVec3>,   // position
    pub flags: Vec<BodyFlags>,
    pub fixed: Vec<Option<Arc<dyn FixedMotion>>>,
    n: usize,
}

impl BodyArrays {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            m: vec![0.0; capacity],
            r: vec![NVec3::zeros(); capacity],
            flags: vec![BodyFlags::default(); capacity],
            fixed: vec![None; capacity],
            n: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn capacity(&self) -> usize {
        self.m.len()
    }

    /// Active and not on a fixed path: the integrator owns its motion
    pub fn is_movable(&self, i: usize) -> bool {
        let f = self.flags[i];
        f.active && !f.fixed
    }

    pub fn is_active(&self, i: usize) -> bool {
        self.flags[i].active
    }

    /// Reallocate every array to `capacity`, copying existing entries
    pub(crate) fn grow_to(&mut self, capacity: usize) {
        if capacity <= self.capacity() {
            return;
        }
        self.m.resize(capacity, 0.0);
        self.r.resize(capacity, NVec3::zeros());
        self.flags.resize(capacity, BodyFlags::default());
        self.fixed.resize(capacity, None);
    }

    /// Append a body; the caller has already ensured spare capacity
    pub(crate) fn push(&mut self, m: f64, r: NVec3, fixed: Option<Arc<dyn FixedMotion>>) -> usize {
        let i = self.n;
        self.m[i] = m;
        self.r[i] = r;
        self.flags[i] = BodyFlags { active: true, fixed: fixed.is_some() };
        self.fixed[i] = fixed;
        self.n += 1;
        i
    }

    /// Remove by shuffling later bodies down one slot
    pub(crate) fn remove_at(&mut self, i: usize) {
        for j in i..self.n - 1 {
            self.m[j] = self.m[j + 1];
            self.r[j] = self.r[j + 1];
            self.flags[j] = self.flags[j + 1];
            self.fixed[j] = self.fixed[j + 1].take();
        }
        self.n -= 1;
        let last = self.n;
        self.m[last] = 0.0;
        self.r[last] = NVec3::zeros();
        self.flags[last] = BodyFlags::default();
        self.fixed[last] = None;
    }

    /// Move every active fixed body to where its path puts it at `t`
    pub fn update_fixed(&mut self, t: f64) {
        for i in 0..self.n {
            if !self.flags[i].active {
                continue;
            }
            if let Some(path) = &self.fixed[i] {
                self.r[i] = path.position(t);
            }
        }
    }

    pub fn fixed_velocity(&self, i: usize, t: f64) -> Option<NVec3> {
        self.fixed[i].as_ref().map(|path| path.velocity(t))
    }
}

/// Elapsed physics time per evolvable category
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimTimes {
    pub massive: f64,
    pub massless: f64,
    pub fixed: f64,
}

/// A complete, independently evolvable simulation: storage, integrator and
/// massless engine. `clone()` is a deep copy; the clone shares no buffers
/// with the original (fixed paths are immutable and shared by `Arc`)
#[derive(Clone)]
pub struct SimulationState {
    pub bodies: BodyArrays,
    pub times: SimTimes,
    integrator: Box<dyn Integrator>,
    massless: MasslessEngine,
    growth: usize,
}

impl SimulationState {
    pub fn new(
        integrator: Box<dyn Integrator>,
        massless: MasslessEngine,
        capacity: usize,
        growth: usize,
    ) -> SimResult<Self> {
        let bodies = BodyArrays::with_capacity(capacity);
        let mut integrator = integrator;
        integrator.setup(&bodies, &[])?;
        Ok(Self {
            bodies,
            times: SimTimes::default(),
            integrator,
            massless,
            growth: growth.max(1),
        })
    }

    /// Current physics time of the authoritative (massive) time line
    pub fn time(&self) -> f64 {
        self.times.massive
    }

    /// Internal step of the active integrator; evolution is chunked by it
    pub fn step_size(&self) -> f64 {
        self.integrator.nominal_step()
    }

    pub fn integrator_name(&self) -> &'static str {
        self.integrator.name()
    }

    pub fn massive_len(&self) -> usize {
        self.bodies.len()
    }

    pub fn massless_len(&self) -> usize {
        self.massless.len()
    }

    pub fn massless(&self) -> &MasslessEngine {
        &self.massless
    }

    // =====================================================================================
    // massive bodies
    // =====================================================================================

    pub fn add_massive(
        &mut self,
        m: f64,
        r: NVec3,
        v: NVec3,
        fixed: Option<Arc<dyn FixedMotion>>,
    ) -> SimResult<usize> {
        let index = self.bodies.len();
        if fixed.is_some() && !self.integrator.supports_fixed() {
            return Err(SimError::config(format!(
                "{} integrator cannot carry fixed-path bodies",
                self.integrator.name()
            )));
        }
        if index == self.bodies.capacity() {
            let capacity = self.bodies.capacity() + self.growth;
            self.integrator.grow_arrays(capacity)?;
            self.bodies.grow_to(capacity);
            debug!("massive storage grown to {capacity}");
        }
        self.integrator.add_body(index, v)?;
        let t = self.times.fixed;
        let r = fixed.as_ref().map_or(r, |path| path.position(t));
        let index = self.bodies.push(m, r, fixed);
        self.massless.invalidate();
        Ok(index)
    }

    pub fn remove_massive(&mut self, i: usize) -> SimResult<()> {
        self.check_massive(i)?;
        self.integrator.remove_body_at(i, self.bodies.len())?;
        self.bodies.remove_at(i);
        self.massless.invalidate();
        Ok(())
    }

    pub fn set_massive_active(&mut self, i: usize, active: bool) -> SimResult<()> {
        self.check_massive(i)?;
        self.integrator.set_active(i, active)?;
        self.bodies.flags[i].active = active;
        self.massless.invalidate();
        Ok(())
    }

    pub fn massive_position(&self, i: usize) -> NVec3 {
        self.bodies.r[i]
    }

    pub fn massive_velocity(&self, i: usize) -> NVec3 {
        self.bodies
            .fixed_velocity(i, self.times.fixed)
            .unwrap_or_else(|| self.integrator.velocity(i))
    }

    pub fn set_massive_velocity(&mut self, i: usize, v: NVec3) -> SimResult<()> {
        self.check_massive(i)?;
        if self.bodies.flags[i].fixed {
            return Err(SimError::config("fixed-path bodies cannot take a velocity change"));
        }
        self.integrator.set_velocity(i, v);
        Ok(())
    }

    pub fn set_massive_position(&mut self, i: usize, r: NVec3) -> SimResult<()> {
        self.check_massive(i)?;
        if self.bodies.flags[i].fixed {
            return Err(SimError::config("fixed-path bodies cannot be moved"));
        }
        self.bodies.r[i] = r;
        self.integrator.invalidate();
        self.massless.invalidate();
        Ok(())
    }

    pub fn set_massive_mass(&mut self, i: usize, m: f64) -> SimResult<()> {
        self.check_massive(i)?;
        self.bodies.m[i] = m;
        self.integrator.invalidate();
        self.massless.invalidate();
        Ok(())
    }

    fn check_massive(&self, i: usize) -> SimResult<()> {
        if i < self.bodies.len() {
            Ok(())
        } else {
            Err(SimError::config(format!("massive index {i} out of range")))
        }
    }

    // =====================================================================================
    // massless bodies
    // =====================================================================================

    pub fn add_massless(
        &mut self,
        r: NVec3,
        v: NVec3,
        propulsion: Option<Arc<dyn Propulsion>>,
    ) -> usize {
        self.massless.add(r, v, propulsion)
    }

    pub fn remove_massless(&mut self, i: usize) -> SimResult<()> {
        self.check_massless(i)?;
        self.massless.remove_at(i);
        Ok(())
    }

    pub fn set_massless_active(&mut self, i: usize, active: bool) -> SimResult<()> {
        self.check_massless(i)?;
        self.massless.set_active(i, active);
        Ok(())
    }

    pub fn massless_position(&self, i: usize) -> NVec3 {
        self.massless.position(i)
    }

    pub fn massless_velocity(&self, i: usize) -> NVec3 {
        self.massless.velocity(i)
    }

    pub fn set_massless_velocity(&mut self, i: usize, v: NVec3) -> SimResult<()> {
        self.check_massless(i)?;
        self.massless.set_velocity(i, v);
        Ok(())
    }

    pub fn set_massless_position(&mut self, i: usize, r: NVec3) -> SimResult<()> {
        self.check_massless(i)?;
        self.massless.set_position(i, r);
        Ok(())
    }

    fn check_massless(&self, i: usize) -> SimResult<()> {
        if i < self.massless.len() {
            Ok(())
        } else {
            Err(SimError::config(format!("massless index {i} out of range")))
        }
    }

    // =====================================================================================
    // slot-addressed access, used by maneuvers and outputs
    // =====================================================================================

    pub fn position(&self, slot: Slot) -> NVec3 {
        match slot {
            Slot::Massive(i) => self.massive_position(i),
            Slot::Massless(i) => self.massless_position(i),
        }
    }

    pub fn velocity(&self, slot: Slot) -> NVec3 {
        match slot {
            Slot::Massive(i) => self.massive_velocity(i),
            Slot::Massless(i) => self.massless_velocity(i),
        }
    }

    pub fn set_velocity(&mut self, slot: Slot, v: NVec3) -> SimResult<()> {
        match slot {
            Slot::Massive(i) => self.set_massive_velocity(i, v),
            Slot::Massless(i) => self.set_massless_velocity(i, v),
        }
    }

    pub fn set_position(&mut self, slot: Slot, r: NVec3) -> SimResult<()> {
        match slot {
            Slot::Massive(i) => self.set_massive_position(i, r),
            Slot::Massless(i) => self.set_massless_position(i, r),
        }
    }

    /// Physics mass of the body (massless bodies report zero)
    pub fn mass(&self, slot: Slot) -> f64 {
        match slot {
            Slot::Massive(i) => self.bodies.m[i],
            Slot::Massless(_) => 0.0,
        }
    }

    pub fn is_active(&self, slot: Slot) -> bool {
        match slot {
            Slot::Massive(i) => self.bodies.is_active(i),
            Slot::Massless(i) => self.massless.is_active(i),
        }
    }

    pub fn is_fixed(&self, slot: Slot) -> bool {
        match slot {
            Slot::Massive(i) => self.bodies.flags[i].fixed,
            Slot::Massless(_) => false,
        }
    }

    // =====================================================================================
    // evolution
    // =====================================================================================

    /// Seed accelerations (and fixed positions) so the first step does not
    /// start from stale data
    pub fn pre_evolve(&mut self) {
        let t = self.times.massive;
        self.bodies.update_fixed(t);
        self.times.fixed = t;
        self.integrator.pre_evolve(t, &mut self.bodies);
        self.massless.pre_evolve(t, &self.bodies);
    }

    /// Advance by whole internal steps up to (never past) `target`.
    /// Owed time below one step is left to accumulate. Returns time advanced
    pub fn evolve_to(&mut self, target: f64) -> f64 {
        let h = self.step_size();
        let start = self.times.massive;
        let steps = steps_within(target - start, h);
        for _ in 0..steps {
            self.advance(h, false);
        }
        self.times.massive - start
    }

    /// Advance to exactly `target`, finishing with one short step if needed
    pub fn evolve_exact_to(&mut self, target: f64) -> f64 {
        let start = self.times.massive;
        if target <= start {
            return 0.0;
        }
        let h = self.step_size();
        let steps = steps_within(target - start, h);
        for _ in 0..steps {
            self.advance(h, false);
        }
        let rest = target - self.times.massive;
        if rest > h * 1e-9 {
            self.advance(rest, true);
        }
        // pin the counters so repeated exact landings do not drift
        self.times.massive = target;
        self.times.fixed = target;
        self.times.massless = target;
        target - start
    }

    fn advance(&mut self, dt: f64, exact: bool) {
        let t = self.times.massive;
        let done = if exact {
            self.integrator.evolve_exact(t, dt, &mut self.bodies)
        } else {
            self.integrator.evolve(t, dt, &mut self.bodies)
        };
        self.times.massive += done;
        self.times.fixed = self.times.massive;

        let tm = self.times.massless;
        let owed = self.times.massive - tm;
        let done_massless = if exact {
            self.massless.evolve_exact(tm, owed, &self.bodies)
        } else {
            self.massless.evolve(tm, owed, &self.bodies)
        };
        self.times.massless += done_massless;
    }

    /// Total energy of the massive bodies (kinetic + force-law potential)
    pub fn energy(&self) -> f64 {
        self.integrator.energy(&self.bodies)
    }

    /// Swap in another integrator, carrying the current velocities over
    pub fn replace_integrator(&mut self, integrator: Box<dyn Integrator>) -> SimResult<()> {
        let velocities: Vec<NVec3> = (0..self.bodies.len())
            .map(|i| self.integrator.velocity(i))
            .collect();
        let mut integrator = integrator;
        if self.bodies.flags[..self.bodies.len()].iter().any(|f| f.fixed) && !integrator.supports_fixed() {
            return Err(SimError::config(format!(
                "{} integrator cannot carry fixed-path bodies",
                integrator.name()
            )));
        }
        integrator.setup(&self.bodies, &velocities)?;
        let h = integrator.nominal_step();
        self.integrator = integrator;
        self.massless.set_step(h);
        self.pre_evolve();
        Ok(())
    }

    /// Check the integrator accepts the current body set (regularized needs exactly 3)
    pub fn validate(&self) -> SimResult<()> {
        self.integrator.validate(&self.bodies)
    }
}
