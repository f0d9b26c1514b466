//! Discrete velocity changes and the time-ordered queue that holds them
//!
//! A maneuver is applied instantaneously at its trigger time. The queue is
//! kept sorted by time; equal times keep submission order, so draining is a
//! stable pop from the front.

use std::collections::VecDeque;
use std::fmt;

use log::{debug, warn};

use crate::simulation::driver::RequestQueue;
use crate::simulation::error::{SimError, SimResult};
use crate::simulation::math::SMALL;
use crate::simulation::orbit::RADIAL_RATIO;
use crate::simulation::states::{BodyId, BodyRegistry, NVec3, SimulationState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManeuverId(pub u64);

impl fmt::Display for ManeuverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ManeuverKind {
    /// Add a fixed velocity delta
    Vector { dv: NVec3 },
    /// Add `dv` along the current velocity (negative slows down)
    Scalar { dv: f64 },
    /// Replace velocity with the circular-orbit velocity around `center`,
    /// keeping the current orbital plane
    Circularize { center: BodyId },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Maneuver {
    pub time: f64,
    pub target: BodyId,
    pub kind: ManeuverKind,
}

impl Maneuver {
    pub fn vector(time: f64, target: BodyId, dv: NVec3) -> Self {
        Self { time, target, kind: ManeuverKind::Vector { dv } }
    }

    pub fn scalar(time: f64, target: BodyId, dv: f64) -> Self {
        Self { time, target, kind: ManeuverKind::Scalar { dv } }
    }

    pub fn circularize(time: f64, target: BodyId, center: BodyId) -> Self {
        Self { time, target, kind: ManeuverKind::Circularize { center } }
    }

    /// Same maneuver with time multiplied by `time_factor` and velocity
    /// payloads divided by it (world <-> physics unit conversion)
    pub fn rescaled(&self, time_factor: f64) -> Self {
        let kind = match self.kind {
            ManeuverKind::Vector { dv } => ManeuverKind::Vector { dv: dv / time_factor },
            ManeuverKind::Scalar { dv } => ManeuverKind::Scalar { dv: dv / time_factor },
            circularize => circularize,
        };
        Self { time: self.time * time_factor, target: self.target, kind }
    }

    /// Velocity after the maneuver given the target's current velocity.
    /// `center` is (position, velocity, mu) of the circularization centre
    pub fn resulting_velocity(
        &self,
        r: &NVec3,
        v: &NVec3,
        center: Option<(NVec3, NVec3, f64)>,
    ) -> SimResult<NVec3> {
        match self.kind {
            ManeuverKind::Vector { dv } => Ok(v + dv),
            ManeuverKind::Scalar { dv } => v
                .try_normalize(SMALL)
                .map(|dir| v + dv * dir)
                .ok_or(SimError::DegenerateOrbit),
            ManeuverKind::Circularize { .. } => {
                let (r_c, v_c, mu) = center.ok_or(SimError::DegenerateOrbit)?;
                circular_velocity(&(r - r_c), &(v - v_c), mu).map(|v_rel| v_c + v_rel)
            }
        }
    }

    /// Apply to `state`, reading the exact current state of target and centre
    pub fn apply(&self, state: &mut SimulationState, registry: &BodyRegistry) -> SimResult<()> {
        let slot = registry.slot(self.target)?;
        let center = match self.kind {
            ManeuverKind::Circularize { center } => {
                let c = registry.slot(center)?;
                Some((state.position(c), state.velocity(c), state.mass(c)))
            }
            _ => None,
        };
        let v = self.resulting_velocity(&state.position(slot), &state.velocity(slot), center)?;
        state.set_velocity(slot, v)
    }
}

/// Velocity (relative to the centre) of a circular orbit through `r_rel`
/// in the plane spanned by `r_rel` and `v_rel`
pub fn circular_velocity(r_rel: &NVec3, v_rel: &NVec3, mu: f64) -> SimResult<NVec3> {
    let radius = r_rel.norm();
    let h = r_rel.cross(v_rel);
    if !(mu > 0.0) || radius == 0.0 || h.norm() <= RADIAL_RATIO * radius * v_rel.norm() {
        return Err(SimError::DegenerateOrbit);
    }
    let direction = h.cross(r_rel).normalize();
    Ok((mu / radius).sqrt() * direction)
}

/// Called once after a maneuver executes. Driver mutations go through the
/// request queue and are applied after the step
pub type CompletionFn = Box<dyn FnMut(&Maneuver, &mut RequestQueue) + Send>;

pub struct DueManeuver {
    pub id: ManeuverId,
    pub maneuver: Maneuver,
    pub on_complete: Option<CompletionFn>,
}

#[derive(Default)]
pub struct ManeuverQueue {
    pending: VecDeque<DueManeuver>,
    next_id: u64,
}

impl ManeuverQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Insert after every maneuver with time <= `maneuver.time`
    pub fn push(&mut self, maneuver: Maneuver, on_complete: Option<CompletionFn>) -> ManeuverId {
        let id = ManeuverId(self.next_id);
        self.next_id += 1;
        let at = self.pending.partition_point(|p| p.maneuver.time <= maneuver.time);
        self.pending.insert(at, DueManeuver { id, maneuver, on_complete });
        id
    }

    pub fn cancel(&mut self, id: ManeuverId) -> SimResult<Maneuver> {
        let at = self
            .pending
            .iter()
            .position(|p| p.id == id)
            .ok_or(SimError::UnknownManeuver(id))?;
        self.pending
            .remove(at)
            .map(|p| p.maneuver)
            .ok_or(SimError::UnknownManeuver(id))
    }

    /// Trigger time of the earliest maneuver
    pub fn next_time(&self) -> Option<f64> {
        self.pending.front().map(|p| p.maneuver.time)
    }

    /// Take the earliest maneuver if it triggers at or before `until`
    pub fn pop_due(&mut self, until: f64) -> Option<DueManeuver> {
        if self.next_time()? <= until {
            self.pending.pop_front()
        } else {
            None
        }
    }

    /// Evolve `state` up to `target`, landing exactly on every maneuver due
    /// by then, applying it and handing it to `executed` together with how
    /// late it ran (0 unless it was scheduled in the past).
    ///
    /// The final stretch after the last maneuver is whole steps only, so the
    /// state never passes `target`
    pub fn run_until(
        &mut self,
        state: &mut SimulationState,
        registry: &BodyRegistry,
        target: f64,
        mut executed: impl FnMut(DueManeuver, f64),
    ) {
        while let Some(due) = self.pop_due(target) {
            let time = due.maneuver.time;
            let late = (state.time() - time).max(0.0);
            if late == 0.0 {
                state.evolve_exact_to(time);
            }
            match due.maneuver.apply(state, registry) {
                Ok(()) => debug!("maneuver {} on {} at t = {time:.6}", due.id, due.maneuver.target),
                Err(e) => warn!("maneuver {} on {} skipped: {e}", due.id, due.maneuver.target),
            }
            executed(due, late);
        }
        state.evolve_to(target);
    }

    /// Drop every maneuver that targets or circularizes around `body`
    pub fn remove_for_body(&mut self, body: BodyId) -> usize {
        let before = self.pending.len();
        self.pending.retain(|p| {
            let m = &p.maneuver;
            let centered = matches!(m.kind, ManeuverKind::Circularize { center } if center == body);
            m.target != body && !centered
        });
        before - self.pending.len()
    }

    /// Copy of the schedule without completion callbacks
    pub fn snapshot(&self) -> ManeuverQueue {
        ManeuverQueue {
            pending: self
                .pending
                .iter()
                .map(|p| DueManeuver { id: p.id, maneuver: p.maneuver, on_complete: None })
                .collect(),
            next_id: self.next_id,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ManeuverId, &Maneuver)> + '_ {
        self.pending.iter().map(|p| (p.id, &p.maneuver))
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
