//! Look-ahead trajectory prediction
//!
//! The predictor owns a deep clone of the world state and runs it ahead of
//! the present, sampling positions into per-body paths. It never touches the
//! world: any outside mutation of the world marks it stale and the next
//! advance throws the clone away and starts again from a fresh copy.
//! Pending maneuvers are copied (without callbacks) and executed on the
//! clone, so planned burns show up in the predicted paths.

use std::collections::{BTreeMap, VecDeque};

use log::debug;
use serde::Deserialize;

use crate::simulation::error::{SimError, SimResult};
use crate::simulation::maneuver::ManeuverQueue;
use crate::simulation::states::{BodyId, BodyRegistry, NVec3, SimulationState};

/// Look-ahead configuration, times in world seconds
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct TrajectorySettings {
    pub enabled: bool,
    pub lookahead: f64,       // how far ahead of the world to predict
    pub budget: f64,          // most prediction time computed in one tick
    pub record_interval: f64, // spacing of recorded path points
}

impl Default for TrajectorySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            lookahead: 10.0,
            budget: 1.0,
            record_interval: 0.05,
        }
    }
}

impl TrajectorySettings {
    pub fn validate(&self) -> SimResult<()> {
        if !(self.lookahead >= 0.0) {
            return Err(SimError::config("trajectory lookahead must not be negative"));
        }
        if !(self.budget > 0.0) {
            return Err(SimError::config("trajectory budget must be positive"));
        }
        if !(self.record_interval > 0.0) {
            return Err(SimError::config("trajectory record interval must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryPoint {
    pub time: f64, // physics time of the sample
    pub position: NVec3,
}

/// Predicted copy of the world plus the paths sampled from it
pub struct TrajectoryPredictor {
    state: Option<SimulationState>,
    maneuvers: ManeuverQueue,
    registry: BodyRegistry,
    paths: BTreeMap<BodyId, VecDeque<TrajectoryPoint>>,
    next_record: f64,
    stale: bool,
    rebuilds: u64,
}

impl Default for TrajectoryPredictor {
    fn default() -> Self {
        Self {
            state: None,
            maneuvers: ManeuverQueue::new(),
            registry: BodyRegistry::default(),
            paths: BTreeMap::new(),
            next_record: 0.0,
            stale: true,
            rebuilds: 0,
        }
    }
}

impl TrajectoryPredictor {
    pub fn new() -> Self {
        Self::default()
    }

    /// The world changed outside a normal step; rebuild before advancing
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Drop the clone and every recorded point
    pub fn discard(&mut self) {
        self.state = None;
        self.maneuvers.clear();
        self.paths.clear();
        self.stale = true;
    }

    /// Physics time the prediction has reached
    pub fn predicted_time(&self) -> Option<f64> {
        self.state.as_ref().map(SimulationState::time)
    }

    /// Number of times the clone has been rebuilt from the world
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    pub fn path(&self, id: BodyId) -> Option<&VecDeque<TrajectoryPoint>> {
        self.paths.get(&id)
    }

    pub fn paths(&self) -> impl Iterator<Item = (BodyId, &VecDeque<TrajectoryPoint>)> + '_ {
        self.paths.iter().map(|(id, path)| (*id, path))
    }

    fn rebuild(&mut self, world: &SimulationState, maneuvers: &ManeuverQueue, registry: &BodyRegistry) {
        self.state = Some(world.clone());
        self.maneuvers = maneuvers.snapshot();
        self.registry = registry.clone();
        self.paths.clear();
        self.next_record = world.time();
        self.stale = false;
        self.rebuilds += 1;
        debug!("trajectory rebuilt from world at t = {:.6}", world.time());
    }

    /// Run the prediction toward `world_time + lookahead`, computing at most
    /// `budget` of prediction time. All arguments are physics time
    #[allow(clippy::too_many_arguments)]
    pub fn advance(
        &mut self,
        world: &SimulationState,
        maneuvers: &ManeuverQueue,
        registry: &BodyRegistry,
        lookahead: f64,
        budget: f64,
        record_interval: f64,
    ) {
        let world_time = world.time();
        let behind = self.predicted_time().map_or(true, |t| t < world_time);
        if self.stale || behind {
            self.rebuild(world, maneuvers, registry);
        }

        for path in self.paths.values_mut() {
            while path.front().is_some_and(|p| p.time < world_time) {
                path.pop_front();
            }
        }

        let Some(state) = self.state.as_mut() else {
            return;
        };
        let h = state.step_size();
        let target = (state.time() + budget).min(world_time + lookahead);
        while state.time() + h <= target + h * 1e-9 {
            let before = state.time();
            let step_end = before + h;
            self.maneuvers.run_until(state, &self.registry, step_end, |_, _| {});
            if state.time() <= before {
                break;
            }
            if state.time() >= self.next_record - h * 1e-6 {
                record(&mut self.paths, state, &self.registry);
                while self.next_record <= state.time() + h * 1e-6 {
                    self.next_record += record_interval;
                }
            }
        }
    }
}

fn record(
    paths: &mut BTreeMap<BodyId, VecDeque<TrajectoryPoint>>,
    state: &SimulationState,
    registry: &BodyRegistry,
) {
    let time = state.time();
    for (id, slot) in registry.iter() {
        if !state.is_active(slot) {
            continue;
        }
        paths
            .entry(id)
            .or_default()
            .push_back(TrajectoryPoint { time, position: state.position(slot) });
    }
}
