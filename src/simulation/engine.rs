//! High-level runtime engine settings
//!
//! Selects the integration algorithm, force law, sub-steps per tick, time zoom
//! and the trajectory look-ahead used when building and running a driver

use serde::Deserialize;

use crate::simulation::error::{SimError, SimResult};
use crate::simulation::forces::ForceLaw;
use crate::simulation::trajectory::TrajectorySettings;

/// Which integrator advances the massive bodies
/// integrator: "leapfrog" | "hermite" | "regularized"
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    #[serde(rename = "leapfrog")] // fixed-step kick-drift-kick, symplectic
    #[default]
    Leapfrog,

    #[serde(rename = "hermite")] // adaptive 4th-order predictor-corrector
    Hermite,

    #[serde(rename = "regularized")] // three bodies only, survives near-collisions
    Regularized,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub algorithm: Algorithm,
    pub force: ForceLaw,
    pub steps_per_tick: u32,       // internal steps per nominal tick for fixed-step variants
    pub time_zoom: f64,            // user multiplier on physics time owed per tick
    pub corrector_iterations: u32, // Hermite evaluate-correct passes per step
    pub trajectory: TrajectorySettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Leapfrog,
            force: ForceLaw::InverseSquare,
            steps_per_tick: 8,
            time_zoom: 1.0,
            corrector_iterations: 1,
            trajectory: TrajectorySettings::default(),
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> SimResult<()> {
        if self.steps_per_tick == 0 {
            return Err(SimError::config("steps per tick must be at least 1"));
        }
        if self.corrector_iterations == 0 {
            return Err(SimError::config("hermite needs at least one corrector pass"));
        }
        if !(self.time_zoom >= 0.0) {
            return Err(SimError::config("time zoom must not be negative"));
        }
        if self.algorithm == Algorithm::Regularized && self.force != ForceLaw::InverseSquare {
            return Err(SimError::config("regularized integrator requires the inverse-square law"));
        }
        self.trajectory.validate()
    }
}
