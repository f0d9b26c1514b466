//! Numerical and physical parameters for the simulation
//!
//! `Parameters` holds runtime settings:
//! - nominal tick interval and the unit scales (`mass_scale`, `time_scale`),
//! - softening for close encounters,
//! - accuracy knob for the adaptive integrator,
//! - storage headroom and growth increment

use crate::simulation::error::{SimError, SimResult};

#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    pub tick_interval: f64, // nominal wall seconds per tick, sets the internal step
    pub mass_scale: f64,    // world mass -> physics mass (G folded in)
    pub time_scale: f64,    // world seconds -> physics time
    pub softening: f64,     // epsilon added in quadrature to separations
    pub accuracy: f64,      // Hermite eta (Aarseth step criterion)
    pub headroom: usize,    // spare slots allocated at setup and per growth
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            tick_interval: 0.02,
            mass_scale: 1.0,
            time_scale: 1.0,
            softening: 1e-4,
            accuracy: 0.02,
            headroom: 10,
        }
    }
}

impl Parameters {
    /// Reject scales and steps the engine cannot run with
    pub fn validate(&self) -> SimResult<()> {
        if !(self.mass_scale > 0.0) {
            return Err(SimError::config("mass scale must be positive"));
        }
        if !(self.time_scale > 0.0) {
            return Err(SimError::config("time scale must be positive"));
        }
        if !(self.tick_interval > 0.0) {
            return Err(SimError::config("tick interval must be positive"));
        }
        if !(self.softening >= 0.0) {
            return Err(SimError::config("softening must not be negative"));
        }
        if !(self.accuracy > 0.0) {
            return Err(SimError::config("accuracy must be positive"));
        }
        Ok(())
    }

    /// Fixed internal step for `steps_per_tick` sub-steps of one nominal tick
    pub fn step_size(&self, steps_per_tick: u32) -> f64 {
        self.tick_interval * self.time_scale / f64::from(steps_per_tick.max(1))
    }
}
