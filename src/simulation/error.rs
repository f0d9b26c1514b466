//! Error type shared by every simulation operation
//!
//! Capacity exhaustion never shows up here: arrays grow transparently.
//! Integration itself cannot fail; a tick that owes less than one internal
//! step is simply deferred

use std::fmt;

use crate::simulation::driver::DriverStatus;
use crate::simulation::maneuver::ManeuverId;
use crate::simulation::states::BodyId;

#[derive(Debug, Clone, PartialEq)]
pub enum SimError {
    /// Rejected configuration, nothing was advanced or mutated
    Config(String),
    /// Angular momentum below threshold, orbital angles are undefined
    DegenerateOrbit,
    /// Handle was never registered or has already been removed
    UnknownBody(BodyId),
    UnknownManeuver(ManeuverId),
    /// Tick requested before `setup()`
    NotReady(DriverStatus),
}

impl SimError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        SimError::Config(msg.into())
    }
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::Config(msg) => write!(f, "configuration error: {msg}"),
            SimError::DegenerateOrbit => {
                write!(f, "degenerate orbit: angular momentum too small for orbital elements")
            }
            SimError::UnknownBody(id) => write!(f, "unknown body {id}"),
            SimError::UnknownManeuver(id) => write!(f, "unknown maneuver {id}"),
            SimError::NotReady(status) => write!(f, "driver not ready (status {status:?})"),
        }
    }
}

impl std::error::Error for SimError {}

pub type SimResult<T> = Result<T, SimError>;
