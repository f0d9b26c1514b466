//! Configuration types for loading simulation scenarios from YAML.
//!
//! This module defines a thin, `serde`-deserializable representation of a
//! simulation scenario. A scenario consists of:
//!
//! - [`EngineConfig`]     – integrator, force law, steps per tick, time zoom
//! - [`ParametersConfig`] – unit scales and numerical parameters
//! - [`TrajectorySettings`] – optional look-ahead prediction
//! - [`BodyConfig`]       – initial state for each body
//! - [`ManeuverConfig`]   – burns scheduled up front
//! - [`ScenarioConfig`]   – top-level wrapper used to load a scenario from YAML
//!
//! # YAML format
//!
//! ```yaml
//! engine:
//!   integrator: "leapfrog"    # or "hermite", "regularized"
//!   force: "inverse_square"   # inverse_r, inverse_r3, linear, quadratic
//!   steps_per_tick: 8
//!   time_zoom: 1.0
//!   corrector_iterations: 1   # Hermite only
//!
//! parameters:
//!   tick_interval: 0.02       # nominal wall seconds per tick
//!   mass_scale: 1.0           # world mass -> physics mass (G folded in)
//!   time_scale: 1.0           # world seconds -> physics time
//!   softening: 1.0e-4
//!   accuracy: 0.02            # Hermite eta
//!   headroom: 10              # spare body slots
//!
//! trajectory:
//!   enabled: true
//!   lookahead: 5.0
//!   budget: 0.5
//!   record_interval: 0.1
//!
//! bodies:
//!   - name: sun
//!     m: 1.0
//!   - name: probe
//!     kind: massless
//!     orbit: { around: sun, a: 1.0, ecc: 0.2 }
//!   - name: moon
//!     kind: fixed
//!     m: 1.0e-3
//!     orbit: { around: sun, a: 3.0 }
//!
//! maneuvers:
//!   - { type: circularize, target: probe, time: 1.5, center: sun }
//!   - { type: scalar, target: probe, time: 4.0, dv: 0.1 }
//! ```
//!
//! [`crate::simulation::scenario::Scenario::build_scenario`] maps this
//! configuration onto a ready `SimulationDriver`.

use serde::Deserialize;

use crate::simulation::engine::Algorithm;
use crate::simulation::forces::ForceLaw;
use crate::simulation::trajectory::TrajectorySettings;

/// Engine-level options; anything left out keeps its default
#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub integrator: Algorithm,             // which integrator advances the massive bodies
    pub force: ForceLaw,                   // force law shared by every integrator
    pub steps_per_tick: Option<u32>,       // internal steps per nominal tick
    pub time_zoom: Option<f64>,            // multiplier on physics time per tick
    pub corrector_iterations: Option<u32>, // Hermite P(EC)^n passes
}

/// Unit scales and numerical parameters; missing values keep their defaults
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct ParametersConfig {
    pub tick_interval: Option<f64>,
    pub mass_scale: Option<f64>,
    pub time_scale: Option<f64>,
    pub softening: Option<f64>,
    pub accuracy: Option<f64>,
    pub headroom: Option<usize>,
}

/// How a body is simulated
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BodyKind {
    #[default]
    Massive, // integrated, pulls on everything
    Massless, // integrated, pulls on nothing
    Fixed,    // follows a Keplerian path (or stays put), pulls on everything
}

/// Classical elements about an earlier body, angles in degrees
#[derive(Deserialize, Debug, Clone)]
pub struct OrbitConfig {
    pub around: String,
    pub a: f64,
    #[serde(default)]
    pub ecc: f64,
    #[serde(default)]
    pub inclination: f64,
    #[serde(default)]
    pub node: f64,
    #[serde(default)]
    pub arg_periapsis: f64,
    #[serde(default)]
    pub true_anomaly: f64,
}

/// Configuration for a single body's initial state
#[derive(Deserialize, Debug, Clone)]
pub struct BodyConfig {
    pub name: String,
    #[serde(default)]
    pub kind: BodyKind,
    #[serde(default)]
    pub m: f64, // world mass, ignored for massless bodies
    #[serde(default)]
    pub x: [f64; 3], // position (offset from the parent when `orbit` is set)
    #[serde(default)]
    pub v: [f64; 3], // velocity in world units (offset from the orbit velocity)
    pub orbit: Option<OrbitConfig>,
}

/// A burn scheduled when the scenario is built; times in world seconds
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ManeuverConfig {
    Vector { target: String, time: f64, dv: [f64; 3] },
    Scalar { target: String, time: f64, dv: f64 },
    Circularize { target: String, time: f64, center: String },
}

/// Top-level scenario configuration loaded from YAML.
#[derive(Deserialize, Debug)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub parameters: ParametersConfig,
    #[serde(default)]
    pub trajectory: TrajectorySettings,
    pub bodies: Vec<BodyConfig>,
    #[serde(default)]
    pub maneuvers: Vec<ManeuverConfig>,
}
