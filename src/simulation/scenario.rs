//! Build a fully-initialized driver from configuration
//!
//! Takes a `ScenarioConfig` (YAML-facing) and produces a runtime `Scenario`
//! bundle containing:
//! - the `SimulationDriver`, already set up (bodies registered, integrators seeded)
//! - a name -> handle map for the configured bodies
//! - the handles of the maneuvers scheduled up front
//!
//! Bodies are registered in file order; an `orbit` block places a body on a
//! conic around an earlier body, using that body's physics mass as μ.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::configuration::config::{BodyConfig, BodyKind, ManeuverConfig, ScenarioConfig};
use crate::simulation::driver::SimulationDriver;
use crate::simulation::engine::EngineSettings;
use crate::simulation::error::{SimError, SimResult};
use crate::simulation::fixed::{FixedMotion, KeplerPath, Stationary};
use crate::simulation::maneuver::{Maneuver, ManeuverId};
use crate::simulation::orbit::OrbitData;
use crate::simulation::params::Parameters;
use crate::simulation::states::{BodyId, NVec3};

/// Runtime bundle constructed from a [`ScenarioConfig`]
pub struct Scenario {
    pub driver: SimulationDriver,
    pub bodies: BTreeMap<String, BodyId>,
    pub maneuvers: Vec<ManeuverId>,
}

impl Scenario {
    pub fn build_scenario(cfg: ScenarioConfig) -> SimResult<Self> {
        // Parameters (runtime) from ParametersConfig, defaults for anything missing
        let p_cfg = cfg.parameters;
        let base = Parameters::default();
        let parameters = Parameters {
            tick_interval: p_cfg.tick_interval.unwrap_or(base.tick_interval),
            mass_scale: p_cfg.mass_scale.unwrap_or(base.mass_scale),
            time_scale: p_cfg.time_scale.unwrap_or(base.time_scale),
            softening: p_cfg.softening.unwrap_or(base.softening),
            accuracy: p_cfg.accuracy.unwrap_or(base.accuracy),
            headroom: p_cfg.headroom.unwrap_or(base.headroom),
        };

        // Engine (runtime) from EngineConfig
        let e_cfg = cfg.engine;
        let defaults = EngineSettings::default();
        let settings = EngineSettings {
            algorithm: e_cfg.integrator,
            force: e_cfg.force,
            steps_per_tick: e_cfg.steps_per_tick.unwrap_or(defaults.steps_per_tick),
            time_zoom: e_cfg.time_zoom.unwrap_or(defaults.time_zoom),
            corrector_iterations: e_cfg.corrector_iterations.unwrap_or(defaults.corrector_iterations),
            trajectory: cfg.trajectory,
        };

        let mut driver = SimulationDriver::new(parameters, settings)?;
        let mut bodies = BTreeMap::new();
        for bc in &cfg.bodies {
            if bodies.contains_key(&bc.name) {
                return Err(SimError::config(format!("duplicate body name '{}'", bc.name)));
            }
            let id = register_body(&mut driver, &bodies, bc)?;
            bodies.insert(bc.name.clone(), id);
        }

        let mut maneuvers = Vec::with_capacity(cfg.maneuvers.len());
        for mc in &cfg.maneuvers {
            let maneuver = match mc {
                ManeuverConfig::Vector { target, time, dv } => {
                    Maneuver::vector(*time, lookup(&bodies, target)?, NVec3::from(*dv))
                }
                ManeuverConfig::Scalar { target, time, dv } => {
                    Maneuver::scalar(*time, lookup(&bodies, target)?, *dv)
                }
                ManeuverConfig::Circularize { target, time, center } => {
                    Maneuver::circularize(*time, lookup(&bodies, target)?, lookup(&bodies, center)?)
                }
            };
            maneuvers.push(driver.schedule_maneuver(maneuver, None)?);
        }

        driver.setup()?;
        Ok(Self { driver, bodies, maneuvers })
    }
}

fn lookup(bodies: &BTreeMap<String, BodyId>, name: &str) -> SimResult<BodyId> {
    bodies
        .get(name)
        .copied()
        .ok_or_else(|| SimError::config(format!("unknown body '{name}'")))
}

fn register_body(
    driver: &mut SimulationDriver,
    bodies: &BTreeMap<String, BodyId>,
    bc: &BodyConfig,
) -> SimResult<BodyId> {
    let ts = driver.params().time_scale;
    let offset = NVec3::from(bc.x);
    let kick = NVec3::from(bc.v);

    // Orbit (if any): elements about an earlier body, in physics units
    let orbit = match &bc.orbit {
        Some(oc) => {
            let parent = lookup(bodies, &oc.around)?;
            let mu = driver.world().mass(driver.registry().slot(parent)?);
            let elements = OrbitData::from_elements(
                oc.a,
                oc.ecc,
                oc.inclination,
                oc.node,
                oc.arg_periapsis,
                oc.true_anomaly,
                mu,
            )?;
            Some((parent, elements))
        }
        None => None,
    };

    match bc.kind {
        BodyKind::Fixed => {
            let path: Arc<dyn FixedMotion> = match orbit {
                Some((parent, elements)) => {
                    let center = driver.position(parent)? + offset;
                    Arc::new(KeplerPath::new(elements, center, driver.world().time()))
                }
                None => Arc::new(Stationary(offset)),
            };
            driver.register_fixed(bc.m, path)
        }
        kind => {
            let (x, v) = match orbit {
                Some((parent, elements)) => {
                    let (r_rel, v_rel) = elements.to_state();
                    (
                        driver.position(parent)? + r_rel + offset,
                        driver.velocity(parent)? + v_rel * ts + kick,
                    )
                }
                None => (offset, kick),
            };
            if kind == BodyKind::Massless {
                Ok(driver.register_massless(x, v, None))
            } else {
                driver.register_massive(bc.m, x, v)
            }
        }
    }
}
