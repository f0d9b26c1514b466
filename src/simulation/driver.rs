//! Simulation driver
//!
//! Owns the authoritative world state, the maneuver schedule, the handle
//! registry and the optional trajectory predictor, and advances them once
//! per external tick:
//!
//! 1. apply a pending time-zoom change,
//! 2. work out the physics time owed (wall time x zoom x time scale),
//! 3. advance the trajectory prediction within its per-tick budget,
//! 4. drain due maneuvers, landing exactly on each trigger time,
//! 5. advance the world by whole steps up to the owed time,
//! 6. push body states to the sinks,
//! 7. apply requests queued by maneuver callbacks and sinks.
//!
//! Callbacks and sinks only get a `RequestQueue`, never the driver, so they
//! cannot mutate the world mid-step; their requests run after step 6.
//!
//! Public inputs and outputs are in world units: positions are shared,
//! world velocity = physics velocity x time scale, world time = physics
//! time / time scale, physics mass = world mass x mass scale. Orbit data and
//! energy are reported in physics units.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::simulation::engine::{Algorithm, EngineSettings};
use crate::simulation::error::{SimError, SimResult};
use crate::simulation::fixed::FixedMotion;
use crate::simulation::forces::Gravity;
use crate::simulation::integrator::build_integrator;
use crate::simulation::maneuver::{CompletionFn, Maneuver, ManeuverId, ManeuverKind, ManeuverQueue};
use crate::simulation::massless::{MasslessEngine, Propulsion};
use crate::simulation::orbit::OrbitData;
use crate::simulation::params::Parameters;
use crate::simulation::states::{BodyId, BodyRegistry, NVec3, SimulationState, Slot};
use crate::simulation::trajectory::{TrajectoryPredictor, TrajectorySettings};
use crate::simulation::transfer::{self, OrbitTransfer, TransferOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverStatus {
    Uninitialized,
    Setup,
    Running,
    Paused,
}

/// State of one body after a tick, in world units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyUpdate {
    pub id: BodyId,
    pub position: NVec3,
    pub velocity: NVec3,
}

/// Consumer of per-tick body states (renderer, logger, recorder)
pub trait BodySink: Send {
    /// `time` is world time; `requests` collects any follow-up mutations
    fn push(&mut self, time: f64, updates: &[BodyUpdate], requests: &mut RequestQueue);
}

/// Mutation deferred until the current tick has finished
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    SetVelocity(BodyId, NVec3),
    SetPosition(BodyId, NVec3),
    SetActive(BodyId, bool),
    Remove(BodyId),
    Schedule(Maneuver),
}

#[derive(Debug, Default)]
pub struct RequestQueue {
    requests: Vec<Request>,
}

impl RequestQueue {
    pub fn push(&mut self, request: Request) {
        self.requests.push(request);
    }

    pub fn set_velocity(&mut self, id: BodyId, velocity: NVec3) {
        self.push(Request::SetVelocity(id, velocity));
    }

    pub fn schedule(&mut self, maneuver: Maneuver) {
        self.push(Request::Schedule(maneuver));
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    fn take(&mut self) -> Vec<Request> {
        std::mem::take(&mut self.requests)
    }
}

/// What one tick did
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TickReport {
    pub time: f64,                   // world time after the tick
    pub advanced: f64,               // physics time advanced by the world
    pub maneuvers_executed: usize,
    pub requests_applied: usize,
    pub predicted_until: Option<f64>, // world time reached by the prediction
}

pub struct SimulationDriver {
    params: Parameters,
    settings: EngineSettings,
    status: DriverStatus,
    world: SimulationState,
    registry: BodyRegistry,
    maneuvers: ManeuverQueue,
    predictor: TrajectoryPredictor,
    sinks: Vec<Box<dyn BodySink>>,
    requests: RequestQueue,
    owed_until: f64,           // physics time the world has been asked to reach
    time_zoom: f64,            // zoom in effect
    pending_zoom: Option<f64>, // applied at the next tick boundary
}

fn build_world(params: &Parameters, settings: &EngineSettings) -> SimResult<SimulationState> {
    let h = params.step_size(settings.steps_per_tick);
    let gravity = Gravity::new(settings.force, params.softening);
    let integrator = build_integrator(settings, gravity, h, params.accuracy);
    let massless = MasslessEngine::new(gravity, h);
    let headroom = params.headroom.max(1);
    SimulationState::new(integrator, massless, headroom, headroom)
}

impl SimulationDriver {
    pub fn new(params: Parameters, settings: EngineSettings) -> SimResult<Self> {
        params.validate()?;
        settings.validate()?;
        let world = build_world(&params, &settings)?;
        Ok(Self {
            time_zoom: settings.time_zoom,
            params,
            settings,
            status: DriverStatus::Uninitialized,
            world,
            registry: BodyRegistry::default(),
            maneuvers: ManeuverQueue::new(),
            predictor: TrajectoryPredictor::new(),
            sinks: Vec::new(),
            requests: RequestQueue::default(),
            owed_until: 0.0,
            pending_zoom: None,
        })
    }

    pub fn status(&self) -> DriverStatus {
        self.status
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Read-only view of the authoritative state (physics units)
    pub fn world(&self) -> &SimulationState {
        &self.world
    }

    pub fn registry(&self) -> &BodyRegistry {
        &self.registry
    }

    pub fn trajectory(&self) -> &TrajectoryPredictor {
        &self.predictor
    }

    pub fn body_count(&self) -> usize {
        self.registry.len()
    }

    /// World time in world seconds
    pub fn time(&self) -> f64 {
        self.world.time() / self.params.time_scale
    }

    pub fn time_zoom(&self) -> f64 {
        self.time_zoom
    }

    pub fn add_sink(&mut self, sink: Box<dyn BodySink>) {
        self.sinks.push(sink);
    }

    fn world_velocity(&self, v: NVec3) -> NVec3 {
        v * self.params.time_scale
    }

    fn physics_velocity(&self, v: NVec3) -> NVec3 {
        v / self.params.time_scale
    }

    fn touched(&mut self) {
        self.predictor.mark_stale();
    }

    // =====================================================================================
    // registration and per-body mutation
    // =====================================================================================

    pub fn register_massive(&mut self, mass: f64, position: NVec3, velocity: NVec3) -> SimResult<BodyId> {
        if !(mass >= 0.0) {
            return Err(SimError::config(format!("body mass must not be negative, got {mass}")));
        }
        let v = self.physics_velocity(velocity);
        let index = self.world.add_massive(mass * self.params.mass_scale, position, v, None)?;
        let id = self.registry.insert(Slot::Massive(index));
        self.touched();
        debug!("registered massive body {id} at slot {index}");
        Ok(id)
    }

    /// Register a test body; `propulsion` is evaluated in physics units
    pub fn register_massless(
        &mut self,
        position: NVec3,
        velocity: NVec3,
        propulsion: Option<Arc<dyn Propulsion>>,
    ) -> BodyId {
        let v = self.physics_velocity(velocity);
        let index = self.world.add_massless(position, v, propulsion);
        let id = self.registry.insert(Slot::Massless(index));
        self.touched();
        debug!("registered massless body {id} at slot {index}");
        id
    }

    /// Register a body whose motion follows `path` (queried with physics
    /// time, returning physics velocities)
    pub fn register_fixed(&mut self, mass: f64, path: Arc<dyn FixedMotion>) -> SimResult<BodyId> {
        if !(mass >= 0.0) {
            return Err(SimError::config(format!("body mass must not be negative, got {mass}")));
        }
        let m = mass * self.params.mass_scale;
        let index = self.world.add_massive(m, NVec3::zeros(), NVec3::zeros(), Some(path))?;
        let id = self.registry.insert(Slot::Massive(index));
        self.touched();
        debug!("registered fixed body {id} at slot {index}");
        Ok(id)
    }

    /// Remove a body; later bodies shuffle down but keep their handles.
    /// Pending maneuvers that involve the body are dropped with it
    pub fn remove_body(&mut self, id: BodyId) -> SimResult<()> {
        match self.registry.slot(id)? {
            Slot::Massive(i) => self.world.remove_massive(i)?,
            Slot::Massless(i) => self.world.remove_massless(i)?,
        }
        self.registry.remove(id)?;
        let dropped = self.maneuvers.remove_for_body(id);
        if dropped > 0 {
            debug!("dropped {dropped} maneuver(s) with removed body {id}");
        }
        self.touched();
        Ok(())
    }

    pub fn set_active(&mut self, id: BodyId, active: bool) -> SimResult<()> {
        match self.registry.slot(id)? {
            Slot::Massive(i) => self.world.set_massive_active(i, active)?,
            Slot::Massless(i) => self.world.set_massless_active(i, active)?,
        }
        self.touched();
        Ok(())
    }

    pub fn set_velocity(&mut self, id: BodyId, velocity: NVec3) -> SimResult<()> {
        let slot = self.registry.slot(id)?;
        let v = self.physics_velocity(velocity);
        self.world.set_velocity(slot, v)?;
        self.touched();
        Ok(())
    }

    pub fn set_position(&mut self, id: BodyId, position: NVec3) -> SimResult<()> {
        let slot = self.registry.slot(id)?;
        self.world.set_position(slot, position)?;
        self.touched();
        Ok(())
    }

    pub fn set_mass(&mut self, id: BodyId, mass: f64) -> SimResult<()> {
        if !(mass >= 0.0) {
            return Err(SimError::config(format!("body mass must not be negative, got {mass}")));
        }
        match self.registry.slot(id)? {
            Slot::Massive(i) => self.world.set_massive_mass(i, mass * self.params.mass_scale)?,
            Slot::Massless(_) => return Err(SimError::config("massless bodies have no mass to set")),
        }
        self.touched();
        Ok(())
    }

    pub fn position(&self, id: BodyId) -> SimResult<NVec3> {
        Ok(self.world.position(self.registry.slot(id)?))
    }

    pub fn velocity(&self, id: BodyId) -> SimResult<NVec3> {
        Ok(self.world_velocity(self.world.velocity(self.registry.slot(id)?)))
    }

    /// Position and velocity of every active, integrated body
    pub fn body_states(&self) -> Vec<BodyUpdate> {
        self.registry
            .iter()
            .filter(|&(_, slot)| self.world.is_active(slot) && !self.world.is_fixed(slot))
            .map(|(id, slot)| BodyUpdate {
                id,
                position: self.world.position(slot),
                velocity: self.world_velocity(self.world.velocity(slot)),
            })
            .collect()
    }

    // =====================================================================================
    // lifecycle
    // =====================================================================================

    /// Validate the configuration and body set and seed the integrators
    pub fn setup(&mut self) -> SimResult<()> {
        if self.status == DriverStatus::Running {
            return Err(SimError::config("pause the driver before setting it up again"));
        }
        self.params.validate()?;
        self.settings.validate()?;
        self.world.validate()?;
        self.world.pre_evolve();
        self.owed_until = self.world.time();
        self.predictor.discard();
        self.status = DriverStatus::Setup;
        info!(
            "setup: {} bodies, {} integrator, step {:.3e}",
            self.registry.len(),
            self.world.integrator_name(),
            self.world.step_size()
        );
        Ok(())
    }

    pub fn start(&mut self) -> SimResult<()> {
        match self.status {
            DriverStatus::Uninitialized => Err(SimError::NotReady(self.status)),
            DriverStatus::Running => Ok(()),
            DriverStatus::Setup | DriverStatus::Paused => {
                self.status = DriverStatus::Running;
                info!("running at t = {:.6}", self.time());
                Ok(())
            }
        }
    }

    pub fn pause(&mut self) -> SimResult<()> {
        match self.status {
            DriverStatus::Uninitialized => Err(SimError::NotReady(self.status)),
            DriverStatus::Running => {
                self.status = DriverStatus::Paused;
                info!("paused at t = {:.6}", self.time());
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Drop every body, maneuver and prediction and return to UNINITIALIZED
    pub fn clear(&mut self) -> SimResult<()> {
        self.world = build_world(&self.params, &self.settings)?;
        self.registry.clear();
        self.maneuvers.clear();
        self.predictor.discard();
        self.requests.take();
        self.owed_until = 0.0;
        self.status = DriverStatus::Uninitialized;
        info!("cleared");
        Ok(())
    }

    // =====================================================================================
    // stepping
    // =====================================================================================

    /// Advance by `wall_dt` seconds of wall time
    pub fn tick(&mut self, wall_dt: f64) -> SimResult<TickReport> {
        match self.status {
            DriverStatus::Uninitialized => return Err(SimError::NotReady(self.status)),
            DriverStatus::Setup | DriverStatus::Paused => {
                return Ok(TickReport { time: self.time(), ..TickReport::default() })
            }
            DriverStatus::Running => {}
        }

        if let Some(zoom) = self.pending_zoom.take() {
            debug!("time zoom {} -> {zoom}", self.time_zoom);
            self.time_zoom = zoom;
        }
        let ts = self.params.time_scale;
        self.owed_until += wall_dt.max(0.0) * self.time_zoom * ts;

        let trajectory = self.settings.trajectory;
        if trajectory.enabled {
            self.predictor.advance(
                &self.world,
                &self.maneuvers,
                &self.registry,
                trajectory.lookahead * ts,
                trajectory.budget * ts,
                trajectory.record_interval * ts,
            );
        }

        let start = self.world.time();
        let mut executed = 0;
        let requests = &mut self.requests;
        self.maneuvers
            .run_until(&mut self.world, &self.registry, self.owed_until, |due, late| {
                executed += 1;
                if late > 0.0 {
                    warn!(
                        "maneuver {} on {} ran {:.3e} late",
                        due.id,
                        due.maneuver.target,
                        late / ts
                    );
                }
                if let Some(mut on_complete) = due.on_complete {
                    on_complete(&due.maneuver.rescaled(1.0 / ts), requests);
                }
            });

        let time = self.time();
        if !self.sinks.is_empty() {
            let updates = self.body_states();
            for sink in self.sinks.iter_mut() {
                sink.push(time, &updates, &mut self.requests);
            }
        }

        let requests_applied = self.apply_requests();

        Ok(TickReport {
            time,
            advanced: self.world.time() - start,
            maneuvers_executed: executed,
            requests_applied,
            predicted_until: self.predictor.predicted_time().map(|t| t / ts),
        })
    }

    fn apply_requests(&mut self) -> usize {
        let requests = self.requests.take();
        let count = requests.len();
        for request in requests {
            let result = match request.clone() {
                Request::SetVelocity(id, v) => self.set_velocity(id, v),
                Request::SetPosition(id, r) => self.set_position(id, r),
                Request::SetActive(id, active) => self.set_active(id, active),
                Request::Remove(id) => self.remove_body(id),
                Request::Schedule(m) => self.schedule_maneuver(m, None).map(|_| ()),
            };
            if let Err(e) = result {
                warn!("request {request:?} rejected: {e}");
            }
        }
        count
    }

    // =====================================================================================
    // configuration
    // =====================================================================================

    fn reconfigure(&mut self, settings: EngineSettings) -> SimResult<()> {
        if self.status == DriverStatus::Running {
            return Err(SimError::config("integrator settings cannot change while running"));
        }
        settings.validate()?;
        let h = self.params.step_size(settings.steps_per_tick);
        let gravity = Gravity::new(settings.force, self.params.softening);
        let integrator = build_integrator(&settings, gravity, h, self.params.accuracy);
        self.world.replace_integrator(integrator)?;
        self.settings = settings;
        self.touched();
        info!(
            "integrator {} with step {:.3e}",
            self.world.integrator_name(),
            self.world.step_size()
        );
        Ok(())
    }

    pub fn set_algorithm(&mut self, algorithm: Algorithm) -> SimResult<()> {
        let settings = EngineSettings { algorithm, ..self.settings };
        self.reconfigure(settings)
    }

    pub fn set_steps_per_tick(&mut self, steps_per_tick: u32) -> SimResult<()> {
        let settings = EngineSettings { steps_per_tick, ..self.settings };
        self.reconfigure(settings)
    }

    /// Takes effect at the start of the next tick
    pub fn set_time_zoom(&mut self, zoom: f64) -> SimResult<()> {
        if !(zoom >= 0.0) {
            return Err(SimError::config("time zoom must not be negative"));
        }
        self.settings.time_zoom = zoom;
        self.pending_zoom = Some(zoom);
        Ok(())
    }

    pub fn set_trajectory_enabled(&mut self, enabled: bool) {
        self.settings.trajectory.enabled = enabled;
        if enabled {
            self.predictor.mark_stale();
        } else {
            self.predictor.discard();
        }
    }

    pub fn set_trajectory_settings(&mut self, trajectory: TrajectorySettings) -> SimResult<()> {
        trajectory.validate()?;
        self.settings.trajectory = trajectory;
        self.set_trajectory_enabled(trajectory.enabled);
        Ok(())
    }

    // =====================================================================================
    // queries, maneuvers, planning
    // =====================================================================================

    /// Orbit of `id` about `reference`, in physics units
    pub fn get_orbit_data(&self, id: BodyId, reference: BodyId) -> SimResult<OrbitData> {
        let body = self.registry.slot(id)?;
        let center = self.registry.slot(reference)?;
        let r = self.world.position(body) - self.world.position(center);
        let v = self.world.velocity(body) - self.world.velocity(center);
        OrbitData::from_state(&r, &v, self.world.mass(center))
    }

    /// Total energy of the massive bodies, physics units
    pub fn energy(&self) -> f64 {
        self.world.energy()
    }

    /// Queue a maneuver given in world units. Maneuvers already in the past
    /// run at the start of the next tick
    pub fn schedule_maneuver(
        &mut self,
        maneuver: Maneuver,
        on_complete: Option<CompletionFn>,
    ) -> SimResult<ManeuverId> {
        self.registry.slot(maneuver.target)?;
        if let ManeuverKind::Circularize { center } = maneuver.kind {
            self.registry.slot(center)?;
        }
        let id = self
            .maneuvers
            .push(maneuver.rescaled(self.params.time_scale), on_complete);
        self.touched();
        debug!("scheduled maneuver {id} on {} at t = {:.6}", maneuver.target, maneuver.time);
        Ok(id)
    }

    pub fn cancel_maneuver(&mut self, id: ManeuverId) -> SimResult<()> {
        self.maneuvers.cancel(id)?;
        self.touched();
        Ok(())
    }

    pub fn pending_maneuvers(&self) -> usize {
        self.maneuvers.len()
    }

    /// Transfer candidates moving `ship` onto the orbit of `target`, both
    /// about `center`. Maneuvers and durations come back in world units
    pub fn plan_transfers(
        &self,
        ship: BodyId,
        target: BodyId,
        center: BodyId,
        opts: &TransferOptions,
    ) -> SimResult<Vec<OrbitTransfer>> {
        let ship_orbit = self.get_orbit_data(ship, center)?;
        let target_orbit = self.get_orbit_data(target, center)?;
        let ts = self.params.time_scale;
        let plans = transfer::plan_transfers(ship, &ship_orbit, &target_orbit, center, self.world.time(), opts);
        Ok(plans
            .into_iter()
            .map(|plan| OrbitTransfer {
                maneuvers: plan.maneuvers.iter().map(|m| m.rescaled(1.0 / ts)).collect(),
                delta_v: plan.delta_v * ts,
                duration: plan.duration / ts,
                ..plan
            })
            .collect())
    }
}
