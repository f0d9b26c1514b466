use std::f64::consts::TAU;
use std::sync::{Arc, Mutex};

use approx::{assert_abs_diff_eq, assert_relative_eq};

use gravsim::simulation::orbit::OrbitData;
use gravsim::{
    Algorithm, BodyId, BodySink, BodyUpdate, ConstantThrust, DriverStatus, EngineSettings,
    FixedPath, Maneuver, Parameters, RequestQueue, Scenario, ScenarioConfig, SimError,
    SimulationDriver, Stationary, TrajectorySettings, TransferKind, TransferOptions, NVec3,
};

/// Driver with the given algorithm and default parameters
pub fn driver_with(algorithm: Algorithm) -> SimulationDriver {
    let settings = EngineSettings { algorithm, ..EngineSettings::default() };
    SimulationDriver::new(Parameters::default(), settings).unwrap()
}

/// Unit-mass sun at rest plus a test body on a circle of radius `r`
pub fn sun_and_probe(driver: &mut SimulationDriver, r: f64) -> (BodyId, BodyId) {
    let sun = driver.register_massive(1.0, NVec3::zeros(), NVec3::zeros()).unwrap();
    let probe = driver.register_massless(NVec3::new(r, 0.0, 0.0), NVec3::new(0.0, r.sqrt().recip(), 0.0), None);
    (sun, probe)
}

/// Heavy primary with a light companion on an orbit of eccentricity `ecc`
/// starting at periapsis, semi-major axis 1
pub fn eccentric_pair(driver: &mut SimulationDriver, ecc: f64) {
    let (m1, m2) = (1.0, 1e-3);
    let mu = m1 + m2;
    let rp = 1.0 - ecc;
    let vp = (mu * (1.0 + ecc) / rp).sqrt();
    // centre of mass at rest
    let f1 = m2 / mu;
    let f2 = m1 / mu;
    driver
        .register_massive(m1, NVec3::new(-f1 * rp, 0.0, 0.0), NVec3::new(0.0, -f1 * vp, 0.0))
        .unwrap();
    driver
        .register_massive(m2, NVec3::new(f2 * rp, 0.0, 0.0), NVec3::new(0.0, f2 * vp, 0.0))
        .unwrap();
}

fn run_ticks(driver: &mut SimulationDriver, ticks: usize) {
    let tick = driver.params().tick_interval;
    for _ in 0..ticks {
        driver.tick(tick).unwrap();
    }
}

/// Largest relative energy error seen over `ticks` ticks
fn max_energy_drift(driver: &mut SimulationDriver, ticks: usize) -> f64 {
    let e0 = driver.energy();
    let tick = driver.params().tick_interval;
    let mut worst: f64 = 0.0;
    for _ in 0..ticks {
        driver.tick(tick).unwrap();
        worst = worst.max(((driver.energy() - e0) / e0).abs());
    }
    worst
}

fn angle_diff(a: f64, b: f64) -> f64 {
    ((a - b + 180.0).rem_euclid(360.0) - 180.0).abs()
}

// ==================================================================================
// Energy conservation
// ==================================================================================

#[test]
fn leapfrog_conserves_energy_on_circular_pair() {
    let mut driver = driver_with(Algorithm::Leapfrog);
    eccentric_pair(&mut driver, 0.0);
    driver.setup().unwrap();
    driver.start().unwrap();

    // ~1.3 orbits
    let drift = max_energy_drift(&mut driver, 400);
    assert!(drift < 1e-5, "energy drift too large: {drift:e}");
}

#[test]
fn leapfrog_drift_shrinks_with_step() {
    let mut drifts = Vec::new();
    for steps_per_tick in [2, 8] {
        let settings = EngineSettings { steps_per_tick, ..EngineSettings::default() };
        let mut driver = SimulationDriver::new(Parameters::default(), settings).unwrap();
        eccentric_pair(&mut driver, 0.5);
        driver.setup().unwrap();
        driver.start().unwrap();
        drifts.push(max_energy_drift(&mut driver, 400));
    }
    assert!(drifts[1] < drifts[0], "finer step did not help: {drifts:?}");
}

#[test]
fn hermite_conserves_energy_on_circular_pair() {
    let mut driver = driver_with(Algorithm::Hermite);
    eccentric_pair(&mut driver, 0.0);
    driver.setup().unwrap();
    driver.start().unwrap();

    let drift = max_energy_drift(&mut driver, 400);
    assert!(drift < 1e-6, "energy drift too large: {drift:e}");
}

#[test]
fn hermite_survives_close_periapsis_passage() {
    let mut driver = driver_with(Algorithm::Hermite);
    eccentric_pair(&mut driver, 0.9);
    driver.setup().unwrap();
    driver.start().unwrap();

    // one full period (2π) passes periapsis at r = 0.1 again
    let drift = max_energy_drift(&mut driver, 330);
    assert!(drift < 1e-4, "energy drift too large: {drift:e}");
}

#[test]
fn hermite_corrector_passes_are_configurable() {
    let zero = EngineSettings { algorithm: Algorithm::Hermite, corrector_iterations: 0, ..EngineSettings::default() };
    assert!(matches!(SimulationDriver::new(Parameters::default(), zero), Err(SimError::Config(_))));

    let settings = EngineSettings { algorithm: Algorithm::Hermite, corrector_iterations: 3, ..EngineSettings::default() };
    let mut driver = SimulationDriver::new(Parameters::default(), settings).unwrap();
    eccentric_pair(&mut driver, 0.9);
    driver.setup().unwrap();
    driver.start().unwrap();

    let drift = max_energy_drift(&mut driver, 330);
    assert!(drift < 1e-4, "energy drift too large: {drift:e}");
}

#[test]
fn regularized_conserves_energy_on_hierarchical_triple() {
    let mut driver = driver_with(Algorithm::Regularized);
    eccentric_pair(&mut driver, 0.3);
    let v_outer = (1.001_f64 / 6.0).sqrt();
    driver
        .register_massive(1e-4, NVec3::new(0.0, 6.0, 0.0), NVec3::new(-v_outer, 0.0, 0.0))
        .unwrap();
    driver.setup().unwrap();
    driver.start().unwrap();

    let drift = max_energy_drift(&mut driver, 300);
    assert!(drift < 1e-4, "energy drift too large: {drift:e}");
}

// ==================================================================================
// Regularized integrator constraints
// ==================================================================================

#[test]
fn regularized_rejects_fourth_body() {
    let mut driver = driver_with(Algorithm::Regularized);
    for k in 0..3 {
        driver
            .register_massive(1.0, NVec3::new(k as f64, 0.0, 0.0), NVec3::zeros())
            .unwrap();
    }
    let fourth = driver.register_massive(1.0, NVec3::new(5.0, 0.0, 0.0), NVec3::zeros());
    assert!(matches!(fourth, Err(SimError::Config(_))));
    assert_eq!(driver.body_count(), 3);
}

#[test]
fn regularized_setup_needs_exactly_three_bodies() {
    let mut driver = driver_with(Algorithm::Regularized);
    eccentric_pair(&mut driver, 0.1);
    assert!(matches!(driver.setup(), Err(SimError::Config(_))));
    assert_eq!(driver.status(), DriverStatus::Uninitialized);
}

#[test]
fn regularized_refuses_removal() {
    let mut driver = driver_with(Algorithm::Regularized);
    eccentric_pair(&mut driver, 0.1);
    let third = driver
        .register_massive(0.1, NVec3::new(0.0, 5.0, 0.0), NVec3::zeros())
        .unwrap();
    assert!(matches!(driver.remove_body(third), Err(SimError::Config(_))));
    assert!(driver.position(third).is_ok());
}

// ==================================================================================
// Orbital elements
// ==================================================================================

#[test]
fn orbit_elements_round_trip() {
    let elements = OrbitData::from_elements(10.0, 0.2, 30.0, 45.0, 60.0, 0.0, 1.0).unwrap();
    let (r, v) = elements.to_state();
    let back = OrbitData::from_state(&r, &v, 1.0).unwrap();

    assert_relative_eq!(back.a, 10.0, max_relative = 1e-9);
    assert_abs_diff_eq!(back.ecc, 0.2, epsilon = 1e-9);
    assert_abs_diff_eq!(back.inclination, 30.0, epsilon = 1e-7);
    assert!(angle_diff(back.node, 45.0) < 1e-7, "node {}", back.node);
    assert!(angle_diff(back.arg_periapsis, 60.0) < 1e-7, "argp {}", back.arg_periapsis);
    assert!(angle_diff(back.true_anomaly, 0.0) < 1e-7, "nu {}", back.true_anomaly);
    assert_abs_diff_eq!(back.perihelion, 8.0, epsilon = 1e-8);
}

#[test]
fn orbit_of_driver_body_matches_placement() {
    let mut driver = driver_with(Algorithm::Leapfrog);
    let (sun, probe) = sun_and_probe(&mut driver, 2.0);
    driver.setup().unwrap();

    let orbit = driver.get_orbit_data(probe, sun).unwrap();
    assert_relative_eq!(orbit.a, 2.0, max_relative = 1e-9);
    assert!(orbit.ecc < 1e-9);
    assert_relative_eq!(orbit.period, TAU * 8.0_f64.sqrt(), max_relative = 1e-9);
}

#[test]
fn radial_state_is_degenerate() {
    let r = NVec3::new(1.0, 2.0, 0.5);
    let v = r * 0.3;
    assert_eq!(OrbitData::from_state(&r, &v, 1.0), Err(SimError::DegenerateOrbit));
}

// ==================================================================================
// Maneuvers
// ==================================================================================

#[test]
fn maneuvers_drain_in_time_then_submission_order() {
    let mut driver = driver_with(Algorithm::Leapfrog);
    // lone body: no forces, so position is a pure function of burn times
    let body = driver.register_massive(1.0, NVec3::zeros(), NVec3::zeros()).unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));
    let burns = [
        (5.0, NVec3::new(0.0, 1.0, 0.0)),
        (5.0, NVec3::new(0.0, 1.0, 0.0)),
        (3.0, NVec3::new(1.0, 0.0, 0.0)),
    ];
    for (label, (time, dv)) in burns.into_iter().enumerate() {
        let order = Arc::clone(&order);
        driver
            .schedule_maneuver(
                Maneuver::vector(time, body, dv),
                Some(Box::new(move |_: &Maneuver, _: &mut RequestQueue| {
                    order.lock().unwrap().push(label)
                })),
            )
            .unwrap();
    }

    driver.setup().unwrap();
    driver.start().unwrap();
    let report = driver.tick(6.0).unwrap();

    assert_eq!(report.maneuvers_executed, 3);
    assert_eq!(*order.lock().unwrap(), vec![2, 0, 1]);
    assert_eq!(driver.pending_maneuvers(), 0);

    // each burn landed exactly on its trigger time
    let x = driver.position(body).unwrap();
    assert_abs_diff_eq!(x.x, 3.0, epsilon = 1e-9);
    assert_abs_diff_eq!(x.y, 2.0, epsilon = 1e-9);
}

#[test]
fn cancelled_maneuver_never_runs() {
    let mut driver = driver_with(Algorithm::Leapfrog);
    let body = driver.register_massive(1.0, NVec3::zeros(), NVec3::zeros()).unwrap();
    let id = driver
        .schedule_maneuver(Maneuver::scalar(0.1, body, 1.0), None)
        .unwrap();
    driver.cancel_maneuver(id).unwrap();
    assert_eq!(driver.cancel_maneuver(id), Err(SimError::UnknownManeuver(id)));

    driver.setup().unwrap();
    driver.start().unwrap();
    run_ticks(&mut driver, 10);
    assert_eq!(driver.velocity(body).unwrap(), NVec3::zeros());
}

#[test]
fn circularize_zeroes_eccentricity() {
    let mut driver = driver_with(Algorithm::Leapfrog);
    let sun = driver.register_massive(1.0, NVec3::zeros(), NVec3::zeros()).unwrap();
    let ship = driver.register_massless(NVec3::new(1.0, 0.0, 0.0), NVec3::new(0.0, 1.2, 0.1), None);
    driver.setup().unwrap();
    assert!(driver.get_orbit_data(ship, sun).unwrap().ecc > 0.4);

    driver
        .schedule_maneuver(Maneuver::circularize(0.5, ship, sun), None)
        .unwrap();
    driver.start().unwrap();
    run_ticks(&mut driver, 50);

    let orbit = driver.get_orbit_data(ship, sun).unwrap();
    assert!(orbit.ecc < 1e-4, "eccentricity after circularize: {}", orbit.ecc);
}

#[test]
fn removing_a_body_drops_its_maneuvers() {
    let mut driver = driver_with(Algorithm::Leapfrog);
    let (sun, probe) = sun_and_probe(&mut driver, 1.0);
    driver
        .schedule_maneuver(Maneuver::circularize(1.0, probe, sun), None)
        .unwrap();
    driver.remove_body(probe).unwrap();
    assert_eq!(driver.pending_maneuvers(), 0);
}

// ==================================================================================
// State cloning and storage
// ==================================================================================

#[test]
fn clone_evolution_leaves_original_untouched() {
    let mut driver = driver_with(Algorithm::Hermite);
    let (sun, probe) = sun_and_probe(&mut driver, 1.0);
    driver
        .register_massive(1e-2, NVec3::new(0.0, 3.0, 0.0), NVec3::new(-(1.0_f64 / 3.0).sqrt(), 0.0, 0.0))
        .unwrap();
    driver.setup().unwrap();
    driver.start().unwrap();
    run_ticks(&mut driver, 5);

    let world = driver.world();
    let r_before = world.bodies.r.clone();
    let m_before = world.bodies.m.clone();
    let v_before: Vec<NVec3> = [sun, probe]
        .iter()
        .map(|id| driver.velocity(*id).unwrap())
        .collect();
    let probe_before = driver.position(probe).unwrap();
    let time_before = world.time();

    let mut copy = world.clone();
    copy.evolve_to(time_before + 1.0);
    assert!(copy.time() > time_before);
    assert_ne!(copy.bodies.r, r_before);

    let world = driver.world();
    assert_eq!(world.bodies.r, r_before);
    assert_eq!(world.bodies.m, m_before);
    assert_eq!(world.time(), time_before);
    assert_eq!(driver.position(probe).unwrap(), probe_before);
    let v_after: Vec<NVec3> = [sun, probe]
        .iter()
        .map(|id| driver.velocity(*id).unwrap())
        .collect();
    assert_eq!(v_after, v_before);
}

#[test]
fn growth_preserves_handles_and_positions() {
    let params = Parameters { headroom: 1, ..Parameters::default() };
    let mut driver = SimulationDriver::new(params, EngineSettings::default()).unwrap();

    let mut registered = Vec::new();
    for k in 0..6 {
        let x = NVec3::new(k as f64, 1.0, 0.0);
        let id = driver.register_massive(1.0, x, NVec3::zeros()).unwrap();
        registered.push((id, x));
        for (earlier, position) in &registered {
            assert_eq!(driver.position(*earlier).unwrap(), *position);
        }
    }
    let ids: Vec<BodyId> = registered.iter().map(|(id, _)| *id).collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
    assert!(driver.world().bodies.capacity() >= 6);
    driver.setup().unwrap();
    assert_eq!(driver.body_count(), 6);
}

#[test]
fn removal_keeps_other_handles_valid() {
    let mut driver = driver_with(Algorithm::Leapfrog);
    let a = driver.register_massive(1.0, NVec3::new(1.0, 0.0, 0.0), NVec3::zeros()).unwrap();
    let b = driver.register_massive(2.0, NVec3::new(2.0, 0.0, 0.0), NVec3::zeros()).unwrap();
    let c = driver.register_massive(3.0, NVec3::new(3.0, 0.0, 0.0), NVec3::zeros()).unwrap();

    driver.remove_body(a).unwrap();
    assert_eq!(driver.position(b).unwrap().x, 2.0);
    assert_eq!(driver.position(c).unwrap().x, 3.0);
    assert_eq!(driver.position(a), Err(SimError::UnknownBody(a)));
    assert_eq!(driver.remove_body(a), Err(SimError::UnknownBody(a)));
    assert_eq!(driver.body_count(), 2);
}

#[test]
fn inactive_massless_body_stays_frozen() {
    let mut driver = driver_with(Algorithm::Leapfrog);
    let (_, probe) = sun_and_probe(&mut driver, 1.0);
    driver.set_active(probe, false).unwrap();
    driver.setup().unwrap();
    driver.start().unwrap();
    run_ticks(&mut driver, 20);

    assert_eq!(driver.position(probe).unwrap(), NVec3::new(1.0, 0.0, 0.0));
    assert!(driver.body_states().iter().all(|u| u.id != probe));
}

#[test]
fn deactivated_or_removed_mass_stops_pulling_at_once() {
    for remove in [false, true] {
        let mut driver = driver_with(Algorithm::Leapfrog);
        let (sun, probe) = sun_and_probe(&mut driver, 1.0);
        driver.setup().unwrap();
        driver.start().unwrap();
        run_ticks(&mut driver, 5);

        if remove {
            driver.remove_body(sun).unwrap();
        } else {
            driver.set_active(sun, false).unwrap();
        }
        let before = driver.velocity(probe).unwrap();
        run_ticks(&mut driver, 1);

        let dv = (driver.velocity(probe).unwrap() - before).norm();
        assert!(dv < 1e-12, "remove = {remove}, |dv| = {dv:e}");
    }
}

#[test]
fn added_mass_pulls_from_the_next_step() {
    let mut driver = driver_with(Algorithm::Leapfrog);
    driver.register_massive(0.0, NVec3::new(100.0, 0.0, 0.0), NVec3::zeros()).unwrap();
    let probe = driver.register_massless(NVec3::zeros(), NVec3::zeros(), None);
    driver.setup().unwrap();
    driver.start().unwrap();
    run_ticks(&mut driver, 5);

    driver.register_massive(1.0, NVec3::new(1.0, 0.0, 0.0), NVec3::zeros()).unwrap();
    run_ticks(&mut driver, 1);

    // one full tick at unit acceleration toward +x
    let tick = driver.params().tick_interval;
    assert_abs_diff_eq!(driver.velocity(probe).unwrap().x, tick, epsilon = 1e-4);
}

#[test]
fn fixed_body_follows_its_path_and_is_not_reported() {
    let mut driver = driver_with(Algorithm::Leapfrog);
    let path = FixedPath::new(|t: f64| NVec3::new(t, 0.0, 0.0), |_: f64| NVec3::new(1.0, 0.0, 0.0));
    let rail = driver.register_fixed(0.0, Arc::new(path)).unwrap();
    let free = driver.register_massive(1.0, NVec3::new(0.0, 10.0, 0.0), NVec3::zeros()).unwrap();
    driver.setup().unwrap();
    driver.start().unwrap();
    run_ticks(&mut driver, 50);

    assert_abs_diff_eq!(driver.position(rail).unwrap().x, driver.time(), epsilon = 1e-9);
    assert_eq!(driver.velocity(rail).unwrap(), NVec3::new(1.0, 0.0, 0.0));
    assert!(matches!(driver.set_velocity(rail, NVec3::zeros()), Err(SimError::Config(_))));

    let reported: Vec<BodyId> = driver.body_states().iter().map(|u| u.id).collect();
    assert_eq!(reported, vec![free]);
}

#[test]
fn stationary_mass_holds_a_circular_orbit() {
    let mut driver = driver_with(Algorithm::Leapfrog);
    let sun = driver.register_fixed(1.0, Arc::new(Stationary(NVec3::zeros()))).unwrap();
    let probe = driver.register_massless(NVec3::new(1.0, 0.0, 0.0), NVec3::new(0.0, 1.0, 0.0), None);
    driver.setup().unwrap();
    driver.start().unwrap();
    run_ticks(&mut driver, 100);

    let orbit = driver.get_orbit_data(probe, sun).unwrap();
    assert_relative_eq!(orbit.a, 1.0, max_relative = 1e-4);
    assert_eq!(driver.position(sun).unwrap(), NVec3::zeros());
}

#[test]
fn constant_thrust_accelerates_during_its_window() {
    let mut driver = driver_with(Algorithm::Leapfrog);
    driver.register_massive(0.0, NVec3::new(100.0, 0.0, 0.0), NVec3::zeros()).unwrap();
    let thrust = ConstantThrust { acceleration: NVec3::new(1.0, 0.0, 0.0), start: 0.0, end: 1.0 };
    let ship = driver.register_massless(NVec3::zeros(), NVec3::zeros(), Some(Arc::new(thrust)));
    driver.setup().unwrap();
    driver.start().unwrap();
    run_ticks(&mut driver, 100);

    // v = a t over the window, then coasting
    assert_abs_diff_eq!(driver.velocity(ship).unwrap().x, 1.0, epsilon = 1e-2);
    assert_abs_diff_eq!(driver.position(ship).unwrap().x, 1.5, epsilon = 1e-2);
}

// ==================================================================================
// Driver lifecycle and configuration
// ==================================================================================

#[test]
fn tick_before_setup_is_not_ready() {
    let mut driver = driver_with(Algorithm::Leapfrog);
    sun_and_probe(&mut driver, 1.0);
    assert_eq!(driver.tick(0.02), Err(SimError::NotReady(DriverStatus::Uninitialized)));
    assert!(matches!(driver.start(), Err(SimError::NotReady(_))));
}

#[test]
fn invalid_scales_are_rejected() {
    let params = Parameters { mass_scale: 0.0, ..Parameters::default() };
    assert!(matches!(
        SimulationDriver::new(params, EngineSettings::default()),
        Err(SimError::Config(_))
    ));
    let params = Parameters { time_scale: 0.0, ..Parameters::default() };
    assert!(matches!(
        SimulationDriver::new(params, EngineSettings::default()),
        Err(SimError::Config(_))
    ));
}

#[test]
fn paused_driver_does_not_advance() {
    let mut driver = driver_with(Algorithm::Leapfrog);
    sun_and_probe(&mut driver, 1.0);
    driver.setup().unwrap();
    let report = driver.tick(0.02).unwrap();
    assert_eq!(report.advanced, 0.0);

    driver.start().unwrap();
    driver.pause().unwrap();
    assert_eq!(driver.tick(0.02).unwrap().advanced, 0.0);
    assert_eq!(driver.time(), 0.0);
}

#[test]
fn algorithm_switch_only_when_not_running() {
    let mut driver = driver_with(Algorithm::Leapfrog);
    eccentric_pair(&mut driver, 0.2);
    driver.setup().unwrap();
    driver.start().unwrap();
    assert!(matches!(driver.set_algorithm(Algorithm::Hermite), Err(SimError::Config(_))));
    assert!(matches!(driver.set_steps_per_tick(4), Err(SimError::Config(_))));

    driver.pause().unwrap();
    driver.set_algorithm(Algorithm::Hermite).unwrap();
    assert_eq!(driver.world().integrator_name(), "hermite");
    driver.start().unwrap();
    run_ticks(&mut driver, 10);
    assert!(driver.time() > 0.0);
}

#[test]
fn time_zoom_applies_from_next_tick() {
    let mut driver = driver_with(Algorithm::Leapfrog);
    sun_and_probe(&mut driver, 1.0);
    driver.setup().unwrap();
    driver.start().unwrap();

    assert_abs_diff_eq!(driver.tick(0.02).unwrap().advanced, 0.02, epsilon = 1e-12);
    driver.set_time_zoom(2.0).unwrap();
    assert_eq!(driver.time_zoom(), 1.0);
    assert_abs_diff_eq!(driver.tick(0.02).unwrap().advanced, 0.04, epsilon = 1e-12);
    assert_eq!(driver.time_zoom(), 2.0);
    assert!(driver.set_time_zoom(-1.0).is_err());
}

#[test]
fn short_ticks_accumulate_until_a_step_fits() {
    let mut driver = driver_with(Algorithm::Leapfrog);
    sun_and_probe(&mut driver, 1.0);
    driver.setup().unwrap();
    driver.start().unwrap();

    // h = 0.0025; 0.001 per tick owes a whole step only every third tick
    let advanced: Vec<f64> = (0..3).map(|_| driver.tick(0.001).unwrap().advanced).collect();
    assert_eq!(advanced[0], 0.0);
    assert_eq!(advanced[1], 0.0);
    assert_abs_diff_eq!(advanced[2], 0.0025, epsilon = 1e-15);
}

#[test]
fn time_scale_converts_world_units() {
    let params = Parameters { time_scale: 2.0, ..Parameters::default() };
    let mut driver = SimulationDriver::new(params, EngineSettings::default()).unwrap();
    let body = driver
        .register_massive(1.0, NVec3::zeros(), NVec3::new(1.0, 0.0, 0.0))
        .unwrap();
    driver.setup().unwrap();
    driver.start().unwrap();
    run_ticks(&mut driver, 50);

    // one world second, one world unit of distance
    assert_abs_diff_eq!(driver.time(), 1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(driver.position(body).unwrap().x, 1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(driver.velocity(body).unwrap().x, 1.0, epsilon = 1e-12);
}

#[test]
fn clear_returns_to_uninitialized() {
    let mut driver = driver_with(Algorithm::Leapfrog);
    let (_, probe) = sun_and_probe(&mut driver, 1.0);
    driver.setup().unwrap();
    driver.start().unwrap();
    run_ticks(&mut driver, 3);

    driver.clear().unwrap();
    assert_eq!(driver.status(), DriverStatus::Uninitialized);
    assert_eq!(driver.body_count(), 0);
    assert_eq!(driver.time(), 0.0);
    assert_eq!(driver.position(probe), Err(SimError::UnknownBody(probe)));
}

// ==================================================================================
// Outputs and deferred requests
// ==================================================================================

struct Recorder {
    seen: Arc<Mutex<Vec<(f64, usize)>>>,
    kick: Option<BodyId>,
}

impl BodySink for Recorder {
    fn push(&mut self, time: f64, updates: &[BodyUpdate], requests: &mut RequestQueue) {
        self.seen.lock().unwrap().push((time, updates.len()));
        if let Some(id) = self.kick.take() {
            requests.set_velocity(id, NVec3::new(0.0, 0.0, 5.0));
        }
    }
}

#[test]
fn sinks_see_every_tick_and_requests_apply_afterwards() {
    let mut driver = driver_with(Algorithm::Leapfrog);
    let (_, probe) = sun_and_probe(&mut driver, 1.0);
    let seen = Arc::new(Mutex::new(Vec::new()));
    driver.add_sink(Box::new(Recorder { seen: Arc::clone(&seen), kick: Some(probe) }));
    driver.setup().unwrap();
    driver.start().unwrap();

    let first = driver.tick(0.02).unwrap();
    assert_eq!(first.requests_applied, 1);
    assert_eq!(driver.velocity(probe).unwrap(), NVec3::new(0.0, 0.0, 5.0));

    let second = driver.tick(0.02).unwrap();
    assert_eq!(second.requests_applied, 0);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|&(_, n)| n == 2));
    assert!(seen[1].0 > seen[0].0);
}

#[test]
fn completion_callback_can_schedule_follow_up() {
    let mut driver = driver_with(Algorithm::Leapfrog);
    let body = driver.register_massive(1.0, NVec3::zeros(), NVec3::zeros()).unwrap();
    driver
        .schedule_maneuver(
            Maneuver::vector(0.01, body, NVec3::new(1.0, 0.0, 0.0)),
            Some(Box::new(move |m: &Maneuver, requests: &mut RequestQueue| {
                requests.schedule(Maneuver::vector(m.time + 0.1, m.target, NVec3::new(-1.0, 0.0, 0.0)));
            })),
        )
        .unwrap();
    driver.setup().unwrap();
    driver.start().unwrap();

    driver.tick(0.02).unwrap();
    assert_eq!(driver.pending_maneuvers(), 1);
    run_ticks(&mut driver, 10);
    assert_eq!(driver.pending_maneuvers(), 0);
    assert_abs_diff_eq!(driver.velocity(body).unwrap().x, 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(driver.position(body).unwrap().x, 0.1, epsilon = 1e-9);
}

// ==================================================================================
// Trajectory prediction
// ==================================================================================

fn predicting_driver() -> (SimulationDriver, BodyId, BodyId) {
    let trajectory = TrajectorySettings {
        enabled: true,
        lookahead: 1.0,
        budget: 1.0,
        record_interval: 0.01,
    };
    let settings = EngineSettings { trajectory, ..EngineSettings::default() };
    let mut driver = SimulationDriver::new(Parameters::default(), settings).unwrap();
    let (sun, probe) = sun_and_probe(&mut driver, 1.0);
    (driver, sun, probe)
}

#[test]
fn prediction_matches_world_including_burns() {
    let (mut driver, _, probe) = predicting_driver();
    driver
        .schedule_maneuver(Maneuver::scalar(0.05, probe, 0.1), None)
        .unwrap();
    driver.setup().unwrap();
    driver.start().unwrap();

    run_ticks(&mut driver, 10);
    assert_eq!(driver.trajectory().rebuilds(), 1);
    assert!(driver.trajectory().predicted_time().unwrap() > driver.world().time());

    let now = driver.world().time();
    let path = driver.trajectory().path(probe).unwrap();
    let point = path
        .iter()
        .min_by(|p, q| (p.time - now).abs().total_cmp(&(q.time - now).abs()))
        .unwrap();
    assert!((point.time - now).abs() < 1e-9, "no sample at t = {now}");
    let actual = driver.position(probe).unwrap();
    assert!((point.position - actual).norm() < 1e-9);
    // trimmed at the start of each tick, so at most one tick of history
    let tick = driver.params().tick_interval;
    assert!(path.iter().all(|p| p.time >= now - tick - 1e-9));
}

#[test]
fn mutation_rebuilds_prediction() {
    let (mut driver, _, probe) = predicting_driver();
    driver.setup().unwrap();
    driver.start().unwrap();

    run_ticks(&mut driver, 2);
    assert_eq!(driver.trajectory().rebuilds(), 1);

    driver.set_velocity(probe, NVec3::new(0.0, 1.1, 0.0)).unwrap();
    assert!(driver.trajectory().is_stale());
    run_ticks(&mut driver, 1);
    assert_eq!(driver.trajectory().rebuilds(), 2);
    assert!(!driver.trajectory().is_stale());
}

#[test]
fn disabling_prediction_discards_it() {
    let (mut driver, _, probe) = predicting_driver();
    driver.setup().unwrap();
    driver.start().unwrap();
    run_ticks(&mut driver, 2);
    assert!(driver.trajectory().path(probe).is_some());

    driver.set_trajectory_enabled(false);
    assert!(driver.trajectory().predicted_time().is_none());
    run_ticks(&mut driver, 2);
    assert!(driver.trajectory().path(probe).is_none());
}

// ==================================================================================
// Transfers
// ==================================================================================

#[test]
fn hohmann_transfer_reaches_target_orbit() {
    let mut driver = driver_with(Algorithm::Leapfrog);
    let (sun, ship) = sun_and_probe(&mut driver, 1.0);
    let target = driver.register_massless(NVec3::new(0.0, 2.0, 0.0), NVec3::new(-0.5_f64.sqrt(), 0.0, 0.0), None);
    driver.setup().unwrap();

    let plans = driver.plan_transfers(ship, target, sun, &TransferOptions::default()).unwrap();
    assert_eq!(plans.len(), 1);
    let hohmann = &plans[0];
    assert_eq!(hohmann.kind, TransferKind::Hohmann);
    let expected = ((4.0_f64 / 3.0).sqrt() - 1.0) + 0.5_f64.sqrt() * (1.0 - (2.0_f64 / 3.0).sqrt());
    assert_relative_eq!(hohmann.delta_v, expected, max_relative = 1e-6);

    for m in &hohmann.maneuvers {
        driver.schedule_maneuver(*m, None).unwrap();
    }
    driver.start().unwrap();
    let ticks = ((hohmann.duration + 0.2) / driver.params().tick_interval).ceil() as usize;
    run_ticks(&mut driver, ticks);

    let orbit = driver.get_orbit_data(ship, sun).unwrap();
    assert!((orbit.a - 2.0).abs() < 1e-2, "a = {}", orbit.a);
    assert!(orbit.ecc < 5e-3, "ecc = {}", orbit.ecc);
}

#[test]
fn eccentric_ship_is_circularized_first() {
    let mut driver = driver_with(Algorithm::Leapfrog);
    let sun = driver.register_massive(1.0, NVec3::zeros(), NVec3::zeros()).unwrap();
    let ship = driver.register_massless(NVec3::new(1.0, 0.0, 0.0), NVec3::new(0.0, 1.2, 0.0), None);
    let target = driver.register_massless(NVec3::new(3.0, 0.0, 0.0), NVec3::new(0.0, (1.0_f64 / 3.0).sqrt(), 0.0), None);
    driver.setup().unwrap();

    let plans = driver.plan_transfers(ship, target, sun, &TransferOptions::default()).unwrap();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].kind, TransferKind::Circularize);
    // starting at periapsis: burn right away
    assert_abs_diff_eq!(plans[0].maneuvers[0].time, 0.0, epsilon = 1e-9);
}

// ==================================================================================
// Scenario files
// ==================================================================================

#[test]
fn bundled_scenarios_build() {
    for yaml in [
        include_str!("../scenarios/two_body.yaml"),
        include_str!("../scenarios/sun_probe.yaml"),
        include_str!("../scenarios/three_body.yaml"),
    ] {
        let cfg: ScenarioConfig = serde_yaml::from_str(yaml).unwrap();
        let names = cfg.bodies.len();
        let mut scenario = Scenario::build_scenario(cfg).unwrap();
        assert_eq!(scenario.bodies.len(), names);
        assert_eq!(scenario.driver.status(), DriverStatus::Setup);

        scenario.driver.start().unwrap();
        run_ticks(&mut scenario.driver, 10);
        assert!(scenario.driver.time() > 0.0);
    }
}

#[test]
fn scenario_orbit_places_body_relative_to_parent() {
    let yaml = r#"
bodies:
  - { name: sun, m: 1.0, x: [5.0, 0.0, 0.0] }
  - name: probe
    kind: massless
    orbit: { around: sun, a: 2.0 }
"#;
    let cfg: ScenarioConfig = serde_yaml::from_str(yaml).unwrap();
    let scenario = Scenario::build_scenario(cfg).unwrap();
    let (sun, probe) = (scenario.bodies["sun"], scenario.bodies["probe"]);
    let orbit = scenario.driver.get_orbit_data(probe, sun).unwrap();
    assert_relative_eq!(orbit.a, 2.0, max_relative = 1e-9);
    assert_abs_diff_eq!(scenario.driver.position(probe).unwrap().x, 7.0, epsilon = 1e-9);
}

#[test]
fn scenario_reads_hermite_corrector_passes() {
    let yaml = r#"
engine: { integrator: "hermite", corrector_iterations: 2 }
bodies:
  - { name: sun, m: 1.0 }
"#;
    let cfg: ScenarioConfig = serde_yaml::from_str(yaml).unwrap();
    let scenario = Scenario::build_scenario(cfg).unwrap();
    assert_eq!(scenario.driver.settings().corrector_iterations, 2);
    assert_eq!(scenario.driver.world().integrator_name(), "hermite");
}

#[test]
fn scenario_rejects_unknown_parent() {
    let yaml = r#"
bodies:
  - name: probe
    kind: massless
    orbit: { around: nowhere, a: 2.0 }
"#;
    let cfg: ScenarioConfig = serde_yaml::from_str(yaml).unwrap();
    assert!(matches!(Scenario::build_scenario(cfg), Err(SimError::Config(_))));
}

// ==================================================================================
// Circular orbit scenario
// ==================================================================================

#[test]
fn circular_orbit_closes_after_one_period() {
    let params = Parameters { tick_interval: TAU / 1000.0, ..Parameters::default() };
    let settings = EngineSettings { steps_per_tick: 4, ..EngineSettings::default() };
    let mut driver = SimulationDriver::new(params, settings).unwrap();
    let (_, probe) = sun_and_probe(&mut driver, 1.0);
    driver.setup().unwrap();
    driver.start().unwrap();

    run_ticks(&mut driver, 1000);

    assert_abs_diff_eq!(driver.time(), TAU, epsilon = 1e-9);
    let r = driver.position(probe).unwrap();
    let v = driver.velocity(probe).unwrap();
    assert!((r - NVec3::new(1.0, 0.0, 0.0)).norm() < 1e-4, "r = {r:?}");
    assert!((v - NVec3::new(0.0, 1.0, 0.0)).norm() < 1e-4, "v = {v:?}");
}
