use std::time::Instant;

use crate::simulation::driver::SimulationDriver;
use crate::simulation::engine::{Algorithm, EngineSettings};
use crate::simulation::error::SimResult;
use crate::simulation::params::Parameters;
use crate::simulation::states::NVec3;

/// Deterministic disc of `n` bodies around a heavy centre, no rand needed
fn disc_driver(algorithm: Algorithm, n: usize) -> SimResult<SimulationDriver> {
    let params = Parameters { softening: 1e-3, headroom: n + 1, ..Parameters::default() };
    let settings = EngineSettings { algorithm, ..EngineSettings::default() };
    let mut driver = SimulationDriver::new(params, settings)?;

    let central = 1.0;
    driver.register_massive(central, NVec3::zeros(), NVec3::zeros())?;
    for i in 0..n {
        let i_f = i as f64;
        let radius = 1.0 + 4.0 * ((i_f * 0.37).sin() * 0.5 + 0.5);
        let angle = i_f * 2.399; // golden angle
        let x = NVec3::new(radius * angle.cos(), radius * angle.sin(), 0.05 * (i_f * 0.07).sin());
        let speed = (central / radius).sqrt();
        let v = NVec3::new(-speed * angle.sin(), speed * angle.cos(), 0.0);
        driver.register_massive(1e-6, x, v)?;
    }
    driver.setup()?;
    driver.start()?;
    Ok(driver)
}

/// Wall time per tick and relative energy drift for each integrator
pub fn bench_integrators() -> SimResult<()> {
    let ticks = 200;
    let cases = [
        (Algorithm::Leapfrog, vec![50, 100, 200, 400]),
        (Algorithm::Hermite, vec![50, 100, 200, 400]),
        (Algorithm::Regularized, vec![2]),
    ];

    for (algorithm, ns) in cases {
        for n in ns {
            let mut driver = disc_driver(algorithm, n)?;
            let tick = driver.params().tick_interval;
            let e0 = driver.energy();

            let t0 = Instant::now();
            for _ in 0..ticks {
                driver.tick(tick)?;
            }
            let elapsed = t0.elapsed().as_secs_f64();

            let drift = ((driver.energy() - e0) / e0).abs();
            println!(
                "{algorithm:?}: N = {:5}, {:8.6} s/tick, |dE/E| = {drift:.3e}",
                n + 1,
                elapsed / ticks as f64
            );
        }
    }
    Ok(())
}

/// Throughput of the massless sub-engine around a single central mass
pub fn bench_massless() -> SimResult<()> {
    let ns = [1_000, 4_000, 16_000, 64_000];
    let ticks = 20;

    for n in ns {
        let mut driver = SimulationDriver::new(Parameters::default(), EngineSettings::default())?;
        driver.register_massive(1.0, NVec3::zeros(), NVec3::zeros())?;
        for i in 0..n {
            let i_f = i as f64;
            let radius = 1.0 + (i_f * 0.13).cos().abs() * 9.0;
            let angle = i_f * 0.61;
            let speed = radius.sqrt().recip();
            driver.register_massless(
                NVec3::new(radius * angle.cos(), radius * angle.sin(), 0.0),
                NVec3::new(-speed * angle.sin(), speed * angle.cos(), 0.0),
                None,
            );
        }
        driver.setup()?;
        driver.start()?;

        let tick = driver.params().tick_interval;
        let t0 = Instant::now();
        for _ in 0..ticks {
            driver.tick(tick)?;
        }
        let per_tick = t0.elapsed().as_secs_f64() / ticks as f64;
        println!("massless N = {n:6}, {per_tick:8.6} s/tick");
    }
    Ok(())
}
