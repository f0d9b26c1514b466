use gravsim::{bench_integrators, bench_massless};
use gravsim::{Scenario, ScenarioConfig};

use anyhow::Result;
use clap::Parser;
use log::info;

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

#[derive(Parser, Debug)]
struct Args {
    /// Scenario file under scenarios/
    #[arg(short, default_value = "two_body.yaml")]
    file_name: String,

    /// Number of ticks to run
    #[arg(long, default_value_t = 500)]
    ticks: usize,

    /// Run the benchmarks instead of a scenario
    #[arg(long)]
    bench: bool,
}

// load here to keep main clean
fn load_scenario_from_yaml(file_name: &str) -> Result<ScenarioConfig> {
    let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios").join(file_name);
    let file = File::open(&config_path)?;
    let reader = BufReader::new(file);
    let scenario_cfg: ScenarioConfig = serde_yaml::from_reader(reader)?;
    Ok(scenario_cfg)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.bench {
        bench_integrators()?;
        bench_massless()?;
        return Ok(());
    }

    let scenario_cfg = load_scenario_from_yaml(&args.file_name)?;
    let Scenario { mut driver, bodies, .. } = Scenario::build_scenario(scenario_cfg)?;

    let tick = driver.params().tick_interval;
    let e0 = driver.energy();
    driver.start()?;
    for _ in 0..args.ticks {
        driver.tick(tick)?;
    }

    info!("t = {:.4}, |dE/E| = {:.3e}", driver.time(), ((driver.energy() - e0) / e0).abs());
    for (name, id) in &bodies {
        let r = driver.position(*id)?;
        println!("{name:>12}  x = [{:10.5}, {:10.5}, {:10.5}]", r.x, r.y, r.z);
    }
    if let Some(until) = driver.trajectory().predicted_time() {
        println!("prediction reaches t = {:.4}", until / driver.params().time_scale);
    }

    Ok(())
}
