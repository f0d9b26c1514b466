pub mod simulation;
pub mod configuration;
pub mod benchmark;

pub use simulation::states::{BodyId, BodyRegistry, NVec3, SimulationState, Slot};
pub use simulation::error::{SimError, SimResult};
pub use simulation::forces::{ForceLaw, Gravity};
pub use simulation::params::Parameters;
pub use simulation::engine::{Algorithm, EngineSettings};
pub use simulation::integrator::{build_integrator, HermiteIntegrator, Integrator, LeapfrogIntegrator, RegularizedIntegrator};
pub use simulation::massless::{ConstantThrust, MasslessEngine, ProgradeThrust, Propulsion};
pub use simulation::fixed::{FixedMotion, FixedPath, KeplerPath, Stationary};
pub use simulation::orbit::{OrbitData, OrbitKind};
pub use simulation::maneuver::{CompletionFn, Maneuver, ManeuverId, ManeuverKind, ManeuverQueue};
pub use simulation::transfer::{plan_transfers, OrbitTransfer, TransferKind, TransferOptions};
pub use simulation::trajectory::{TrajectoryPoint, TrajectoryPredictor, TrajectorySettings};
pub use simulation::driver::{BodySink, BodyUpdate, DriverStatus, Request, RequestQueue, SimulationDriver, TickReport};
pub use simulation::scenario::Scenario;

pub use configuration::config::{BodyConfig, BodyKind, EngineConfig, ManeuverConfig, OrbitConfig, ParametersConfig, ScenarioConfig};

pub use benchmark::benchmark::{bench_integrators, bench_massless};
