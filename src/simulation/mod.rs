pub mod math;
pub mod error;
pub mod forces;
pub mod states;
pub mod params;
pub mod engine;
pub mod integrator;
pub mod massless;
pub mod fixed;
pub mod orbit;
pub mod maneuver;
pub mod transfer;
pub mod trajectory;
pub mod driver;
pub mod scenario;
