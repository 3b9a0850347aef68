pub use crate::{
    config::MembraneConfig,
    error::{MembraneError, PoolError, StartupError, GatewayError, ResolutionError},
    membrane::Membrane,
};

pub mod config;
pub mod error;
pub mod gateway;
mod membrane;
pub mod metrics;
pub mod resources;
pub mod supervisor;
pub mod telemetry;
pub mod worker;
