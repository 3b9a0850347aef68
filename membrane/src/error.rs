use {
    std::{io, time::Duration},
    thiserror::Error,
    membrane_core::DecodeError,
    crate::{config::ConfigError, metrics::MetricsError},
};

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum PoolError {
    #[error("no workers available in this pool")]
    NoWorkerAvailable,

    #[error("max worker capacity of {max} reached, cannot add more workers")]
    Capacity { max: usize },

    #[error("worker transport error: {reason}")]
    Transport { reason: String },

    #[error("no worker connected after waiting {waited:?}, has the worker client been started?")]
    WorkerTimeout { waited: Duration },

    #[error("worker pool is not implemented")]
    Unimplemented,
}

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("child command is empty")]
    EmptyCommand,

    #[error("failed to start child process {command:?}: {source}")]
    SpawnFailed { command: String, source: io::Error },

    #[error("unable to reach child process, does it listen at {address}?")]
    ChildUnreachable { address: String },

    #[error("failed to listen on {address}: {source}")]
    Listen { address: String, source: io::Error },

    #[error("child process exited: {status}")]
    ChildExited { status: String },
}

#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("could not find topic for provider id {provider_id}")]
    TopicNotFound { provider_id: String },

    #[error("failed to list topics: {reason}")]
    Lookup { reason: String },

    #[error("topic resolution is not implemented")]
    Unimplemented,
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("failed to decode provider payload: {0}")]
    Decode(#[from] DecodeError),

    #[error("failed to dispatch trigger: {0}")]
    Dispatch(#[from] PoolError),

    #[error("worker failed to handle {failed} of {total} events")]
    EventRejected { failed: usize, total: usize },

    #[error("gateway runtime error: {reason}")]
    Runtime { reason: String },

    #[error("failed to bind gateway to {address}: {source}")]
    Bind { address: String, source: io::Error },

    #[error("gateway is not implemented")]
    Unimplemented,
}

#[derive(Error, Debug)]
pub enum MembraneError {
    #[error("startup failed: {0}")]
    Startup(#[from] StartupError),

    #[error("worker pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("metrics error: {0}")]
    Metrics(#[from] MetricsError),
}
