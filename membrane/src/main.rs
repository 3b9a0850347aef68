// you don't want your sidecar to randomly crash
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

use {
    std::{path::PathBuf, process::exit},
    tracing::{Level, info, error},
    tracing_subscriber::FmtSubscriber,
    clap::Parser,
    anyhow::Context,
    membrane::{Membrane, MembraneConfig, config::GatewayConfig},
};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to a yaml config file. Defaults apply when not set.
    #[arg(long, env = "MEMBRANE_CONFIG")]
    config_file: Option<PathBuf>,

    #[arg(long, env = "SERVICE_ADDRESS")]
    service_address: Option<String>,

    #[arg(long, env = "CHILD_ADDRESS")]
    child_address: Option<String>,

    #[arg(long, env = "CHILD_TIMEOUT")]
    child_timeout_seconds: Option<u64>,

    #[arg(long, env = "MAX_WORKERS")]
    max_workers: Option<usize>,

    /// Serve through the lambda runtime api instead of the http push gateway.
    #[arg(long, env = "MEMBRANE_LAMBDA")]
    lambda: bool,

    #[arg(long)]
    metrics_port: Option<u16>,

    /// Child command to run, e.g. `-- node index.js`.
    #[arg(last = true)]
    command: Vec<String>,
}

impl Args {
    fn apply(self, config: &mut MembraneConfig) {
        if let Some(v) = self.service_address {
            config.service_address = v;
        }
        if let Some(v) = self.child_address {
            config.child_address = v;
        }
        if let Some(v) = self.child_timeout_seconds {
            config.child_timeout_seconds = v;
        }
        if let Some(v) = self.max_workers {
            config.max_workers = v;
        }
        if let Some(v) = self.metrics_port {
            config.metrics_port = Some(v);
        }
        if self.lambda {
            config.gateway = GatewayConfig::Lambda { runtime_api: None };
        }
        if !self.command.is_empty() {
            config.child_command = Some(self.command.join(" "));
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = match load_config(args).await {
        Ok(v) => v,
        Err(err) => {
            FmtSubscriber::builder().with_max_level(Level::INFO).init();
            error!("failed to load config: {err:?}");
            exit(-1);
        }
    };
    FmtSubscriber::builder().with_max_level(Level::from(config.log_level)).init();

    if let Err(err) = run(config).await {
        error!("membrane failed: {err:?}");
        exit(-1);
    }
}

async fn load_config(args: Args) -> anyhow::Result<MembraneConfig> {
    let mut config = match &args.config_file {
        Some(path) => MembraneConfig::load(path).await
            .with_context(|| format!("failed to load config from {path:?}"))?,
        None => MembraneConfig::default(),
    };
    args.apply(&mut config);
    config.validate()?;
    Ok(config)
}

async fn run(config: MembraneConfig) -> anyhow::Result<()> {
    let membrane = Membrane::from_config(config).await.context("failed to create membrane")?;
    info!("membrane listening for workers on {:?}", membrane.worker_address());

    let start = membrane.start();
    tokio::pin!(start);

    tokio::select! {
        result = &mut start => {
            membrane.stop().await.context("failed to stop membrane")?;
            result.context("membrane stopped with error")
        },
        _ = shutdown_signal() => {
            info!("received shutdown signal");
            let (stopped, result) = tokio::join!(membrane.stop(), &mut start);
            stopped.context("failed to stop membrane")?;
            result.context("membrane stopped with error")
        },
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut terminate = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(v) => v,
            Err(err) => {
                error!("failed to install SIGTERM handler: {err:?}");
                let _ = ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
