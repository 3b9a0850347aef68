use {
    std::{net::SocketAddr, sync::{Arc, Mutex, PoisonError}},
    tracing::{info, warn, error},
    tokio::{sync::watch, task::JoinHandle},
    crate::{
        config::{MembraneConfig, GatewayConfig},
        error::{MembraneError, StartupError, GatewayError},
        gateway::{BoxedGateway, HttpGateway, LambdaGateway, RuntimeApiClient},
        metrics::{Metrics, run_metrics_server},
        resources::{BoxedTopicResolver, StaticTopicResolver},
        supervisor::ProcessSupervisor,
        worker::{BoxedWorkerPool, FaasWorkerPool, WorkerListener},
    },
};

/// Joins a gateway, the worker pool and the child process supervisor.
///
/// `start` runs the startup sequence and then blocks in the gateway until `stop` is called,
/// the gateway fails or the child process exits. The gateway runs on its own task, so in-flight
/// triggers are not cancelled when the `start` future is dropped; `stop` waits for them before
/// the child process is killed.
pub struct Membrane {
    config: MembraneConfig,
    pool: BoxedWorkerPool,
    gateway: BoxedGateway,
    supervisor: Option<ProcessSupervisor>,
    metrics: Option<Metrics>,

    worker_address: SocketAddr,
    listener: Mutex<Option<WorkerListener>>,
    listener_task: Mutex<Option<JoinHandle<()>>>,
    metrics_task: Mutex<Option<JoinHandle<()>>>,

    stop_tx: watch::Sender<bool>,
    // true while the gateway task runs
    gateway_running: Arc<watch::Sender<bool>>,
}

impl Membrane {
    /// Builds the gateway selected in config and binds the worker listener.
    pub async fn from_config(config: MembraneConfig) -> Result<Self, MembraneError> {
        config.validate()?;

        let resolver: BoxedTopicResolver = Arc::new(StaticTopicResolver::new(config.topics.clone()));
        let gateway: BoxedGateway = match &config.gateway {
            GatewayConfig::Lambda { runtime_api } => {
                let runtime = match runtime_api {
                    Some(runtime_api) => RuntimeApiClient::new(runtime_api.clone()),
                    None => RuntimeApiClient::from_env()?,
                };
                Arc::new(LambdaGateway::new(Arc::new(runtime), resolver))
            },
            GatewayConfig::Http { address } => Arc::new(HttpGateway::bind(address, resolver).await?),
        };

        let metrics = match config.metrics_port {
            Some(_) => Some(Metrics::new()?),
            None => None,
        };
        let pool: BoxedWorkerPool = match &metrics {
            Some(metrics) => Arc::new(FaasWorkerPool::with_metrics(config.max_workers, metrics.clone())),
            None => Arc::new(FaasWorkerPool::new(config.max_workers)),
        };

        Self::new(config, gateway, pool, metrics).await
    }

    pub async fn new(config: MembraneConfig, gateway: BoxedGateway, pool: BoxedWorkerPool, metrics: Option<Metrics>) -> Result<Self, MembraneError> {
        let supervisor = config.child_command.as_ref().map(|command| {
            ProcessSupervisor::new(command.clone(), config.child_address.clone())
                .with_timeout(config.child_timeout())
                .with_child_logs(config.child_logs)
        });

        let listener = WorkerListener::bind(&config.service_address, pool.clone()).await?;
        let worker_address = listener.local_addr()
            .map_err(|source| StartupError::Listen { address: config.service_address.clone(), source })?;

        Ok(Self {
            config,
            pool,
            gateway,
            supervisor,
            metrics,
            worker_address,
            listener: Mutex::new(Some(listener)),
            listener_task: Mutex::new(None),
            metrics_task: Mutex::new(None),
            stop_tx: watch::channel(false).0,
            gateway_running: Arc::new(watch::channel(false).0),
        })
    }

    /// Address workers connect to.
    pub fn worker_address(&self) -> SocketAddr {
        self.worker_address
    }

    pub fn pool(&self) -> &BoxedWorkerPool {
        &self.pool
    }

    pub async fn start(&self) -> Result<(), MembraneError> {
        let mut stop_rx = self.stop_tx.subscribe();
        if *stop_rx.borrow_and_update() {
            return Ok(());
        }

        let listener = self.listener.lock().unwrap_or_else(PoisonError::into_inner).take()
            .ok_or_else(|| StartupError::Listen { address: self.config.service_address.clone(), source: already_started() })?;
        *self.listener_task.lock().unwrap_or_else(PoisonError::into_inner) = Some(tokio::spawn(listener.serve()));

        tokio::select! {
            result = self.prepare_backend() => result?,
            _ = wait_stopped(&mut stop_rx) => {
                info!("membrane stopped during startup");
                return Ok(());
            },
        }

        if let (Some(metrics), Some(port)) = (&self.metrics, self.config.metrics_port) {
            *self.metrics_task.lock().unwrap_or_else(PoisonError::into_inner) = Some(tokio::spawn(run_metrics_server(metrics.clone(), port)));
        }

        info!("starting gateway");
        let mut gateway_task = self.spawn_gateway();

        let result = match &self.supervisor {
            Some(supervisor) => tokio::select! {
                result = &mut gateway_task => gateway_result(result),
                err = supervisor.wait_exit() => {
                    error!("child process exited while serving: {err}");
                    if let Err(err) = self.gateway.stop().await {
                        warn!("failed to stop gateway: {err}");
                    }
                    // in-flight work fails on its own once the worker stream closes
                    if let Err(err) = gateway_result(gateway_task.await) {
                        warn!("gateway stopped with error: {err}");
                    }
                    Err(err.into())
                },
            },
            None => gateway_result(gateway_task.await),
        };

        info!("gateway stopped");
        result
    }

    /// Child process first, then at least one worker.
    async fn prepare_backend(&self) -> Result<(), MembraneError> {
        match &self.supervisor {
            Some(supervisor) => supervisor.start().await?,
            None => info!("no child command configured, waiting for workers to connect on their own"),
        }

        if self.config.wait_for_worker {
            info!(timeout = ?self.config.worker_timeout(), "waiting for a worker to connect");
            self.pool.await_at_least_one_worker(self.config.worker_timeout()).await?;
        }
        Ok(())
    }

    fn spawn_gateway(&self) -> JoinHandle<Result<(), GatewayError>> {
        let gateway = self.gateway.clone();
        let pool = self.pool.clone();
        let running = self.gateway_running.clone();

        running.send_replace(true);
        tokio::spawn(async move {
            let result = gateway.start(pool).await;
            running.send_replace(false);
            result
        })
    }

    /// Stops accepting provider events and waits for in-flight triggers to finish, then tears
    /// down the child process and the listeners. Idempotent.
    pub async fn stop(&self) -> Result<(), MembraneError> {
        self.stop_tx.send_replace(true);
        let result = self.gateway.stop().await;

        let mut running_rx = self.gateway_running.subscribe();
        let _ = running_rx.wait_for(|running| !*running).await;

        if let Some(supervisor) = &self.supervisor {
            supervisor.stop().await;
        }
        for task in [&self.listener_task, &self.metrics_task] {
            if let Some(task) = task.lock().unwrap_or_else(PoisonError::into_inner).take() {
                task.abort();
            }
        }

        result.map_err(MembraneError::from)
    }
}

fn gateway_result(result: Result<Result<(), GatewayError>, tokio::task::JoinError>) -> Result<(), MembraneError> {
    match result {
        Ok(result) => result.map_err(MembraneError::from),
        Err(err) => Err(GatewayError::Runtime { reason: format!("gateway task failed: {err}") }.into()),
    }
}

async fn wait_stopped(stop_rx: &mut watch::Receiver<bool>) {
    let _ = stop_rx.wait_for(|stopped| *stopped).await;
}

fn already_started() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::AlreadyExists, "membrane already started")
}
