use {
    std::{sync::{Arc, Mutex, MutexGuard, PoisonError}, time::{Duration, Instant}},
    tracing::{info, warn, Instrument},
    tokio::time::sleep,
    async_trait::async_trait,
    membrane_core::{Trigger, protocol::TriggerResponse},
    crate::{error::PoolError, metrics::Metrics, telemetry::TraceContext},
    super::worker::{Worker, WorkerId, BoxedReader},
};

/// Short enough to keep cold starts fast, long enough to not spin.
pub const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(15);

#[async_trait]
pub trait WorkerPool: Send + Sync {
    /// Adds a connected worker and starts reading its inbound stream.
    fn register(&self, worker: Arc<Worker>, inbound: BoxedReader) -> Result<(), PoolError>;

    /// Returns the first ready worker. Never waits for a worker to become free.
    fn acquire(&self, selector: &Trigger) -> Result<Arc<Worker>, PoolError>;

    /// Sends the trigger to the worker and waits for its reply.
    async fn dispatch(&self, worker: &Arc<Worker>, trigger: Trigger, trace_context: TraceContext) -> Result<TriggerResponse, PoolError>;

    async fn await_at_least_one_worker(&self, timeout: Duration) -> Result<(), PoolError>;

    fn worker_count(&self) -> usize;

    async fn handle(&self, trigger: Trigger, trace_context: TraceContext) -> Result<TriggerResponse, PoolError> {
        let worker = self.acquire(&trigger)?;
        self.dispatch(&worker, trigger, trace_context).await
    }
}

pub type BoxedWorkerPool = Arc<dyn WorkerPool>;

#[derive(Clone)]
pub struct FaasWorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    max_workers: usize,
    workers: Mutex<Vec<Arc<Worker>>>,
    metrics: Option<Metrics>,
}

impl FaasWorkerPool {
    pub fn new(max_workers: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                max_workers,
                workers: Mutex::new(Vec::with_capacity(max_workers)),
                metrics: None,
            }),
        }
    }

    pub fn with_metrics(max_workers: usize, metrics: Metrics) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                max_workers,
                workers: Mutex::new(Vec::with_capacity(max_workers)),
                metrics: Some(metrics),
            }),
        }
    }

    fn workers(&self) -> MutexGuard<'_, Vec<Arc<Worker>>> {
        self.inner.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, worker_id: WorkerId) {
        let removed = {
            let mut workers = self.workers();
            let before = workers.len();
            workers.retain(|worker| worker.id() != worker_id);
            let removed = before != workers.len();
            if removed {
                self.update_gauge(workers.len());
            }
            removed
        };

        if removed {
            info!(worker_id = %worker_id, "removed worker from pool");
        }
    }

    fn update_gauge(&self, count: usize) {
        if let Some(metrics) = &self.inner.metrics {
            metrics.workers_connected.set(count as i64);
        }
    }
}

#[async_trait]
impl WorkerPool for FaasWorkerPool {
    fn register(&self, worker: Arc<Worker>, inbound: BoxedReader) -> Result<(), PoolError> {
        {
            let mut workers = self.workers();
            if workers.len() >= self.inner.max_workers {
                return Err(PoolError::Capacity { max: self.inner.max_workers });
            }
            workers.push(worker.clone());
            self.update_gauge(workers.len());
        }

        info!(worker_id = %worker.id(), name = worker.name().unwrap_or_default(), "registered worker");

        let pool = self.clone();
        tokio::spawn(async move {
            worker.read_inbound(inbound).await;
            pool.remove(worker.id());
        });

        Ok(())
    }

    fn acquire(&self, _selector: &Trigger) -> Result<Arc<Worker>, PoolError> {
        self.workers().iter()
            .find(|worker| worker.is_ready())
            .cloned()
            .ok_or(PoolError::NoWorkerAvailable)
    }

    async fn dispatch(&self, worker: &Arc<Worker>, trigger: Trigger, trace_context: TraceContext) -> Result<TriggerResponse, PoolError> {
        let kind = trigger.kind();
        let span = trace_context.span(kind);
        if let Some(metrics) = &self.inner.metrics {
            metrics.record_trigger(kind);
        }

        let result = worker.exchange(trigger, trace_context).instrument(span).await;
        if let Err(err) = &result {
            warn!(worker_id = %worker.id(), "dispatch of {kind} trigger failed: {err}");
            if let Some(metrics) = &self.inner.metrics {
                metrics.record_trigger_error(kind);
            }
            if !worker.is_alive() {
                self.remove(worker.id());
            }
        }
        result
    }

    async fn await_at_least_one_worker(&self, timeout: Duration) -> Result<(), PoolError> {
        let started_at = Instant::now();
        loop {
            if self.worker_count() >= 1 {
                return Ok(());
            }

            let waited = started_at.elapsed();
            if waited >= timeout {
                return Err(PoolError::WorkerTimeout { waited });
            }
            sleep(WORKER_POLL_INTERVAL.min(timeout - waited)).await;
        }
    }

    /// Counts ready workers only; a worker mid-handshake cannot take triggers yet.
    fn worker_count(&self) -> usize {
        self.workers().iter().filter(|worker| worker.is_ready()).count()
    }
}

/// Pool used when no worker transport is configured. Every operation fails.
pub struct UnimplementedWorkerPool;

#[async_trait]
impl WorkerPool for UnimplementedWorkerPool {
    fn register(&self, _worker: Arc<Worker>, _inbound: BoxedReader) -> Result<(), PoolError> {
        Err(PoolError::Unimplemented)
    }

    fn acquire(&self, _selector: &Trigger) -> Result<Arc<Worker>, PoolError> {
        Err(PoolError::Unimplemented)
    }

    async fn dispatch(&self, _worker: &Arc<Worker>, _trigger: Trigger, _trace_context: TraceContext) -> Result<TriggerResponse, PoolError> {
        Err(PoolError::Unimplemented)
    }

    async fn await_at_least_one_worker(&self, _timeout: Duration) -> Result<(), PoolError> {
        Err(PoolError::Unimplemented)
    }

    fn worker_count(&self) -> usize {
        0
    }
}
