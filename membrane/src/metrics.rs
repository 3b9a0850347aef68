use {
    std::{convert::Infallible, net::SocketAddr, pin::Pin},
    tracing::{error, info},
    tokio::net::TcpListener,
    hyper::{Request, body::{Incoming, Bytes}, Response, server::conn::http1, http::StatusCode},
    hyper_util::rt::{TokioIo, TokioTimer},
    http_body_util::Full,
    thiserror::Error,
    prometheus::{
        TextEncoder,
        Registry,
        IntGauge,
        IntCounterVec,
        register_int_gauge_with_registry,
        register_int_counter_vec_with_registry,
    },
    membrane_core::TriggerKind,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,

    pub(crate) triggers_total: IntCounterVec,
    pub(crate) trigger_errors_total: IntCounterVec,
    pub(crate) workers_connected: IntGauge,
}

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("failed to register metric: {reason}")]
    FailedToRegister {
        reason: String,
    },

    #[error("failed to collect: {reason}")]
    FailedToCollect {
        reason: String,
    },
}

impl Metrics {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let triggers_total = register_int_counter_vec_with_registry!("triggers_total", "triggers dispatched to workers", &["kind"], registry)
            .map_err(|err| MetricsError::FailedToRegister { reason: format!("{err:?}") })?;
        let trigger_errors_total = register_int_counter_vec_with_registry!("trigger_errors_total", "triggers that failed to dispatch or were rejected", &["kind"], registry)
            .map_err(|err| MetricsError::FailedToRegister { reason: format!("{err:?}") })?;
        let workers_connected = register_int_gauge_with_registry!("workers_connected", "workers currently registered in the pool", registry)
            .map_err(|err| MetricsError::FailedToRegister { reason: format!("{err:?}") })?;

        Ok(Self {
            registry,
            triggers_total,
            trigger_errors_total,
            workers_connected,
        })
    }

    pub(crate) fn record_trigger(&self, kind: TriggerKind) {
        self.triggers_total.with_label_values(&[kind.as_str()]).inc();
    }

    pub(crate) fn record_trigger_error(&self, kind: TriggerKind) {
        self.trigger_errors_total.with_label_values(&[kind.as_str()]).inc();
    }

    pub fn encode(&self) -> Result<String, MetricsError> {
        let metrics = self.registry.gather();
        let encoder = TextEncoder::new();
        encoder.encode_to_string(&metrics)
            .map_err(|err| MetricsError::FailedToCollect { reason: format!("{err:?}") })
    }
}

pub async fn run_metrics_server(metrics: Metrics, port: u16) {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let listener = match TcpListener::bind(addr).await {
        Ok(v) => v,
        Err(err) => {
            error!("failed to create TcpListener for metrics server: {err:?}");
            return;
        }
    };

    info!("running metrics server on {addr:?}");

    let metrics_server = MetricsServer::new(metrics);
    loop {
        let (tcp, _) = match listener.accept().await {
            Ok(v) => v,
            Err(err) => {
                error!("failed to accept connection in metrics server: {err:?}");
                continue;
            }
        };
        let io = TokioIo::new(tcp);
        let metrics_server = metrics_server.clone();
        tokio::task::spawn(async move {
            if let Err(err) = http1::Builder::new()
                .timer(TokioTimer::new())
                .serve_connection(io, metrics_server)
                .await {
                    error!("error while handling metrics request: {err:?}");
                }
        });
    }
}

#[derive(Clone)]
struct MetricsServer {
    metrics: Metrics,
}

impl MetricsServer {
    pub fn new(metrics: Metrics) -> Self {
        Self {
            metrics,
        }
    }
}

impl hyper::service::Service<Request<Incoming>> for MetricsServer {
    type Response = Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, _req: Request<Incoming>) -> Self::Future {
        let response = match self.metrics.encode() {
            Ok(v) => Response::new(Full::new(Bytes::from(v))),
            Err(err) => {
                error!("failed to encode metrics: {err:?}");
                let mut response = Response::new(Full::new(Bytes::from("internal server error.\n")));
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                response
            }
        };
        Box::pin(async move { Ok(response) })
    }
}
