use {
    std::{net::SocketAddr, sync::Arc, time::Duration},
    tracing::{error, info, warn},
    tokio::{io::{self, AsyncRead, AsyncWrite}, net::TcpListener, time::timeout},
    membrane_core::{
        frame::read_message,
        protocol::{ClientMessage, ServerMessage},
    },
    crate::error::{PoolError, StartupError},
    super::{pool::BoxedWorkerPool, worker::Worker},
};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Accepts worker connections and hands them to the pool.
pub struct WorkerListener {
    listener: TcpListener,
    pool: BoxedWorkerPool,
}

impl WorkerListener {
    pub async fn bind(address: &str, pool: BoxedWorkerPool) -> Result<Self, StartupError> {
        let listener = TcpListener::bind(address).await
            .map_err(|source| StartupError::Listen { address: address.to_owned(), source })?;
        Ok(Self {
            listener,
            pool,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn serve(self) {
        match self.listener.local_addr() {
            Ok(addr) => info!("worker listener running on {addr:?}"),
            Err(err) => warn!("worker listener running on unknown address: {err:?}"),
        }

        loop {
            let (tcp, peer) = match self.listener.accept().await {
                Ok(v) => v,
                Err(err) => {
                    error!("failed to accept worker connection: {err:?}");
                    continue;
                }
            };
            if let Err(err) = tcp.set_nodelay(true) {
                warn!("failed to set nodelay on worker connection from {peer:?}: {err:?}");
            }

            let pool = self.pool.clone();
            tokio::spawn(async move {
                if let Err(err) = accept_worker(pool, tcp).await {
                    warn!("worker connection from {peer:?} rejected: {err}");
                }
            });
        }
    }
}

/// Runs the init handshake on a freshly opened worker stream and registers the worker.
pub async fn accept_worker<S>(pool: BoxedWorkerPool, stream: S) -> Result<Arc<Worker>, PoolError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut inbound, outbound) = io::split(stream);

    let init = match timeout(HANDSHAKE_TIMEOUT, read_message::<_, ClientMessage>(&mut inbound)).await {
        Ok(Ok(Some(ClientMessage::Init(init)))) => init,
        Ok(Ok(Some(other))) => return Err(PoolError::Transport { reason: format!("expected init message, got: {other:?}") }),
        Ok(Ok(None)) => return Err(PoolError::Transport { reason: "stream closed before init".to_owned() }),
        Ok(Err(err)) => return Err(PoolError::Transport { reason: err.to_string() }),
        Err(_) => return Err(PoolError::Transport { reason: format!("no init message within {HANDSHAKE_TIMEOUT:?}") }),
    };

    let worker = Arc::new(Worker::new(init.name, Box::new(outbound)));
    if let Err(err) = pool.register(worker.clone(), Box::new(inbound)) {
        if let Err(send_err) = worker.send(&ServerMessage::InitRejected { reason: err.to_string() }).await {
            warn!(worker_id = %worker.id(), "failed to notify rejected worker: {send_err}");
        }
        return Err(err);
    }

    if let Err(err) = worker.send(&ServerMessage::InitAck).await {
        worker.close();
        return Err(err);
    }
    worker.mark_ready();

    Ok(worker)
}
