use {
    std::{fmt, sync::{Mutex, MutexGuard, PoisonError, atomic::{AtomicBool, AtomicU64, Ordering}}},
    tracing::{debug, info, warn},
    tokio::{io::{AsyncRead, AsyncWrite}, sync::{self, oneshot}},
    membrane_core::{
        Trigger,
        frame::{read_message, write_message},
        protocol::{ClientMessage, ServerMessage, TriggerRequest, TriggerResponse},
    },
    crate::{error::PoolError, telemetry::TraceContext},
};

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct WorkerId(u64);

impl WorkerId {
    fn next() -> Self {
        Self(NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Live handle to one connected worker stream.
///
/// The outbound half is guarded by an async lock held for a whole request/response exchange,
/// so at most one trigger is in flight per worker. Replies are delivered by the inbound reader
/// through the single pending exchange slot.
pub struct Worker {
    id: WorkerId,
    name: Option<String>,
    outbound: sync::Mutex<BoxedWriter>,
    exchange: Mutex<ExchangeState>,
    alive: AtomicBool,
    ready: AtomicBool,
    next_request: AtomicU64,
}

#[derive(Default)]
struct ExchangeState {
    closed: bool,
    pending: Option<PendingExchange>,
}

struct PendingExchange {
    request_id: String,
    reply_tx: oneshot::Sender<TriggerResponse>,
}

impl Worker {
    pub fn new(name: Option<String>, outbound: BoxedWriter) -> Self {
        Self {
            id: WorkerId::next(),
            name,
            outbound: sync::Mutex::new(outbound),
            exchange: Mutex::new(ExchangeState::default()),
            alive: AtomicBool::new(true),
            ready: AtomicBool::new(false),
            next_request: AtomicU64::new(1),
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Alive and past the handshake.
    pub fn is_ready(&self) -> bool {
        self.is_alive() && self.ready.load(Ordering::Acquire)
    }

    pub(crate) fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub(crate) async fn send(&self, message: &ServerMessage) -> Result<(), PoolError> {
        let mut outbound = self.outbound.lock().await;
        write_message(&mut *outbound, message).await
            .map_err(|err| PoolError::Transport { reason: err.to_string() })
    }

    /// Sends the trigger and waits for the correlated reply.
    pub(crate) async fn exchange(&self, trigger: Trigger, trace_context: TraceContext) -> Result<TriggerResponse, PoolError> {
        let mut outbound = self.outbound.lock().await;

        let request_id = format!("{}-{}", self.id, self.next_request.fetch_add(1, Ordering::Relaxed));
        let (reply_tx, reply_rx) = oneshot::channel();
        {
            let mut exchange = self.exchange_state();
            if exchange.closed {
                return Err(PoolError::Transport { reason: format!("{} is disconnected", self.id) });
            }
            exchange.pending = Some(PendingExchange { request_id: request_id.clone(), reply_tx });
        }

        let message = ServerMessage::TriggerRequest {
            id: request_id.clone(),
            request: TriggerRequest {
                trigger,
                trace_context: trace_context.into_map(),
            },
        };
        debug!(worker_id = %self.id, request_id = %request_id, "sending trigger to worker");
        if let Err(err) = write_message(&mut *outbound, &message).await {
            warn!(worker_id = %self.id, "failed to write trigger to worker: {err}");
            self.close();
            return Err(PoolError::Transport { reason: err.to_string() });
        }

        let response = reply_rx.await
            .map_err(|_| PoolError::Transport { reason: format!("{} disconnected before replying", self.id) });
        drop(outbound);
        response
    }

    /// Reads replies from the worker until its stream ends, then closes the worker.
    pub(crate) async fn read_inbound(&self, mut inbound: BoxedReader) {
        loop {
            let message = match read_message::<_, ClientMessage>(&mut inbound).await {
                Ok(Some(v)) => v,
                Ok(None) => {
                    info!(worker_id = %self.id, "worker stream closed");
                    break;
                },
                Err(err) => {
                    warn!(worker_id = %self.id, "failed to read from worker stream: {err}");
                    break;
                }
            };

            match message {
                ClientMessage::TriggerResponse { id, response } => self.complete(id, response),
                ClientMessage::Init(_) => warn!(worker_id = %self.id, "ignoring repeated init message"),
            }
        }

        self.close();
    }

    fn complete(&self, request_id: String, response: TriggerResponse) {
        let pending = {
            let mut exchange = self.exchange_state();
            match &exchange.pending {
                Some(pending) if pending.request_id == request_id => exchange.pending.take(),
                _ => None,
            }
        };

        match pending {
            Some(pending) => {
                if pending.reply_tx.send(response).is_err() {
                    debug!(worker_id = %self.id, request_id = %request_id, "reply arrived after caller went away");
                }
            },
            None => warn!(worker_id = %self.id, request_id = %request_id, "discarding reply with unknown request id"),
        }
    }

    /// Marks the worker dead and fails any in-flight exchange.
    pub(crate) fn close(&self) {
        self.alive.store(false, Ordering::Release);
        let mut exchange = self.exchange_state();
        exchange.closed = true;
        // dropping the sender wakes the waiting caller with a transport error
        exchange.pending = None;
    }

    fn exchange_state(&self) -> MutexGuard<'_, ExchangeState> {
        self.exchange.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("alive", &self.is_alive())
            .field("ready", &self.is_ready())
            .finish()
    }
}
