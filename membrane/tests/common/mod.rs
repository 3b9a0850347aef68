#![allow(dead_code)]

use {
    std::{collections::VecDeque, sync::{Arc, Mutex}},
    tokio::{io::duplex, sync::{Notify, mpsc}},
    async_trait::async_trait,
    serde_json::Value,
    membrane::{
        GatewayError,
        gateway::{LambdaRuntime, Invocation},
        worker::{BoxedWorkerPool, Worker, accept_worker},
    },
    membrane_sdk::{WorkerClient, TriggerHandler},
};

/// Connects an sdk worker to the pool over an in-memory stream and serves triggers in the background.
pub async fn connect_worker(pool: BoxedWorkerPool, handler: impl TriggerHandler) -> Arc<Worker> {
    let (membrane_side, worker_side) = duplex(64 * 1024);

    let (client, worker) = tokio::join!(
        WorkerClient::handshake(worker_side, Some("test-worker".to_owned())),
        accept_worker(pool, membrane_side),
    );
    let client = client.unwrap();
    let worker = worker.unwrap();

    tokio::spawn(async move {
        let _ = client.serve(handler).await;
    });

    worker
}

/// Lambda runtime fed from a queue. Finishes once the queue is drained and closed.
pub struct ChannelRuntime {
    invocations: tokio::sync::Mutex<mpsc::UnboundedReceiver<Invocation>>,
    responses: Mutex<VecDeque<(String, Result<Value, String>)>>,
    replied: Notify,
}

impl ChannelRuntime {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedSender<Invocation>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let runtime = Arc::new(Self {
            invocations: tokio::sync::Mutex::new(rx),
            responses: Mutex::new(VecDeque::new()),
            replied: Notify::new(),
        });
        (runtime, tx)
    }

    pub async fn next_reply(&self) -> (String, Result<Value, String>) {
        loop {
            let notified = self.replied.notified();
            if let Some(reply) = self.responses.lock().unwrap().pop_front() {
                return reply;
            }
            notified.await;
        }
    }

    fn push_reply(&self, request_id: &str, reply: Result<Value, String>) {
        self.responses.lock().unwrap().push_back((request_id.to_owned(), reply));
        self.replied.notify_one();
    }
}

#[async_trait]
impl LambdaRuntime for ChannelRuntime {
    async fn next_invocation(&self) -> Result<Option<Invocation>, GatewayError> {
        Ok(self.invocations.lock().await.recv().await)
    }

    async fn send_response(&self, request_id: &str, body: Value) -> Result<(), GatewayError> {
        self.push_reply(request_id, Ok(body));
        Ok(())
    }

    async fn send_error(&self, request_id: &str, error: &GatewayError) -> Result<(), GatewayError> {
        self.push_reply(request_id, Err(error.to_string()));
        Ok(())
    }
}

pub fn invocation(request_id: &str, payload: Value) -> Invocation {
    Invocation {
        request_id: request_id.to_owned(),
        trace_id: None,
        payload,
    }
}
