//! Provider specific gateways. A gateway turns native provider events into triggers, hands them
//! to the worker pool and encodes the replies back into the shape the provider expects.

pub use self::{
    classify::{classify, PayloadKind, HEALTHCHECK_FIELD},
    decode::{copy_headers, event_from_message, FORWARDED_FOR_HEADER},
    http::HttpGateway,
    lambda::{LambdaGateway, LambdaPayload, decode_payload, decode_http_event, decode_sns_event, encode_http_response},
    runtime::{LambdaRuntime, Invocation, RuntimeApiClient},
};

use {
    std::sync::Arc,
    tracing::{error, warn},
    async_trait::async_trait,
    membrane_core::{Trigger, HttpRequest, Event, Response, HeaderMap, protocol::TriggerResponse},
    crate::{
        error::{GatewayError, PoolError},
        telemetry::TraceContext,
        worker::BoxedWorkerPool,
    },
};

mod classify;
mod decode;
mod http;
mod lambda;
mod runtime;

/// Lifecycle: created -> started -> stopped.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Consumes provider events until stopped or a fatal error occurs. Does not return before that.
    async fn start(&self, pool: BoxedWorkerPool) -> Result<(), GatewayError>;

    /// Unblocks `start`. Idempotent. In-flight triggers are allowed to complete.
    async fn stop(&self) -> Result<(), GatewayError>;
}

pub type BoxedGateway = Arc<dyn Gateway>;

pub struct UnimplementedGateway;

#[async_trait]
impl Gateway for UnimplementedGateway {
    async fn start(&self, _pool: BoxedWorkerPool) -> Result<(), GatewayError> {
        Err(GatewayError::Unimplemented)
    }

    async fn stop(&self) -> Result<(), GatewayError> {
        Err(GatewayError::Unimplemented)
    }
}

/// Dispatches an http trigger. Failures become a 5xx response, never an error.
pub(crate) async fn dispatch_http(pool: &BoxedWorkerPool, request: HttpRequest, trace_context: TraceContext) -> Response {
    match pool.handle(Trigger::Http(request), trace_context).await {
        Ok(TriggerResponse::Http(response)) => response,
        Ok(TriggerResponse::Event { .. }) => {
            error!("worker replied with an event result to an http trigger");
            error_response(500, "worker returned an invalid response\n")
        },
        Err(PoolError::NoWorkerAvailable) => {
            warn!("no worker available to handle http trigger");
            error_response(503, "no worker available to handle request\n")
        },
        Err(err) => {
            error!("failed to handle http trigger: {err}");
            error_response(500, "error processing request\n")
        },
    }
}

/// Dispatches events one by one in batch order. Every event is attempted; the batch fails if any
/// event failed, so the provider redelivers according to its own at-least-once policy.
pub(crate) async fn dispatch_events(pool: &BoxedWorkerPool, events: Vec<Event>, runtime_trace_id: Option<&str>) -> Result<(), GatewayError> {
    let total = events.len();
    let mut failed = 0;
    let mut last_dispatch_error = None;

    for event in events {
        let trace_context = TraceContext::from_attributes(&event.attributes).or_amzn_trace_id(runtime_trace_id);
        let event_id = event.id.clone();

        match pool.handle(Trigger::Event(event), trace_context).await {
            Ok(TriggerResponse::Event { success: true }) => {},
            Ok(TriggerResponse::Http(response)) if (200..300).contains(&response.status) => {},
            Ok(other) => {
                warn!(event_id = %event_id, "worker rejected event: {other:?}");
                failed += 1;
            },
            Err(err) => {
                warn!(event_id = %event_id, "failed to dispatch event: {err}");
                failed += 1;
                last_dispatch_error = Some(err);
            },
        }
    }

    match (failed, last_dispatch_error) {
        (0, _) => Ok(()),
        (failed, Some(err)) if failed == total => Err(GatewayError::Dispatch(err)),
        (failed, _) => Err(GatewayError::EventRejected { failed, total }),
    }
}

pub(crate) fn error_response(status: u16, message: &str) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(::http::header::CONTENT_TYPE, ::http::HeaderValue::from_static("text/plain"));
    Response {
        status,
        headers,
        body: message.as_bytes().to_vec(),
    }
}
