use {
    std::{collections::HashMap, convert::Infallible, net::SocketAddr, pin::Pin, sync::{Mutex, PoisonError}},
    tracing::{error, info, warn},
    tokio::{net::TcpListener, sync::watch},
    hyper::{Request, body::{Incoming, Bytes}, server::conn::http1},
    hyper_util::{rt::{TokioIo, TokioTimer}, server::graceful::GracefulShutdown},
    http_body_util::{BodyExt, Full},
    async_trait::async_trait,
    base64::{Engine as _, engine::general_purpose::STANDARD as BASE64},
    serde::Deserialize,
    serde_json::Value,
    membrane_core::{HttpRequest, Response, Event, DecodeError, parse_query},
    crate::{
        error::GatewayError,
        resources::BoxedTopicResolver,
        telemetry::TraceContext,
        worker::BoxedWorkerPool,
    },
    super::{
        Gateway,
        classify::{classify, PayloadKind, HEALTHCHECK_FIELD},
        decode::{copy_headers, event_from_message},
        dispatch_http,
        dispatch_events,
        error_response,
    },
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushEnvelope {
    message: PushMessage,
    subscription: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushMessage {
    #[serde(default)]
    data: Option<String>,
    #[serde(alias = "message_id")]
    message_id: String,
    #[serde(default)]
    attributes: HashMap<String, String>,
}

/// Push style gateway: providers deliver http requests and pub/sub push envelopes to an http endpoint.
pub struct HttpGateway {
    listener: Mutex<Option<TcpListener>>,
    local_addr: SocketAddr,
    resolver: BoxedTopicResolver,
    stop_tx: watch::Sender<bool>,
}

impl HttpGateway {
    pub async fn bind(address: &str, resolver: BoxedTopicResolver) -> Result<Self, GatewayError> {
        let listener = TcpListener::bind(address).await
            .map_err(|source| GatewayError::Bind { address: address.to_owned(), source })?;
        let local_addr = listener.local_addr()
            .map_err(|source| GatewayError::Bind { address: address.to_owned(), source })?;

        Ok(Self {
            listener: Mutex::new(Some(listener)),
            local_addr,
            resolver,
            stop_tx: watch::channel(false).0,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn take_listener(&self) -> Option<TcpListener> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn start(&self, pool: BoxedWorkerPool) -> Result<(), GatewayError> {
        let listener = self.take_listener()
            .ok_or_else(|| GatewayError::Runtime { reason: "http gateway already started".to_owned() })?;
        let mut stop_rx = self.stop_tx.subscribe();
        let graceful = GracefulShutdown::new();
        let handler = HttpGatewayHandler { pool, resolver: self.resolver.clone() };

        info!("http gateway running on {:?}", self.local_addr);
        loop {
            if *stop_rx.borrow() {
                break;
            }

            let connection = tokio::select! {
                _ = stop_rx.changed() => continue,
                connection = listener.accept() => connection,
            };
            let (tcp, _) = match connection {
                Ok(v) => v,
                Err(err) => {
                    error!("failed to accept http connection: {err:?}");
                    continue;
                }
            };

            let io = TokioIo::new(tcp);
            let conn = http1::Builder::new()
                .timer(TokioTimer::new())
                .serve_connection(io, handler.clone());
            let request_future = graceful.watch(conn);

            tokio::task::spawn(async move {
                if let Err(err) = request_future.await {
                    if err.is_timeout() || err.is_incomplete_message() {
                        // caused by clients
                    } else {
                        error!("error while handling http request: {err:?}");
                    }
                }
            });
        }

        info!("http gateway stopping, waiting for in-flight requests");
        graceful.shutdown().await;
        Ok(())
    }

    async fn stop(&self) -> Result<(), GatewayError> {
        self.stop_tx.send_replace(true);
        Ok(())
    }
}

#[derive(Clone)]
struct HttpGatewayHandler {
    pool: BoxedWorkerPool,
    resolver: BoxedTopicResolver,
}

impl HttpGatewayHandler {
    async fn handle(&self, req: Request<Incoming>) -> Response {
        if req.headers().contains_key(HEALTHCHECK_FIELD) {
            return healthy_response();
        }

        let (parts, body) = req.into_parts();
        let body = match body.collect().await {
            Ok(v) => v.to_bytes().to_vec(),
            Err(err) => {
                warn!("failed to read request body: {err:?}");
                return error_response(400, "failed to read request body\n");
            }
        };

        if let Some(envelope) = push_envelope(&parts.headers, &body) {
            return self.handle_push(envelope).await;
        }

        let request = match http_request_from_parts(&parts, body) {
            Ok(v) => v,
            Err(err) => {
                warn!("failed to decode http request: {err}");
                return error_response(400, &format!("{err}\n"));
            }
        };

        let trace_context = TraceContext::from_headers(&request.headers);
        dispatch_http(&self.pool, request, trace_context).await
    }

    async fn handle_push(&self, envelope: PushEnvelope) -> Response {
        let event = match self.event_from_push(envelope).await {
            Ok(Some(v)) => v,
            // unresolvable topic, acknowledge so the provider stops redelivering
            Ok(None) => return Response::new(200),
            Err(err) => {
                warn!("failed to decode push message: {err}");
                return error_response(400, &format!("{err}\n"));
            }
        };

        match dispatch_events(&self.pool, vec![event], None).await {
            Ok(()) => Response::new(200),
            Err(err) => {
                error!("failed to handle pushed event: {err}");
                error_response(500, "failed to handle event\n")
            }
        }
    }

    async fn event_from_push(&self, envelope: PushEnvelope) -> Result<Option<Event>, DecodeError> {
        let message = envelope.message;
        let data = match message.data {
            Some(data) => BASE64.decode(data.as_bytes())
                .map_err(|err| DecodeError::MalformedPayload { reason: format!("message data is not valid base64: {err}") })?,
            None => Vec::new(),
        };

        let topic = match self.resolver.resolve_topic_name(&envelope.subscription).await {
            Ok(v) => v,
            Err(err) => {
                warn!(message_id = %message.message_id, "unable to find topic, dropping message: {err}");
                return Ok(None);
            }
        };

        Ok(Some(event_from_message(&data, &message.message_id, topic, message.attributes)))
    }
}

impl hyper::service::Service<Request<Incoming>> for HttpGatewayHandler {
    type Response = hyper::Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let handler = self.clone();
        Box::pin(async move {
            let response = handler.handle(req).await;
            Ok(into_hyper_response(response))
        })
    }
}

fn push_envelope(headers: &::http::HeaderMap, body: &[u8]) -> Option<PushEnvelope> {
    let is_json = headers.get(::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    if !is_json {
        return None;
    }

    let payload: Value = serde_json::from_slice(body).ok()?;
    if classify(&payload) != PayloadKind::PubSub {
        return None;
    }
    PushEnvelope::deserialize(&payload).ok()
}

fn http_request_from_parts(parts: &::http::request::Parts, body: Vec<u8>) -> Result<HttpRequest, DecodeError> {
    let headers = copy_headers(parts.headers.iter().filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v))))?;
    let query = parse_query(parts.uri.query().unwrap_or_default())?;

    Ok(HttpRequest {
        headers,
        body,
        method: parts.method.to_string(),
        path: parts.uri.path().to_owned(),
        query,
    })
}

fn healthy_response() -> Response {
    let mut response = Response::new(200).with_body(r#"{"healthy":true}"#);
    response.headers.insert(::http::header::CONTENT_TYPE, ::http::HeaderValue::from_static("application/json"));
    response
}

fn into_hyper_response(response: Response) -> hyper::Response<Full<Bytes>> {
    let mut result = hyper::Response::new(Full::new(Bytes::from(response.body)));
    *result.status_mut() = ::http::StatusCode::from_u16(response.status)
        .unwrap_or(::http::StatusCode::INTERNAL_SERVER_ERROR);
    *result.headers_mut() = response.headers;
    result
}
