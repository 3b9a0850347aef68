use {
    std::{collections::HashMap, sync::{Arc, atomic::{AtomicBool, Ordering}}},
    tracing::{debug, error, info, warn},
    tokio::sync::watch,
    async_trait::async_trait,
    base64::{Engine as _, engine::general_purpose::STANDARD as BASE64},
    serde::Deserialize,
    serde_json::{Value, json},
    membrane_core::{Trigger, HttpRequest, Event, Response, DecodeError, parse_query, append_header},
    crate::{
        error::GatewayError,
        resources::{BoxedTopicResolver, TopicResolver},
        telemetry::TraceContext,
        worker::BoxedWorkerPool,
    },
    super::{
        Gateway,
        classify::{classify, PayloadKind},
        decode::{copy_headers, event_from_message},
        runtime::{LambdaRuntime, Invocation},
        dispatch_http,
        dispatch_events,
    },
};

const DEFAULT_METHOD: &str = "GET";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HttpApiRequest {
    raw_path: String,
    #[serde(default)]
    raw_query_string: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    cookies: Vec<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    is_base64_encoded: bool,
    #[serde(default)]
    request_context: Option<HttpApiRequestContext>,
}

#[derive(Deserialize)]
struct HttpApiRequestContext {
    http: Option<HttpApiRequestContextHttp>,
}

#[derive(Deserialize)]
struct HttpApiRequestContextHttp {
    method: String,
}

#[derive(Deserialize)]
struct SnsRecord {
    #[serde(rename = "Sns")]
    sns: SnsMessage,
}

#[derive(Deserialize)]
struct SnsMessage {
    #[serde(rename = "MessageId")]
    message_id: String,
    #[serde(rename = "TopicArn")]
    topic_arn: String,
    #[serde(rename = "Message")]
    message: String,
    #[serde(rename = "MessageAttributes", default)]
    message_attributes: HashMap<String, Value>,
}

/// Decodes an api gateway (http api) event into an http request trigger.
pub fn decode_http_event(payload: &Value) -> Result<HttpRequest, DecodeError> {
    let event = HttpApiRequest::deserialize(payload)
        .map_err(|err| DecodeError::MalformedPayload { reason: format!("unable to decode http event: {err}") })?;

    let mut headers = copy_headers(event.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;
    if !event.cookies.is_empty() {
        headers.remove(::http::header::COOKIE);
        for cookie in &event.cookies {
            append_header(&mut headers, "Cookie", cookie)?;
        }
    }

    let query = parse_query(&event.raw_query_string)?;

    let body = match event.body {
        Some(body) if event.is_base64_encoded => BASE64.decode(body.as_bytes())
            .map_err(|err| DecodeError::MalformedPayload { reason: format!("body is not valid base64: {err}") })?,
        Some(body) => body.into_bytes(),
        None => Vec::new(),
    };

    let method = event.request_context
        .and_then(|v| v.http)
        .map(|v| v.method)
        .unwrap_or_else(|| DEFAULT_METHOD.to_owned());

    Ok(HttpRequest {
        headers,
        body,
        method,
        path: event.raw_path,
        query,
    })
}

/// Decodes an sns batch. Records that fail to decode or whose topic cannot be resolved are
/// logged and dropped; the rest of the batch is still decoded.
pub async fn decode_sns_event(payload: &Value, resolver: &dyn TopicResolver) -> Result<Vec<Event>, DecodeError> {
    let records = payload.get("Records")
        .or_else(|| payload.get("records"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| DecodeError::MalformedPayload { reason: "sns event has no records".to_owned() })?;

    let mut events = Vec::with_capacity(records.len());
    for record in records {
        let record = match SnsRecord::deserialize(record) {
            Ok(v) => v,
            Err(err) => {
                warn!("dropping malformed sns record: {err}");
                continue;
            }
        };
        let sns = record.sns;

        let topic = match resolver.resolve_topic_name(&sns.topic_arn).await {
            Ok(v) => v,
            Err(err) => {
                warn!(message_id = %sns.message_id, "unable to find topic, dropping record: {err}");
                continue;
            }
        };

        let attributes = sns.message_attributes.iter()
            .filter_map(|(key, value)| attribute_value(value).map(|v| (key.clone(), v)))
            .collect();

        events.push(event_from_message(sns.message.as_bytes(), &sns.message_id, topic, attributes));
    }

    Ok(events)
}

// attributes arrive either as plain strings or as {"Type": "String", "Value": "..."}
fn attribute_value(value: &Value) -> Option<String> {
    match value {
        Value::String(v) => Some(v.clone()),
        Value::Object(v) => v.get("Value").and_then(|v| v.as_str()).map(|v| v.to_owned()),
        _ => None,
    }
}

/// A lambda payload after classification and decoding.
#[derive(Debug)]
pub enum LambdaPayload {
    HealthCheck,
    Http(HttpRequest),
    Events(Vec<Event>),
}

impl LambdaPayload {
    /// Triggers carried by the payload; none for a health check.
    pub fn into_triggers(self) -> Vec<Trigger> {
        match self {
            Self::HealthCheck => Vec::new(),
            Self::Http(request) => vec![Trigger::Http(request)],
            Self::Events(events) => events.into_iter().map(Trigger::Event).collect(),
        }
    }
}

pub async fn decode_payload(payload: &Value, resolver: &dyn TopicResolver) -> Result<LambdaPayload, DecodeError> {
    match classify(payload) {
        PayloadKind::HealthCheck => Ok(LambdaPayload::HealthCheck),
        PayloadKind::Http => Ok(LambdaPayload::Http(decode_http_event(payload)?)),
        PayloadKind::PubSub => Ok(LambdaPayload::Events(decode_sns_event(payload, resolver).await?)),
        PayloadKind::Unknown => Err(DecodeError::UnknownPayload),
    }
}

/// Encodes a worker response as an api gateway proxy result. The body is always base64 encoded so
/// binary content survives unchanged.
pub fn encode_http_response(response: &Response) -> Value {
    let mut headers = serde_json::Map::new();
    let mut cookies = Vec::new();

    for name in response.headers.keys() {
        let values: Vec<_> = response.headers.get_all(name).iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        if *name == ::http::header::SET_COOKIE {
            cookies.extend(values.into_iter().map(|v| Value::String(v.to_owned())));
        } else {
            headers.insert(name.as_str().to_owned(), Value::String(values.join(",")));
        }
    }

    let mut result = json!({
        "statusCode": response.status,
        "headers": headers,
        "body": BASE64.encode(&response.body),
        "isBase64Encoded": true,
    });
    if !cookies.is_empty() {
        result["cookies"] = Value::Array(cookies);
    }
    result
}

/// Gateway driven by the lambda runtime: pulls invocations one at a time until the runtime ends.
pub struct LambdaGateway {
    runtime: Arc<dyn LambdaRuntime>,
    resolver: BoxedTopicResolver,
    started: AtomicBool,
    stop_tx: watch::Sender<bool>,
    finished_tx: watch::Sender<bool>,
}

impl LambdaGateway {
    pub fn new(runtime: Arc<dyn LambdaRuntime>, resolver: BoxedTopicResolver) -> Self {
        Self {
            runtime,
            resolver,
            started: AtomicBool::new(false),
            stop_tx: watch::channel(false).0,
            finished_tx: watch::channel(false).0,
        }
    }

    pub async fn handle(&self, pool: &BoxedWorkerPool, invocation: &Invocation) -> Result<Value, GatewayError> {
        let trace_id = invocation.trace_id.as_deref();

        match decode_payload(&invocation.payload, self.resolver.as_ref()).await? {
            LambdaPayload::HealthCheck => Ok(json!({ "healthy": true })),
            LambdaPayload::Http(request) => {
                let trace_context = TraceContext::from_headers(&request.headers).or_amzn_trace_id(trace_id);
                let response = dispatch_http(pool, request, trace_context).await;
                Ok(encode_http_response(&response))
            },
            LambdaPayload::Events(events) => {
                dispatch_events(pool, events, trace_id).await?;
                Ok(Value::Null)
            },
        }
    }

    async fn run(&self, pool: BoxedWorkerPool) -> Result<(), GatewayError> {
        let mut stop_rx = self.stop_tx.subscribe();

        loop {
            if *stop_rx.borrow() {
                info!("lambda gateway stopping");
                return Ok(());
            }

            // only the idle wait for the next invocation is interruptible
            let invocation = tokio::select! {
                _ = wait_stopped(&mut stop_rx) => continue,
                invocation = self.runtime.next_invocation() => invocation?,
            };
            let Some(invocation) = invocation else {
                info!("lambda runtime finished");
                return Ok(());
            };

            debug!(request_id = %invocation.request_id, "handling lambda invocation");
            match self.handle(&pool, &invocation).await {
                Ok(body) => self.runtime.send_response(&invocation.request_id, body).await?,
                Err(err) => {
                    error!(request_id = %invocation.request_id, "failed to handle invocation: {err}");
                    self.runtime.send_error(&invocation.request_id, &err).await?;
                },
            }
        }
    }
}

/// Marks the runtime loop finished even when `start` is cancelled.
struct FinishedGuard<'a>(&'a watch::Sender<bool>);

impl Drop for FinishedGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(true);
    }
}

async fn wait_stopped(stop_rx: &mut watch::Receiver<bool>) {
    let _ = stop_rx.wait_for(|stopped| *stopped).await;
}

#[async_trait]
impl Gateway for LambdaGateway {
    async fn start(&self, pool: BoxedWorkerPool) -> Result<(), GatewayError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(GatewayError::Runtime { reason: "lambda gateway already started".to_owned() });
        }

        let _finished = FinishedGuard(&self.finished_tx);
        self.run(pool).await
    }

    async fn stop(&self) -> Result<(), GatewayError> {
        self.stop_tx.send_replace(true);
        if !self.started.load(Ordering::Acquire) {
            return Ok(());
        }

        info!("gateway stop called, waiting for lambda runtime loop to finish");
        let mut finished_rx = self.finished_tx.subscribe();
        finished_rx.wait_for(|finished| *finished).await
            .map(|_| ())
            .map_err(|err| GatewayError::Runtime { reason: format!("lambda gateway state dropped: {err}") })
    }
}
