use {
    async_trait::async_trait,
    serde_json::{Value, json},
    tracing::debug,
    crate::error::GatewayError,
};

const RUNTIME_API_VERSION: &str = "2018-06-01";
const HEADER_REQUEST_ID: &str = "Lambda-Runtime-Aws-Request-Id";
const HEADER_TRACE_ID: &str = "Lambda-Runtime-Trace-Id";
const ENV_RUNTIME_API: &str = "AWS_LAMBDA_RUNTIME_API";

#[derive(Debug, Clone)]
pub struct Invocation {
    pub request_id: String,
    pub trace_id: Option<String>,
    pub payload: Value,
}

/// Source of lambda invocations. Pull based: the runtime cannot be interrupted from outside.
#[async_trait]
pub trait LambdaRuntime: Send + Sync {
    /// Waits for the next invocation. `None` means the runtime has finished.
    async fn next_invocation(&self) -> Result<Option<Invocation>, GatewayError>;

    async fn send_response(&self, request_id: &str, body: Value) -> Result<(), GatewayError>;

    async fn send_error(&self, request_id: &str, error: &GatewayError) -> Result<(), GatewayError>;
}

/// Client for the lambda runtime api.
pub struct RuntimeApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl RuntimeApiClient {
    pub fn new(runtime_api: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("http://{}/{RUNTIME_API_VERSION}/runtime", runtime_api.into()),
        }
    }

    pub fn from_env() -> Result<Self, GatewayError> {
        std::env::var(ENV_RUNTIME_API)
            .map(Self::new)
            .map_err(|err| GatewayError::Runtime { reason: format!("{ENV_RUNTIME_API} is not available: {err}") })
    }

    async fn post(&self, url: String, body: Value) -> Result<(), GatewayError> {
        self.client.post(&url)
            .json(&body)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map(|_| ())
            .map_err(|err| GatewayError::Runtime { reason: format!("failed to post to {url}: {err}") })
    }
}

#[async_trait]
impl LambdaRuntime for RuntimeApiClient {
    async fn next_invocation(&self) -> Result<Option<Invocation>, GatewayError> {
        let url = format!("{}/invocation/next", self.base_url);
        let response = self.client.get(&url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| GatewayError::Runtime { reason: format!("failed to fetch next invocation: {err}") })?;

        let header = |name: &str| response.headers().get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_owned());
        let request_id = header(HEADER_REQUEST_ID)
            .ok_or_else(|| GatewayError::Runtime { reason: format!("invocation is missing {HEADER_REQUEST_ID}") })?;
        let trace_id = header(HEADER_TRACE_ID);

        let payload = response.json::<Value>()
            .await
            .map_err(|err| GatewayError::Runtime { reason: format!("failed to read invocation payload: {err}") })?;

        debug!(request_id = %request_id, "received lambda invocation");
        Ok(Some(Invocation {
            request_id,
            trace_id,
            payload,
        }))
    }

    async fn send_response(&self, request_id: &str, body: Value) -> Result<(), GatewayError> {
        self.post(format!("{}/invocation/{request_id}/response", self.base_url), body).await
    }

    async fn send_error(&self, request_id: &str, error: &GatewayError) -> Result<(), GatewayError> {
        let body = json!({
            "errorMessage": error.to_string(),
            "errorType": error_type(error),
        });
        self.post(format!("{}/invocation/{request_id}/error", self.base_url), body).await
    }
}

fn error_type(error: &GatewayError) -> &'static str {
    match error {
        GatewayError::Decode(_) => "DecodeError",
        GatewayError::Dispatch(_) => "DispatchError",
        GatewayError::EventRejected { .. } => "EventRejected",
        GatewayError::Runtime { .. } | GatewayError::Bind { .. } => "RuntimeError",
        GatewayError::Unimplemented => "Unimplemented",
    }
}
