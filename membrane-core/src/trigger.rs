use {
    std::{collections::HashMap, fmt},
    serde::{Serialize, Deserialize},
    http::{HeaderMap, HeaderName, HeaderValue},
    crate::error::DecodeError,
};

pub type QueryParams = HashMap<String, Vec<String>>;

/// Canonical unit of inbound work. Built once by a gateway and consumed by exactly one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Trigger {
    Http(HttpRequest),
    Event(Event),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum TriggerKind {
    Http,
    Event,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Event => "event",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Trigger {
    pub fn kind(&self) -> TriggerKind {
        match self {
            Self::Http(_) => TriggerKind::Http,
            Self::Event(_) => TriggerKind::Event,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
    #[serde(with = "http_serde::header_map")]
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    pub method: String,
    pub path: String,
    pub query: QueryParams,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            headers: HeaderMap::new(),
            body: Vec::new(),
            method: method.into(),
            path: path.into(),
            query: QueryParams::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_query(mut self, query: QueryParams) -> Self {
        self.query = query;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub topic: String,
    pub payload: Vec<u8>,
    pub attributes: HashMap<String, String>,
}

/// Reply of a worker to an http trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    #[serde(with = "http_serde::header_map")]
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, DecodeError> {
        append_header(&mut self.headers, name, value)?;
        Ok(self)
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

/// Appends a header, keeping any existing values under the same (case-insensitive) name.
pub fn append_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), DecodeError> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|err| DecodeError::InvalidHeader { name: name.to_owned(), reason: err.to_string() })?;
    let header_value = HeaderValue::from_str(value)
        .map_err(|err| DecodeError::InvalidHeader { name: name.to_owned(), reason: err.to_string() })?;
    headers.append(header_name, header_value);
    Ok(())
}
