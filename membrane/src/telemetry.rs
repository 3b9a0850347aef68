//! Trace context carried across the provider -> gateway -> worker boundary.

use {
    std::collections::HashMap,
    tracing::{Span, info_span},
    membrane_core::{HeaderMap, TriggerKind},
};

pub const TRACEPARENT: &str = "traceparent";
pub const TRACESTATE: &str = "tracestate";
pub const AMZN_TRACE_ID: &str = "x-amzn-trace-id";

const PROPAGATED_KEYS: [&str; 3] = [TRACEPARENT, TRACESTATE, AMZN_TRACE_ID];

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct TraceContext {
    fields: HashMap<String, String>,
}

impl TraceContext {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_headers(headers: &HeaderMap) -> Self {
        let fields = PROPAGATED_KEYS.iter()
            .filter_map(|key| headers.get(*key)
                .and_then(|v| v.to_str().ok())
                .map(|v| ((*key).to_owned(), v.to_owned())))
            .collect();
        Self { fields }
    }

    /// Event attributes are a plain map, so keys are matched ignoring case.
    pub fn from_attributes(attributes: &HashMap<String, String>) -> Self {
        let fields = attributes.iter()
            .filter_map(|(key, value)| {
                let key = key.to_lowercase();
                PROPAGATED_KEYS.contains(&key.as_str()).then(|| (key, value.clone()))
            })
            .collect();
        Self { fields }
    }

    /// Falls back to the trace id handed out by the provider runtime when the trigger carried none.
    pub fn or_amzn_trace_id(mut self, trace_id: Option<&str>) -> Self {
        if let Some(trace_id) = trace_id {
            if !self.fields.contains_key(AMZN_TRACE_ID) && !self.fields.contains_key(TRACEPARENT) {
                self.fields.insert(AMZN_TRACE_ID.to_owned(), trace_id.to_owned());
            }
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(|v| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn trace_id(&self) -> Option<String> {
        if let Some(traceparent) = self.get(TRACEPARENT) {
            // version-traceid-parentid-flags
            return traceparent.split('-').nth(1).map(|v| v.to_owned());
        }

        self.get(AMZN_TRACE_ID).and_then(|header| header.split(';')
            .filter_map(|part| part.trim().split_once('='))
            .find(|(key, _)| *key == "Root")
            .map(|(_, value)| value.to_owned()))
    }

    pub fn span(&self, kind: TriggerKind) -> Span {
        info_span!("dispatch", kind = %kind, trace_id = %self.trace_id().unwrap_or_default())
    }

    pub fn into_map(self) -> HashMap<String, String> {
        self.fields
    }
}
