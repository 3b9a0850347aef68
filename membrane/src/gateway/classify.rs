use serde_json::Value;

/// Marker field of internal readiness probes. Such payloads never reach a worker.
pub const HEALTHCHECK_FIELD: &str = "x-nitric-healthcheck";

const SNS_EVENT_SOURCE: &str = "aws:sns";

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PayloadKind {
    Http,
    PubSub,
    HealthCheck,
    Unknown,
}

/// Cheap structural probe of a provider payload. Only looks at field presence, never decodes.
pub fn classify(payload: &Value) -> PayloadKind {
    let Some(object) = payload.as_object() else {
        return PayloadKind::Unknown;
    };

    if object.contains_key(HEALTHCHECK_FIELD) {
        return PayloadKind::HealthCheck;
    }

    if object.contains_key("rawPath") {
        return PayloadKind::Http;
    }

    let records = object.get("Records").or_else(|| object.get("records"));
    if let Some(first) = records.and_then(|v| v.as_array()).and_then(|v| v.first()) {
        let event_source = first.get("EventSource")
            .or_else(|| first.get("eventSource"))
            .and_then(|v| v.as_str());
        return match event_source {
            Some(SNS_EVENT_SOURCE) => PayloadKind::PubSub,
            _ => PayloadKind::Unknown,
        };
    }

    // push subscription envelope: {"message": {...}, "subscription": "..."}
    if object.get("message").is_some_and(|v| v.is_object()) && object.get("subscription").is_some_and(|v| v.is_string()) {
        return PayloadKind::PubSub;
    }

    PayloadKind::Unknown
}
