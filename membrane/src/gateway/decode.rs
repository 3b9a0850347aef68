use {
    std::collections::HashMap,
    serde::Deserialize,
    serde_json::Value,
    membrane_core::{HeaderMap, Event, DecodeError, append_header},
};

pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Copies headers into a multimap. `Host` is moved under `x-forwarded-for` so the origin
/// survives the provider edge instead of being forwarded verbatim.
pub fn copy_headers<'a>(headers: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<HeaderMap, DecodeError> {
    let mut copy = HeaderMap::new();
    for (name, value) in headers {
        if name.eq_ignore_ascii_case("host") {
            append_header(&mut copy, FORWARDED_FOR_HEADER, value)?;
        } else {
            append_header(&mut copy, name, value)?;
        }
    }
    Ok(copy)
}

/// Metadata envelope that may wrap an event message to carry its id across the provider transport.
#[derive(Deserialize)]
struct MessageEnvelope {
    id: String,
    payload: Value,
}

/// Builds an event from a provider message body. Falls back to the raw bytes and the provider's
/// message id when the body is not a metadata envelope.
pub fn event_from_message(message: &[u8], provider_message_id: &str, topic: String, attributes: HashMap<String, String>) -> Event {
    let envelope = serde_json::from_slice::<MessageEnvelope>(message).ok()
        .and_then(|envelope| serde_json::to_vec(&envelope.payload).ok().map(|payload| (envelope.id, payload)));

    let (id, payload) = match envelope {
        Some(v) => v,
        None => (provider_message_id.to_owned(), message.to_vec()),
    };

    Event {
        id,
        topic,
        payload,
        attributes,
    }
}
