use crate::{error::DecodeError, trigger::QueryParams};

/// Parses a raw query string into a multimap, preserving the order of repeated keys.
///
/// Any malformed pair fails the whole string: a partially parsed query is never returned.
pub fn parse_query(raw: &str) -> Result<QueryParams, DecodeError> {
    let mut params = QueryParams::new();

    for pair in raw.split('&') {
        if pair.is_empty() {
            continue;
        }
        if pair.contains(';') {
            return Err(DecodeError::InvalidQuery { reason: format!("invalid semicolon separator in {pair:?}") });
        }

        let (key, value) = match pair.split_once('=') {
            Some((key, value)) => (key, value),
            None => (pair, ""),
        };

        let key = unescape(key)?;
        let value = unescape(value)?;
        params.entry(key).or_default().push(value);
    }

    Ok(params)
}

fn unescape(component: &str) -> Result<String, DecodeError> {
    let bytes = component.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() > i + 2 && bytes[i + 1].is_ascii_hexdigit() && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                let end = (i + 3).min(bytes.len());
                return Err(DecodeError::InvalidQuery {
                    reason: format!("invalid escape {:?}", String::from_utf8_lossy(&bytes[i..end])),
                });
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    urlencoding::decode(&component.replace('+', " "))
        .map(|v| v.into_owned())
        .map_err(|err| DecodeError::InvalidQuery { reason: format!("escaped value is not utf-8: {err}") })
}
