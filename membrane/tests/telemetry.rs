use {
    std::collections::HashMap,
    membrane_core::{HeaderMap, append_header},
    membrane::telemetry::{TraceContext, TRACEPARENT, AMZN_TRACE_ID},
};

const TRACEPARENT_VALUE: &str = "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01";

#[test]
fn extracts_only_propagation_headers() {
    let mut headers = HeaderMap::new();
    append_header(&mut headers, "Traceparent", TRACEPARENT_VALUE).unwrap();
    append_header(&mut headers, "Content-Type", "text/plain").unwrap();

    let context = TraceContext::from_headers(&headers);
    assert_eq!(Some(TRACEPARENT_VALUE), context.get(TRACEPARENT));
    assert_eq!(1, context.into_map().len());
}

#[test]
fn attribute_keys_are_case_insensitive() {
    let attributes = HashMap::from([
        ("TraceParent".to_owned(), TRACEPARENT_VALUE.to_owned()),
        ("other".to_owned(), "x".to_owned()),
    ]);

    let context = TraceContext::from_attributes(&attributes);
    assert_eq!(Some("0af7651916cd43dd8448eb211c80319c".to_owned()), context.trace_id());
}

#[test]
fn runtime_trace_id_is_a_fallback() {
    let context = TraceContext::empty().or_amzn_trace_id(Some("Root=1-5759e988-bd862e3fe1be46a994272793;Sampled=1"));
    assert_eq!(Some("1-5759e988-bd862e3fe1be46a994272793".to_owned()), context.trace_id());

    let mut headers = HeaderMap::new();
    append_header(&mut headers, "traceparent", TRACEPARENT_VALUE).unwrap();
    let context = TraceContext::from_headers(&headers).or_amzn_trace_id(Some("Root=1-abc"));
    assert!(context.get(AMZN_TRACE_ID).is_none());
}

#[test]
fn empty_context_has_no_trace_id() {
    let context = TraceContext::empty();
    assert!(context.is_empty());
    assert_eq!(None, context.trace_id());
}
