use {
    std::sync::Arc,
    serde_json::json,
    base64::{Engine as _, engine::general_purpose::STANDARD as BASE64},
    membrane_core::{Response, Trigger, DecodeError},
    membrane::{
        gateway::{
            classify,
            PayloadKind,
            decode_http_event,
            decode_sns_event,
            encode_http_response,
            decode_payload,
            LambdaPayload,
            FORWARDED_FOR_HEADER,
        },
        resources::{StaticTopicResolver, TopicResolver},
    },
};

fn resolver() -> Arc<dyn TopicResolver> {
    Arc::new(StaticTopicResolver::default()
        .with_topic("orders", "arn:aws:sns:us-east-1:123:orders")
        .with_topic("users", "arn:aws:sns:us-east-1:123:users"))
}

fn sns_record(message_id: &str, topic_arn: &str, message: &str) -> serde_json::Value {
    json!({
        "EventSource": "aws:sns",
        "Sns": {
            "MessageId": message_id,
            "TopicArn": topic_arn,
            "Message": message,
            "MessageAttributes": {
                "traceparent": { "Type": "String", "Value": "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01" },
            },
        },
    })
}

#[test]
fn classifies_payload_shapes() {
    assert_eq!(PayloadKind::Http, classify(&json!({ "rawPath": "/" })));
    assert_eq!(PayloadKind::PubSub, classify(&json!({ "Records": [{ "EventSource": "aws:sns" }] })));
    assert_eq!(PayloadKind::PubSub, classify(&json!({ "message": { "data": "" }, "subscription": "projects/p/subscriptions/s" })));
    assert_eq!(PayloadKind::HealthCheck, classify(&json!({ "x-nitric-healthcheck": true, "rawPath": "/" })));
    assert_eq!(PayloadKind::Unknown, classify(&json!({ "Records": [{ "eventSource": "aws:sqs" }] })));
    assert_eq!(PayloadKind::Unknown, classify(&json!({ "hello": "world" })));
    assert_eq!(PayloadKind::Unknown, classify(&json!([1, 2, 3])));
}

#[test]
fn http_event_moves_host_and_parses_query() {
    let payload = json!({
        "rawPath": "/x",
        "headers": { "host": "api.example.com" },
        "rawQueryString": "a=1&a=2",
        "body": "hi",
    });

    let request = decode_http_event(&payload).unwrap();
    assert_eq!("/x", request.path);
    assert_eq!("GET", request.method);
    assert_eq!("api.example.com", request.headers.get(FORWARDED_FOR_HEADER).unwrap().to_str().unwrap());
    assert!(request.headers.get("host").is_none());
    assert_eq!(vec!["1".to_owned(), "2".to_owned()], request.query["a"]);
    assert_eq!(b"hi".to_vec(), request.body);
}

#[test]
fn http_event_merges_cookies_in_order() {
    let payload = json!({
        "rawPath": "/",
        "headers": { "Cookie": "stale=1", "Content-Type": "text/plain" },
        "cookies": ["a=1", "b=2"],
        "requestContext": { "http": { "method": "POST" } },
    });

    let request = decode_http_event(&payload).unwrap();
    let cookies: Vec<_> = request.headers.get_all("cookie").iter().map(|v| v.to_str().unwrap()).collect();
    assert_eq!(vec!["a=1", "b=2"], cookies);
    assert_eq!("POST", request.method);
    assert_eq!("text/plain", request.headers.get("content-type").unwrap().to_str().unwrap());
}

#[test]
fn http_event_decodes_base64_body() {
    let payload = json!({
        "rawPath": "/upload",
        "body": BASE64.encode([0u8, 159, 146, 150]),
        "isBase64Encoded": true,
    });

    let request = decode_http_event(&payload).unwrap();
    assert_eq!(vec![0u8, 159, 146, 150], request.body);
}

#[test]
fn http_event_with_bad_query_is_a_decode_error() {
    let payload = json!({ "rawPath": "/", "rawQueryString": "a=%zz" });
    assert!(matches!(decode_http_event(&payload), Err(DecodeError::InvalidQuery { .. })));
}

#[tokio::test]
async fn sns_event_unwraps_metadata_envelope() {
    let message = json!({ "id": "evt-1", "payload": { "order": 42 } }).to_string();
    let payload = json!({ "Records": [sns_record("sns-1", "arn:aws:sns:us-east-1:123:orders", &message)] });

    let events = decode_sns_event(&payload, resolver().as_ref()).await.unwrap();
    assert_eq!(1, events.len());
    assert_eq!("evt-1", events[0].id);
    assert_eq!("orders", events[0].topic);
    assert_eq!(json!({ "order": 42 }), serde_json::from_slice::<serde_json::Value>(&events[0].payload).unwrap());
    assert!(events[0].attributes.contains_key("traceparent"));
}

#[tokio::test]
async fn sns_event_falls_back_to_raw_message() {
    let payload = json!({ "Records": [sns_record("sns-2", "arn:aws:sns:us-east-1:123:orders", "not { json")] });

    let events = decode_sns_event(&payload, resolver().as_ref()).await.unwrap();
    assert_eq!(1, events.len());
    assert_eq!("sns-2", events[0].id);
    assert_eq!(b"not { json".to_vec(), events[0].payload);
}

#[tokio::test]
async fn sns_event_drops_records_with_unknown_topic() {
    let payload = json!({
        "Records": [
            sns_record("sns-1", "arn:aws:sns:us-east-1:123:orders", "one"),
            sns_record("sns-2", "arn:aws:sns:us-east-1:123:missing", "two"),
            sns_record("sns-3", "arn:aws:sns:us-east-1:123:users", "three"),
        ],
    });

    let events = decode_sns_event(&payload, resolver().as_ref()).await.unwrap();
    let ids: Vec<_> = events.iter().map(|v| v.id.as_str()).collect();
    assert_eq!(vec!["sns-1", "sns-3"], ids);
}

#[tokio::test]
async fn health_check_produces_no_triggers() {
    let payload = json!({ "x-nitric-healthcheck": true });
    let decoded = decode_payload(&payload, resolver().as_ref()).await.unwrap();
    assert!(matches!(decoded, LambdaPayload::HealthCheck));
    assert!(decoded.into_triggers().is_empty());
}

#[tokio::test]
async fn unknown_payload_is_a_decode_error() {
    let result = decode_payload(&json!({ "foo": "bar" }), resolver().as_ref()).await;
    assert!(matches!(result, Err(DecodeError::UnknownPayload)));
}

#[tokio::test]
async fn http_payload_yields_single_trigger() {
    let triggers = decode_payload(&json!({ "rawPath": "/a" }), resolver().as_ref()).await.unwrap().into_triggers();
    assert!(matches!(triggers.as_slice(), [Trigger::Http(request)] if request.path == "/a"));
}

#[test]
fn encoded_response_keeps_status_headers_and_body() {
    let response = Response::new(201)
        .with_header("Content-Type", "application/json").unwrap()
        .with_header("X-Multi", "a").unwrap()
        .with_header("x-multi", "b").unwrap()
        .with_header("Set-Cookie", "session=1").unwrap()
        .with_body(vec![0u8, 1, 2, 255]);

    let encoded = encode_http_response(&response);
    assert_eq!(201, encoded["statusCode"]);
    assert_eq!("application/json", encoded["headers"]["content-type"]);
    assert_eq!("a,b", encoded["headers"]["x-multi"]);
    assert_eq!(json!(["session=1"]), encoded["cookies"]);
    assert_eq!(true, encoded["isBase64Encoded"]);
    assert_eq!(vec![0u8, 1, 2, 255], BASE64.decode(encoded["body"].as_str().unwrap()).unwrap());
}
