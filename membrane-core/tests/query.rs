use membrane_core::{parse_query, DecodeError};

#[test]
fn repeated_keys_keep_order() {
    let query = parse_query("a=1&a=2&b=x").unwrap();
    assert_eq!(vec!["1".to_owned(), "2".to_owned()], query["a"]);
    assert_eq!(vec!["x".to_owned()], query["b"]);
}

#[test]
fn empty_query() {
    assert!(parse_query("").unwrap().is_empty());
}

#[test]
fn escapes_are_decoded() {
    let query = parse_query("name=hello+world&path=%2Fusers%2F1&flag").unwrap();
    assert_eq!("hello world", query["name"][0]);
    assert_eq!("/users/1", query["path"][0]);
    assert_eq!("", query["flag"][0]);
}

#[test]
fn malformed_escape_fails_whole_query() {
    match parse_query("a=1&b=%zz") {
        Err(DecodeError::InvalidQuery { .. }) => {},
        other => panic!("expected invalid query error, got: {other:?}"),
    }
}

#[test]
fn truncated_escape_fails() {
    assert!(parse_query("a=%4").is_err());
}

#[test]
fn semicolon_separator_is_rejected() {
    assert!(parse_query("a=1;b=2").is_err());
}
