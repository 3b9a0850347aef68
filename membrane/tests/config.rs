use {
    std::collections::HashMap,
    membrane::{
        MembraneConfig,
        config::{ChildLogs, ConfigError, GatewayConfig, LogLevel},
    },
};

#[test]
fn empty_config_uses_defaults() {
    let config = MembraneConfig::from_yaml("").unwrap();
    assert_eq!(MembraneConfig::default(), config);
    assert_eq!("127.0.0.1:50051", config.service_address);
    assert_eq!("localhost:8080", config.child_address);
    assert_eq!(5, config.child_timeout_seconds);
    assert_eq!(1, config.max_workers);
    assert!(config.wait_for_worker);
}

#[test]
fn parses_full_config() {
    let config = MembraneConfig::from_yaml(r#"
service_address: 0.0.0.0:50051
child_command: node index.js
child_address: 127.0.0.1:3000
child_timeout_seconds: 2
child_logs: capture
max_workers: 4
gateway:
  type: lambda
  runtime_api: 127.0.0.1:9001
topics:
  orders: arn:aws:sns:us-east-1:123:orders
metrics_port: 8081
log_level: debug
"#).unwrap();

    assert_eq!(Some("node index.js".to_owned()), config.child_command);
    assert_eq!(ChildLogs::Capture, config.child_logs);
    assert_eq!(4, config.max_workers);
    assert_eq!(GatewayConfig::Lambda { runtime_api: Some("127.0.0.1:9001".to_owned()) }, config.gateway);
    assert_eq!(HashMap::from([("orders".to_owned(), "arn:aws:sns:us-east-1:123:orders".to_owned())]), config.topics);
    assert_eq!(Some(8081), config.metrics_port);
    assert_eq!(LogLevel::Debug, config.log_level);
}

#[test]
fn rejects_zero_workers() {
    assert!(matches!(MembraneConfig::from_yaml("max_workers: 0"), Err(ConfigError::Invalid { .. })));
}

#[test]
fn rejects_blank_child_command() {
    assert!(matches!(MembraneConfig::from_yaml("child_command: '  '"), Err(ConfigError::Invalid { .. })));
}

#[test]
fn rejects_unknown_gateway() {
    assert!(matches!(MembraneConfig::from_yaml("gateway:\n  type: carrier-pigeon"), Err(ConfigError::FailedToParse(_))));
}
