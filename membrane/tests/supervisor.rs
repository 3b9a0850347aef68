use {
    std::time::{Duration, Instant},
    tokio::{net::TcpListener, time::timeout},
    membrane::{
        StartupError,
        config::ChildLogs,
        supervisor::ProcessSupervisor,
    },
};

async fn unused_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);
    address
}

#[tokio::test]
async fn spawn_failure_is_reported_without_polling() {
    let supervisor = ProcessSupervisor::new("/definitely/not/a/real/binary --flag", "127.0.0.1:1")
        .with_timeout(Duration::from_secs(5));

    let started_at = Instant::now();
    let result = supervisor.start().await;
    assert!(matches!(result, Err(StartupError::SpawnFailed { .. })));
    assert!(started_at.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn empty_command_is_rejected() {
    let supervisor = ProcessSupervisor::new("   ", "127.0.0.1:1");
    assert!(matches!(supervisor.start().await, Err(StartupError::EmptyCommand)));
}

#[cfg(unix)]
#[tokio::test]
async fn unreachable_child_times_out() {
    let address = unused_address().await;
    let supervisor = ProcessSupervisor::new("sleep 5", address.clone())
        .with_timeout(Duration::from_millis(200));

    let started_at = Instant::now();
    let result = supervisor.start().await;
    let elapsed = started_at.elapsed();

    match result {
        Err(StartupError::ChildUnreachable { address: reported }) => assert_eq!(address, reported),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_secs(2));
}

#[cfg(unix)]
#[tokio::test]
async fn reachable_child_starts_and_stops() {
    // stands in for the child's server socket
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();

    let supervisor = ProcessSupervisor::new("sleep 30", address)
        .with_timeout(Duration::from_secs(2))
        .with_child_logs(ChildLogs::Capture);

    supervisor.start().await.unwrap();
    assert!(!supervisor.has_exited());

    timeout(Duration::from_secs(5), supervisor.stop()).await.unwrap();
    assert!(supervisor.has_exited());
    // stopping twice is fine
    timeout(Duration::from_secs(1), supervisor.stop()).await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn child_exit_is_observed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();

    let supervisor = ProcessSupervisor::new("sleep 0.2", address).with_timeout(Duration::from_secs(2));
    supervisor.start().await.unwrap();

    let err = timeout(Duration::from_secs(5), supervisor.wait_exit()).await.unwrap();
    assert!(matches!(err, StartupError::ChildExited { .. }));
}

#[tokio::test]
async fn stop_without_start_returns_immediately() {
    let supervisor = ProcessSupervisor::new("sleep 1", "127.0.0.1:1");
    timeout(Duration::from_millis(100), supervisor.stop()).await.unwrap();
}
