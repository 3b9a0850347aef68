use {
    std::{sync::Arc, time::Duration},
    tokio::time::timeout,
    serde_json::json,
    membrane_core::{Response, Trigger, protocol::TriggerResponse},
    membrane::{
        Membrane,
        MembraneConfig,
        MembraneError,
        PoolError,
        StartupError,
        config::GatewayConfig,
        gateway::{BoxedGateway, LambdaGateway, UnimplementedGateway},
        resources::StaticTopicResolver,
        worker::{BoxedWorkerPool, FaasWorkerPool, WorkerPool},
    },
    membrane_sdk::{TriggerRequest, WorkerClient},
};

mod common;

fn config(wait_for_worker: bool) -> MembraneConfig {
    MembraneConfig {
        service_address: "127.0.0.1:0".to_owned(),
        gateway: GatewayConfig::Http { address: "127.0.0.1:0".to_owned() },
        worker_timeout_seconds: 2,
        wait_for_worker,
        ..MembraneConfig::default()
    }
}

async fn hello(request: TriggerRequest) -> TriggerResponse {
    match request.trigger {
        Trigger::Http(http) => TriggerResponse::Http(Response::new(200).with_body(format!("hello {}", http.path))),
        Trigger::Event(_) => TriggerResponse::event_handled(),
    }
}

#[tokio::test]
async fn membrane_serves_worker_registered_over_tcp() {
    let membrane = Arc::new(Membrane::from_config(config(true)).await.unwrap());
    let worker_address = membrane.worker_address().to_string();

    let running = tokio::spawn({
        let membrane = membrane.clone();
        async move { membrane.start().await }
    });

    let client = WorkerClient::connect(&worker_address, Some("e2e".to_owned())).await.unwrap();
    tokio::spawn(client.serve(hello));

    timeout(Duration::from_secs(2), async {
        while membrane.pool().worker_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }).await.unwrap();

    let response = membrane.pool()
        .handle(Trigger::Http(membrane_core::HttpRequest::new("GET", "/world")), Default::default())
        .await
        .unwrap();
    assert_eq!(TriggerResponse::Http(Response::new(200).with_body("hello /world")), response);

    membrane.stop().await.unwrap();
    timeout(Duration::from_secs(2), running).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn missing_worker_prevents_gateway_start() {
    let mut config = config(true);
    config.worker_timeout_seconds = 0;

    let pool: BoxedWorkerPool = Arc::new(FaasWorkerPool::new(1));
    // starting this gateway would fail with a different error
    let gateway: BoxedGateway = Arc::new(UnimplementedGateway);
    let membrane = Membrane::new(config, gateway, pool, None).await.unwrap();

    let result = membrane.start().await;
    assert!(matches!(result, Err(MembraneError::Pool(PoolError::WorkerTimeout { .. }))), "unexpected result: {result:?}");
}

#[tokio::test]
async fn child_startup_failure_prevents_gateway_start() {
    let mut config = config(false);
    config.child_command = Some("/definitely/not/a/real/binary".to_owned());

    let pool: BoxedWorkerPool = Arc::new(FaasWorkerPool::new(1));
    let gateway: BoxedGateway = Arc::new(UnimplementedGateway);
    let membrane = Membrane::new(config, gateway, pool, None).await.unwrap();

    let result = membrane.start().await;
    assert!(matches!(result, Err(MembraneError::Startup(StartupError::SpawnFailed { .. }))), "unexpected result: {result:?}");
}

#[tokio::test]
async fn gateway_errors_are_propagated() {
    let pool: BoxedWorkerPool = Arc::new(FaasWorkerPool::new(1));
    let gateway: BoxedGateway = Arc::new(UnimplementedGateway);
    let membrane = Membrane::new(config(false), gateway, pool, None).await.unwrap();

    let result = membrane.start().await;
    assert!(matches!(result, Err(MembraneError::Gateway(_))), "unexpected result: {result:?}");
}

#[cfg(unix)]
#[tokio::test]
async fn child_exit_after_start_is_fatal() {
    // the child's server socket
    let child_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();

    let mut config = config(false);
    config.child_command = Some("sleep 0.3".to_owned());
    config.child_address = child_listener.local_addr().unwrap().to_string();

    let membrane = Membrane::from_config(config).await.unwrap();
    let result = timeout(Duration::from_secs(5), membrane.start()).await.unwrap();
    assert!(matches!(result, Err(MembraneError::Startup(StartupError::ChildExited { .. }))), "unexpected result: {result:?}");
}

async fn slow_hello(request: TriggerRequest) -> TriggerResponse {
    tokio::time::sleep(Duration::from_millis(300)).await;
    hello(request).await
}

async fn lambda_membrane(wait_for_worker: bool) -> (Membrane, Arc<common::ChannelRuntime>, tokio::sync::mpsc::UnboundedSender<membrane::gateway::Invocation>) {
    let (runtime, invocations) = common::ChannelRuntime::new();
    let gateway: BoxedGateway = Arc::new(LambdaGateway::new(runtime.clone(), Arc::new(StaticTopicResolver::default())));
    let pool: BoxedWorkerPool = Arc::new(FaasWorkerPool::new(1));

    let mut config = config(wait_for_worker);
    config.worker_timeout_seconds = 10;
    let membrane = Membrane::new(config, gateway, pool, None).await.unwrap();
    (membrane, runtime, invocations)
}

#[tokio::test]
async fn stop_after_dropped_start_finishes_in_flight_invocation() {
    let (membrane, runtime, invocations) = lambda_membrane(false).await;
    common::connect_worker(membrane.pool().clone(), slow_hello).await;

    invocations.send(common::invocation("req-1", json!({ "rawPath": "/slow" }))).unwrap();
    // start is dropped mid-invocation, as on a shutdown signal
    tokio::select! {
        result = membrane.start() => panic!("membrane stopped early: {result:?}"),
        _ = tokio::time::sleep(Duration::from_millis(100)) => {},
    }

    timeout(Duration::from_secs(2), membrane.stop()).await.unwrap().unwrap();
    let (request_id, reply) = timeout(Duration::from_millis(100), runtime.next_reply()).await.unwrap();
    assert_eq!("req-1", request_id);
    assert_eq!(200, reply.unwrap()["statusCode"]);
}

#[tokio::test]
async fn stop_lets_running_start_return() {
    let (membrane, _runtime, _invocations) = lambda_membrane(false).await;

    let start = membrane.start();
    tokio::pin!(start);
    tokio::select! {
        result = &mut start => panic!("membrane stopped early: {result:?}"),
        _ = tokio::time::sleep(Duration::from_millis(50)) => {},
    }

    let (stopped, result) = timeout(Duration::from_secs(2), async { tokio::join!(membrane.stop(), &mut start) }).await.unwrap();
    stopped.unwrap();
    result.unwrap();
}

#[tokio::test]
async fn stop_interrupts_wait_for_worker() {
    let (membrane, _runtime, _invocations) = lambda_membrane(true).await;

    let start = membrane.start();
    tokio::pin!(start);
    tokio::select! {
        result = &mut start => panic!("membrane started without a worker: {result:?}"),
        _ = tokio::time::sleep(Duration::from_millis(50)) => {},
    }

    let (stopped, result) = timeout(Duration::from_secs(2), async { tokio::join!(membrane.stop(), &mut start) }).await.unwrap();
    stopped.unwrap();
    result.unwrap();
    assert_eq!(0, membrane.pool().worker_count());
}
