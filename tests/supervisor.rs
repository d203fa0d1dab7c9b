//! Service lifecycle tests: separate-process start, startup and the stop handshake.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use xmldb_http::config::{ProcessMode, ValidationError};
use xmldb_http::database::MemoryDatabase;
use xmldb_http::lifecycle::{
    ping, start_service, stop_instance, StopFailure, StopMarker, Supervisor, SupervisorError,
};

mod common;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn running_listener_fails_fast_without_spawning() {
    let (mut config, _dir) = common::test_config(29100);
    config.ports.http = common::start_mock_responder("404 Not Found").await;
    let launcher = common::CountingLauncher::default();

    let err = start_service(&config, &["-S".to_string()], &launcher)
        .await
        .unwrap_err();

    assert!(matches!(err, SupervisorError::AlreadyRunning(port) if port == config.ports.http));
    assert_eq!(launcher.launches(), 0);
}

#[tokio::test]
async fn child_that_never_answers_times_out() {
    let (mut config, _dir) = common::test_config(29110);
    config.ports.http = common::closed_port().await;
    let launcher = common::CountingLauncher::default();

    let err = start_service(&config, &["-S".to_string(), "-z".to_string()], &launcher)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SupervisorError::StartupTimeout { attempts: 10, .. }
    ));
    assert_eq!(launcher.launches(), 1);
    assert_eq!(launcher.last_args(), ["-S", "-z", "-D"]);
}

#[tokio::test]
async fn duplicate_ports_fail_before_binding() {
    let (mut config, _dir) = common::test_config(29120);
    config.ports.stop = config.ports.http;
    let database = Arc::new(MemoryDatabase::new(&config.database.users));

    let err = Supervisor::new(Arc::new(config.clone()), database)
        .start()
        .await
        .err()
        .unwrap();

    assert!(matches!(
        err,
        SupervisorError::Config(ValidationError::DuplicatePort(port)) if port == config.ports.http
    ));
    // The database server port was never bound.
    tokio::net::TcpListener::bind(("127.0.0.1", config.ports.server))
        .await
        .unwrap();
}

#[tokio::test]
async fn stop_command_stops_database_and_http() {
    let (config, _dir) = common::test_config(29130);
    let config = Arc::new(config);
    let database = Arc::new(MemoryDatabase::new(&config.database.users));
    let running = Supervisor::new(config.clone(), database.clone())
        .start()
        .await
        .unwrap();
    assert!(running.database_addr().is_some());

    let url = format!("http://{}/rest", running.http_addr());
    let response = common::client().get(&url).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert!(ping("127.0.0.1", config.ports.http).await);

    stop_instance(&config).await.unwrap();
    tokio::time::timeout(WAIT, running.wait())
        .await
        .unwrap()
        .unwrap();

    assert!(database.is_closed());
    assert!(!ping("127.0.0.1", config.ports.http).await);
    assert!(!StopMarker::for_port(&config.network.marker_dir, config.ports.stop)
        .exists()
        .await);
    assert!(!StopMarker::for_port(&config.network.marker_dir, config.ports.server)
        .exists()
        .await);
}

#[tokio::test]
async fn stop_without_instance_reports_each_component() {
    let (config, _dir) = common::test_config(29140);

    let err = stop_instance(&config).await.unwrap_err();

    match err {
        SupervisorError::Stop(StopFailure { database, http }) => {
            assert!(database.is_some());
            assert!(http.is_some());
        }
        other => panic!("expected a stop failure, got {other:?}"),
    }
    assert!(!StopMarker::for_port(&config.network.marker_dir, config.ports.stop)
        .exists()
        .await);
}

#[tokio::test]
async fn handle_stops_local_mode_service() {
    let (mut config, _dir) = common::test_config(29150);
    config.mode = ProcessMode::Local;
    let database = Arc::new(MemoryDatabase::new(&config.database.users));
    let running = Supervisor::new(Arc::new(config), database.clone())
        .start()
        .await
        .unwrap();
    assert!(running.database_addr().is_none());

    running.handle().stop();
    tokio::time::timeout(WAIT, running.wait())
        .await
        .unwrap()
        .unwrap();
    assert!(database.is_closed());
}

#[tokio::test]
async fn client_mode_uses_remote_sessions() {
    let (server_config, _server_dir) = common::test_config(29160);
    let server_database = Arc::new(MemoryDatabase::new(&server_config.database.users));
    let server = Supervisor::new(Arc::new(server_config.clone()), server_database.clone())
        .start()
        .await
        .unwrap();

    let (mut client_config, _client_dir) = common::test_config(29170);
    client_config.mode = ProcessMode::Client;
    client_config.ports.server = server_config.ports.server;
    let client_database = Arc::new(MemoryDatabase::new(&client_config.database.users));
    let client = Supervisor::new(Arc::new(client_config), client_database.clone())
        .start()
        .await
        .unwrap();

    let url = format!("http://{}/rest/books/a.xml", client.http_addr());
    let response = common::client()
        .put(&url)
        .body("<book/>")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let url = format!("http://{}/rest/books/a.xml", server.http_addr());
    let response = common::client().get(&url).send().await.unwrap();
    assert_eq!(response.text().await.unwrap(), "<book/>");
    assert_eq!(client_database.sessions_opened(), 0);

    // Missing resources and databases answer the same in both modes.
    for path in ["books/none.xml", "none/a.xml"] {
        let embedded = common::client()
            .get(format!("http://{}/rest/{path}", server.http_addr()))
            .send()
            .await
            .unwrap();
        let remote = common::client()
            .get(format!("http://{}/rest/{path}", client.http_addr()))
            .send()
            .await
            .unwrap();
        assert_eq!(remote.status(), 404);
        assert_eq!(embedded.status(), remote.status());
        assert_eq!(embedded.text().await.unwrap(), remote.text().await.unwrap());
    }

    let response = common::client()
        .get(format!("http://{}/rest?command=FROB", client.http_addr()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    client.handle().stop();
    tokio::time::timeout(WAIT, client.wait()).await.unwrap().unwrap();
    server.handle().stop();
    tokio::time::timeout(WAIT, server.wait()).await.unwrap().unwrap();
    assert_eq!(server_database.open_sessions(), 0);
}

#[tokio::test]
async fn failed_bind_stops_started_database_server() {
    let (config, _dir) = common::test_config(29180);
    let _occupied = tokio::net::TcpListener::bind(("127.0.0.1", config.ports.stop))
        .await
        .unwrap();
    let database = Arc::new(MemoryDatabase::new(&config.database.users));

    let err = Supervisor::new(Arc::new(config.clone()), database)
        .start()
        .await
        .err()
        .unwrap();

    assert!(matches!(err, SupervisorError::Bind(_)));
    // The database server and the HTTP listener released their ports.
    tokio::net::TcpListener::bind(("127.0.0.1", config.ports.server))
        .await
        .unwrap();
    tokio::net::TcpListener::bind(("127.0.0.1", config.ports.http))
        .await
        .unwrap();
}

#[tokio::test]
async fn repeated_stop_leaves_no_marker_for_next_instance() {
    let (config, _dir) = common::test_config(29184);
    let config = Arc::new(config);
    let first = Supervisor::new(config.clone(), Arc::new(MemoryDatabase::new(&config.database.users)))
        .start()
        .await
        .unwrap();

    stop_instance(&config).await.unwrap();
    tokio::time::timeout(WAIT, first.wait()).await.unwrap().unwrap();

    let err = stop_instance(&config).await.unwrap_err();
    assert!(matches!(
        err,
        SupervisorError::Stop(StopFailure {
            database: Some(_),
            http: Some(_),
        })
    ));
    for port in [config.ports.server, config.ports.stop] {
        assert!(!StopMarker::for_port(&config.network.marker_dir, port)
            .exists()
            .await);
    }

    let second = Supervisor::new(config.clone(), Arc::new(MemoryDatabase::new(&config.database.users)))
        .start()
        .await
        .unwrap();
    // Plain connections to the stop and server ports are not stop requests.
    drop(TcpStream::connect(second.stop_addr()).await.unwrap());
    drop(TcpStream::connect(("127.0.0.1", config.ports.server)).await.unwrap());
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(ping("127.0.0.1", config.ports.http).await);
    assert!(TcpStream::connect(("127.0.0.1", config.ports.server)).await.is_ok());

    second.handle().stop();
    tokio::time::timeout(WAIT, second.wait()).await.unwrap().unwrap();
}

#[tokio::test]
async fn in_flight_request_completes_before_restart() {
    let (config, _dir) = common::test_config(29188);
    let config = Arc::new(config);
    let database = Arc::new(MemoryDatabase::new(&config.database.users));
    let running = Supervisor::new(config.clone(), database.clone())
        .start()
        .await
        .unwrap();

    let mut stream = TcpStream::connect(running.http_addr()).await.unwrap();
    stream
        .write_all(
            b"PUT /rest/books/slow.xml HTTP/1.1\r\nHost: localhost\r\n\
              Content-Length: 7\r\nConnection: close\r\n\r\n<bo",
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    stop_instance(&config).await.unwrap();

    stream.write_all(b"ok/>").await.unwrap();
    let mut response = String::new();
    tokio::time::timeout(WAIT, stream.read_to_string(&mut response))
        .await
        .unwrap()
        .unwrap();
    assert!(response.starts_with("HTTP/1.1 201"), "{response}");
    assert!(response.ends_with("Resource \"books/slow.xml\" was stored."));

    tokio::time::timeout(WAIT, running.wait())
        .await
        .unwrap()
        .unwrap();
    assert!(database.is_closed());
    assert_eq!(database.open_sessions(), 0);

    let restarted = Supervisor::new(config.clone(), Arc::new(MemoryDatabase::new(&config.database.users)))
        .start()
        .await
        .unwrap();
    assert!(ping("127.0.0.1", config.ports.http).await);
    restarted.handle().stop();
    tokio::time::timeout(WAIT, restarted.wait())
        .await
        .unwrap()
        .unwrap();
}
