//! End-to-end pipeline tests over a real socket.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::extract::Path;
use axum::http::StatusCode;
use serde_json::Value;
use tokio::sync::oneshot;
use toyshop::api::error::ApiError;
use toyshop::api::loader::{RouteRegistry, RouteUnit};
use toyshop::bootstrap::{Bootstrap, Phase};
use toyshop::config::ServerConfig;

const VALID_ID: &str = "64b7f0c2a1e4d3b2c1a09f8e";

fn fixtures() -> anyhow::Result<RouteUnit> {
    Ok(RouteUnit::new()
        .get("/teapot", || async {
            Err::<(), _>(ApiError::new(StatusCode::IM_A_TEAPOT, "short and stout"))
        })
        .get("/leaky", || async {
            Err::<(), _>(ApiError::from(anyhow::anyhow!(
                "connection string postgres://admin:s3cret@db rejected"
            )))
        })
        .get("/items/{id}", |Path(id): Path<String>| async move { format!("item {id}") }))
}

struct TestServer {
    addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
    _dir: tempfile::TempDir,
}

impl TestServer {
    async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServerConfig::with_base_dir(dir.path());
        config.host = IpAddr::V4(Ipv4Addr::LOCALHOST);
        config.port = 0;
        std::fs::create_dir_all(&config.uploads.disk_root).unwrap();
        std::fs::write(config.uploads.disk_root.join("x.jpg"), b"\xff\xd8\xff\xe0pixels").unwrap();
        std::fs::write(dir.path().join("uploads").join("private.txt"), b"do not serve").unwrap();

        let registry = RouteRegistry::new().register("fixtures", fixtures);
        let running = Bootstrap::new(config, registry).start().await.unwrap();
        let addr = running.local_addr().unwrap();

        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            running
                .serve(async {
                    let _ = stopped.await;
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            stop: Some(stop),
            handle,
            _dir: dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        (&mut self.handle).await.unwrap();
    }
}

async fn json_of(response: reqwest::Response) -> Value {
    response.json().await.unwrap()
}

#[tokio::test]
async fn test_api_error_status_and_message_pass_through() {
    let server = TestServer::start().await;
    let response = reqwest::get(server.url("/api/v1.0/teapot")).await.unwrap();
    assert_eq!(response.status().as_u16(), 418);
    let body = json_of(response).await;
    assert_eq!(body["message"], "short and stout");
    server.shutdown().await;
}

#[tokio::test]
async fn test_untyped_failure_is_500_without_details() {
    let server = TestServer::start().await;
    let response = reqwest::get(server.url("/api/v1.0/leaky")).await.unwrap();
    assert_eq!(response.status().as_u16(), 500);
    let text = response.text().await.unwrap();
    assert!(!text.contains("s3cret"));
    assert!(!text.contains("postgres"));
    let body: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body["status"], 500);
    server.shutdown().await;
}

#[tokio::test]
async fn test_id_validation() {
    let server = TestServer::start().await;

    let ok = reqwest::get(server.url(&format!("/api/v1.0/items/{VALID_ID}")))
        .await
        .unwrap();
    assert_eq!(ok.status().as_u16(), 200);
    assert_eq!(ok.text().await.unwrap(), format!("item {VALID_ID}"));

    let bad = reqwest::get(server.url("/api/v1.0/items/42")).await.unwrap();
    assert_eq!(bad.status().as_u16(), 400);
    let body = json_of(bad).await;
    assert_eq!(body["status"], 400);
    assert!(body["message"].as_str().unwrap().contains("'42'"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_unmatched_routes() {
    let server = TestServer::start().await;
    for path in ["/", "/api/v1.0", "/api/v1.0/unknown", "/toys"] {
        let response = reqwest::get(server.url(path)).await.unwrap();
        assert_eq!(response.status().as_u16(), 404, "{path}");
        let body = json_of(response).await;
        assert_eq!(body["status"], 404);
        assert_eq!(body["message"], "Not found");
    }
    server.shutdown().await;
}

#[tokio::test]
async fn test_uploads() {
    let server = TestServer::start().await;

    let hit = reqwest::get(server.url("/toys-images/x.jpg")).await.unwrap();
    assert_eq!(hit.status().as_u16(), 200);
    assert_eq!(&hit.bytes().await.unwrap()[..], b"\xff\xd8\xff\xe0pixels");

    let miss = reqwest::get(server.url("/toys-images/y.jpg")).await.unwrap();
    assert_eq!(miss.status().as_u16(), 404);

    let escape = reqwest::get(server.url("/toys-images/%2e%2e/private.txt"))
        .await
        .unwrap();
    assert_ne!(escape.status().as_u16(), 200);
    assert!(!escape.text().await.unwrap().contains("do not serve"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_db_failure_keeps_port_closed() {
    let dir = tempfile::tempdir().unwrap();
    let port = {
        let spare = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        spare.local_addr().unwrap().port()
    };

    let mut config = ServerConfig::with_base_dir(dir.path());
    config.host = IpAddr::V4(Ipv4Addr::LOCALHOST);
    config.port = port;
    config.database_path = dir.path().join("missing").join("db.sqlite");
    std::fs::create_dir_all(&config.uploads.disk_root).unwrap();

    let bootstrap = Bootstrap::new(config, RouteRegistry::new().register("fixtures", fixtures));
    let phases = bootstrap.subscribe();
    assert!(bootstrap.start().await.is_err());
    assert_eq!(*phases.borrow(), Phase::Failed);

    let connect = tokio::net::TcpStream::connect(("127.0.0.1", port)).await;
    assert!(connect.is_err());
}
