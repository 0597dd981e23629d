//! Shared utilities for integration testing.

#![allow(dead_code)]

use axum::{
    body::Bytes,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::future::BoxFuture;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use ip_allowlist_gateway::address::AddressNormalizer;
use ip_allowlist_gateway::admin::{run_admin_server, AdminState};
use ip_allowlist_gateway::config::ClientAddressConfig;
use ip_allowlist_gateway::gateway::{Forwarder, Gateway};
use ip_allowlist_gateway::http::HttpServer;
use ip_allowlist_gateway::lifecycle::Shutdown;
use ip_allowlist_gateway::policy::{PolicyCache, PolicyStore, StoreError};

pub const ADMIN_KEY: &str = "test-admin-key";

/// Store whose every read fails.
pub struct UnreachableStore;

impl PolicyStore for UnreachableStore {
    fn enabled_rules(&self) -> BoxFuture<'_, Result<Vec<String>, StoreError>> {
        Box::pin(async { Err(StoreError::Unavailable("connection refused".into())) })
    }

    fn describe(&self) -> String {
        "unreachable".into()
    }
}

/// Start a mock upstream on an ephemeral port.
///
/// `/teapot` answers 418 with a custom header; every other path echoes the
/// request it received as JSON.
pub async fn start_mock_upstream() -> SocketAddr {
    let app = Router::new()
        .route("/teapot", get(teapot))
        .fallback(echo);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<serde_json::Value> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
    Json(json!({
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query(),
        "host": header("host"),
        "x_custom": header("x-custom"),
        "x_request_id": header("x-request-id"),
        "x_forwarded_for": header("x-forwarded-for"),
        "content_length": header("content-length"),
        "body": String::from_utf8_lossy(&body),
    }))
}

async fn teapot() -> Response {
    (
        StatusCode::IM_A_TEAPOT,
        [(header::HeaderName::from_static("x-upstream"), "kettle")],
        "short and stout",
    )
        .into_response()
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub struct TestGateway {
    pub addr: SocketAddr,
    pub admin_addr: SocketAddr,
    pub gateway: Arc<Gateway>,
    pub shutdown: Shutdown,
    pub server: tokio::task::JoinHandle<Result<(), std::io::Error>>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn admin_url(&self, path: &str) -> String {
        format!("http://{}{}", self.admin_addr, path)
    }
}

/// Start the gateway and its admin API on ephemeral ports.
pub async fn start_gateway(origin: &str, store: Arc<dyn PolicyStore>, ttl: Duration) -> TestGateway {
    let gateway = Arc::new(Gateway::new(
        AddressNormalizer::from_config(&ClientAddressConfig::default()),
        Arc::new(PolicyCache::new(store, ttl)),
        Forwarder::from_origin(origin).unwrap(),
    ));
    let shutdown = Shutdown::new();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(HttpServer::new(Arc::clone(&gateway)).run(listener, shutdown.subscribe()));

    let admin_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let admin_addr = admin_listener.local_addr().unwrap();
    tokio::spawn(run_admin_server(
        admin_listener,
        AdminState::new(Arc::clone(&gateway), ADMIN_KEY),
        shutdown.subscribe(),
    ));

    TestGateway {
        addr,
        admin_addr,
        gateway,
        shutdown,
        server,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap()
}
