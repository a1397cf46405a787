//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use conditional_meta::{AppConfig, HttpServer, MetaConfig, Shutdown};

/// A canned upstream response.
#[derive(Clone)]
pub struct MockResponse {
    pub status: &'static str,
    pub content_type: &'static str,
    pub body: &'static str,
}

impl MockResponse {
    pub fn json(body: &'static str) -> Self {
        Self {
            status: "200 OK",
            content_type: "application/json",
            body,
        }
    }

    pub fn text(body: &'static str) -> Self {
        Self {
            status: "200 OK",
            content_type: "text/plain",
            body,
        }
    }
}

/// Start a mock backend that answers every request with `response`.
pub async fn start_mock_backend(addr: SocketAddr, response: MockResponse) {
    let listener = TcpListener::bind(addr).await.unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let response = response.clone();
                    tokio::spawn(async move {
                        let mut buf = [0u8; 4096];
                        let _ = socket.read(&mut buf).await;

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nX-Backend: mock\r\nConnection: close\r\n\r\n{}",
                            response.status,
                            response.content_type,
                            response.body.len(),
                            response.body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

/// Start the proxy in front of `backend_addr`.
pub async fn start_proxy(
    proxy_addr: SocketAddr,
    backend_addr: SocketAddr,
    meta: MetaConfig,
) -> Shutdown {
    let mut config = AppConfig::default();
    config.listener.bind_address = proxy_addr.to_string();
    config.upstream.address = backend_addr.to_string();
    config.middleware.config = meta;

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config).unwrap();
    let listener = TcpListener::bind(proxy_addr).await.unwrap();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
