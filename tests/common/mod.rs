//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cat_relay::acme::{AcmeResult, ChallengeStore, IssuedCertificate, Issuer};
use cat_relay::config::RelayConfig;
use cat_relay::net::Listener;
use cat_relay::{RelayServer, Shutdown};
use rcgen::{CertificateParams, KeyPair};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// The first item the image API returns, pointing at `url`.
pub fn item_json(id: &str, url: &str) -> String {
    format!(
        r#"[{{"id":"{}","url":"{}","breeds":[],"width":100,"height":100}}]"#,
        id, url
    )
}

/// Start a programmable mock upstream on an ephemeral port.
///
/// `f` receives the raw request head and returns the status code and JSON
/// body to answer with.
pub async fn start_programmable_upstream<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        answer(socket, f.as_ref()).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

async fn answer<F, Fut>(mut socket: TcpStream, f: &F)
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = (u16, String)>,
{
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }

    let (status, body) = f(String::from_utf8_lossy(&head).into_owned()).await;
    let status_text = match status {
        200 => "200 OK",
        401 => "401 Unauthorized",
        404 => "404 Not Found",
        429 => "429 Too Many Requests",
        500 => "500 Internal Server Error",
        503 => "503 Service Unavailable",
        _ => "200 OK",
    };

    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_text,
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Relay configuration pointed at a mock upstream.
pub fn relay_config(upstream: SocketAddr) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.upstream.url = format!("http://{}/v1/images/search", upstream);
    config.upstream.api_key = "secret-token".to_string();
    config.upstream.timeout_secs = 2;
    config
}

/// Serve `config` over plain HTTP on an ephemeral port.
pub async fn start_plain_relay(config: RelayConfig, shutdown: &Shutdown) -> SocketAddr {
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let listener = Listener::from_tcp(tcp, config.listener.max_connections);
    let addr = listener.local_addr().unwrap();

    let server = RelayServer::new(config).unwrap();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    addr
}

/// Issues self-signed certificates and counts how often it is asked.
///
/// With `register_challenge` set it behaves like a TLS-ALPN-01 order: the
/// validation certificate is registered for the whole of `delay`.
#[derive(Clone)]
pub struct SelfSignedIssuer {
    pub calls: Arc<AtomicUsize>,
    pub delay: Duration,
    pub register_challenge: bool,
}

impl SelfSignedIssuer {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            delay: Duration::from_millis(20),
            register_challenge: false,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Issuer for SelfSignedIssuer {
    async fn issue(&self, host: &str, challenges: &ChallengeStore) -> AcmeResult<IssuedCertificate> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.register_challenge {
            challenges.register(host, &[42u8; 32])?;
        }
        tokio::time::sleep(self.delay).await;

        let key = KeyPair::generate()?;
        let cert = CertificateParams::new(vec![host.to_string()])?.self_signed(&key)?;
        IssuedCertificate::from_pem(&format!("{}{}", key.serialize_pem(), cert.pem()))
    }
}
