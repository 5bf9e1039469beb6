//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the relay handler
//! - Wire up middleware (request ID, tracing, request timeout)
//! - Run the accept loop, over TLS or plain TCP
//! - Serve each connection with hyper (HTTP/1.1, HTTP/2 when negotiated)

use axum::{body::Body, http::Request, Router};
use hyper::body::Incoming;
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tower::Service;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::acme::Issuer;
use crate::config::RelayConfig;
use crate::http::handlers::relay_handler;
use crate::http::request::{propagate_request_id_layer, request_span, set_request_id_layer};
use crate::net::{Accepted, ConnectionId, ConnectionPermit, Listener, ListenerError, TlsAcceptor};
use crate::upstream::{UpstreamClient, UpstreamError};

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<UpstreamClient>,
}

/// HTTP server for the relay.
pub struct RelayServer {
    router: Router,
}

impl RelayServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: RelayConfig) -> Result<Self, UpstreamError> {
        let upstream = Arc::new(UpstreamClient::new(&config.upstream)?);
        let state = AppState { upstream };

        let router = Self::build_router(&config, state);
        Ok(Self { router })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &RelayConfig, state: AppState) -> Router {
        Router::new()
            .fallback(relay_handler)
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| request_span(request)))
            .layer(set_request_id_layer())
    }

    /// The fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve HTTPS, obtaining certificates during the handshake.
    pub async fn run_tls<I: Issuer>(
        self,
        listener: Listener,
        acceptor: TlsAcceptor<I>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        let router = self.router;
        accept_loop(listener, shutdown, "HTTPS", move |stream, peer, permit| {
            let acceptor = acceptor.clone();
            let router = router.clone();
            async move {
                let id = permit.id();
                match acceptor.accept(stream).await {
                    Ok(Accepted::Stream(tls)) => serve_connection(TokioIo::new(tls), router, id).await,
                    Ok(Accepted::Challenge) => {}
                    Err(e) => {
                        tracing::warn!(connection_id = %id, peer_addr = %peer, error = %e, "TLS handshake failed");
                    }
                }
                drop(permit);
            }
        })
        .await
    }

    /// Serve plain HTTP (behind another TLS terminator, or in tests).
    pub async fn run(
        self,
        listener: Listener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        let router = self.router;
        accept_loop(listener, shutdown, "HTTP", move |stream, _peer, permit| {
            let router = router.clone();
            async move {
                serve_connection(TokioIo::new(stream), router, permit.id()).await;
                drop(permit);
            }
        })
        .await
    }
}

/// Accept connections until shutdown, spawning one task per connection.
///
/// A failing connection never stops the loop.
async fn accept_loop<F, Fut>(
    listener: Listener,
    mut shutdown: broadcast::Receiver<()>,
    scheme: &'static str,
    handle: F,
) -> Result<(), ListenerError>
where
    F: Fn(TcpStream, SocketAddr, ConnectionPermit) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr().map_err(ListenerError::Bind)?;
    tracing::info!(address = %addr, scheme, "Relay server starting");

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer, permit)) => {
                    tokio::spawn(handle(stream, peer, permit));
                }
                Err(ListenerError::Closed) => break,
                Err(e) => pause_after_accept_error(&e).await,
            },
            _ = shutdown.recv() => {
                tracing::info!("Shutdown signal received");
                break;
            }
        }
    }

    tracing::info!(address = %addr, "Relay server stopped");
    Ok(())
}

/// Accept errors such as EMFILE persist until descriptors are released;
/// retrying at once would spin.
async fn pause_after_accept_error(err: &ListenerError) {
    tracing::warn!(error = %err, "Accept failed");
    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
}

async fn serve_connection<IO>(io: TokioIo<IO>, router: Router, id: ConnectionId)
where
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = hyper::service::service_fn(move |request: Request<Incoming>| {
        router.clone().call(request)
    });

    if let Err(e) = auto::Builder::new(TokioExecutor::new())
        .serve_connection(io, service)
        .await
    {
        tracing::debug!(connection_id = %id, error = %e, "Connection ended with error");
    }
}
