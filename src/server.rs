//! Purpose: Provide the loopback HTTP server that greets through the native shim.
//! Exports: `LoopbackServer`, `ServerHandle`, `ServeStats`, `router`, `REPORT_EVERY`.
//! Role: Axum-based server; every method and path hits the same fallback handler.
//! Invariants: Default bind is `127.0.0.1:0`; the OS picks the port.
//! Invariants: Each handled request prints exactly one greeting line and answers 200, empty body.
//! Invariants: The serve task is owned by `ServerHandle`; shutdown or drop closes the listener
//! and every idle keep-alive connection.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio::time::Duration;
use tower_http::trace::TraceLayer;

use crate::core::error::{Error, ErrorKind};
use crate::native;

/// Handled requests between progress events.
pub const REPORT_EVERY: u64 = 10_000;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Default)]
pub struct ServeStats {
    served: AtomicU64,
}

impl ServeStats {
    /// Counts one handled request and returns the new total.
    pub fn record(&self) -> u64 {
        self.served.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn served(&self) -> u64 {
        self.served.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub struct LoopbackServer {
    listener: TcpListener,
    addr: SocketAddr,
}

impl LoopbackServer {
    pub async fn bind() -> Result<Self, Error> {
        Self::bind_to(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).await
    }

    pub async fn bind_to(addr: SocketAddr) -> Result<Self, Error> {
        let listener = TcpListener::bind(addr).await.map_err(|err| {
            Error::new(ErrorKind::Listen)
                .with_message("failed to bind loopback listener")
                .with_addr(addr)
                .with_source(err)
        })?;
        let addr = listener.local_addr().map_err(|err| {
            Error::new(ErrorKind::Listen)
                .with_message("failed to read bound address")
                .with_addr(addr)
                .with_source(err)
        })?;
        Ok(Self { listener, addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Starts serving on a background task. Must be called from within a tokio runtime.
    pub fn spawn(self) -> ServerHandle {
        let stats = Arc::new(ServeStats::default());
        let app = router(stats.clone());
        let addr = self.addr;
        let listener = self.listener;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let mut tasks = JoinSet::new();
        tasks.spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let result = server.await.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("server failed")
                    .with_addr(addr)
                    .with_source(err)
            });
            if let Err(err) = &result {
                tracing::error!(error = %err, "loopback server stopped");
            }
            result
        });

        ServerHandle {
            addr,
            stats,
            shutdown_tx: Some(shutdown_tx),
            tasks,
        }
    }
}

pub struct ServerHandle {
    addr: SocketAddr,
    stats: Arc<ServeStats>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    tasks: JoinSet<Result<(), Error>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn requests_served(&self) -> u64 {
        self.stats.served()
    }

    pub fn stats(&self) -> Arc<ServeStats> {
        self.stats.clone()
    }

    /// Stops accepting, closes idle connections, and waits for open ones to finish.
    ///
    /// Connections still busy after `SHUTDOWN_GRACE` are abandoned with the serve task.
    pub async fn shutdown(mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while self.tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(addr = %self.addr, "loopback server shutdown timed out");
            self.tasks.shutdown().await;
        }
    }
}

pub fn router(stats: Arc<ServeStats>) -> Router {
    Router::new()
        .fallback(greet_request)
        .layer(TraceLayer::new_for_http())
        .with_state(stats)
}

async fn greet_request(State(stats): State<Arc<ServeStats>>) -> StatusCode {
    finish_greeting(&stats, native::greet())
}

/// Only greetings that reached stdout are counted.
fn finish_greeting(stats: &ServeStats, greeting: Result<(), Error>) -> StatusCode {
    match greeting {
        Ok(()) => {
            let served = stats.record();
            if served % REPORT_EVERY == 0 {
                tracing::info!(requests_served = served, "loopback server progress");
            }
            StatusCode::OK
        }
        Err(err) => {
            tracing::error!(error = %err, "native greeting failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
