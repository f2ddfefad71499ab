//! HTTP server for the exchange endpoint.

use anyhow::{Context, Result};
use axum::{
    Router,
    routing::{get, post},
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use super::handlers::{self, ApiState};

/// Build the router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route(
            "/token",
            post(handlers::exchange_token).fallback(handlers::method_not_allowed),
        )
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handle to a running server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    join_handle: JoinHandle<std::io::Result<()>>,
}

impl ServerHandle {
    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections, finish in-flight requests and wait.
    pub async fn stop(self) -> Result<()> {
        // The server may already be gone; nothing to signal then.
        let _ = self.shutdown.send(());
        self.join_handle
            .await
            .context("Server task panicked")?
            .context("Server terminated with an error")?;
        debug!("Server task finished");
        Ok(())
    }
}

/// Start serving on `addr`.
///
/// Binding port 0 picks a free port; see [`ServerHandle::local_addr`].
pub async fn start_server(addr: SocketAddr, state: ApiState) -> Result<ServerHandle> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let local_addr = listener.local_addr()?;

    info!("Starting HTTP server on {}", local_addr);

    let (shutdown, signal) = oneshot::channel::<()>();
    let app = router(state);
    let join_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = signal.await;
            })
            .await
    });

    Ok(ServerHandle {
        local_addr,
        shutdown,
        join_handle,
    })
}
