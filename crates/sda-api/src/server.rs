//! HTTP server lifecycle for the Admin API (§4.5 Readiness & Shutdown).
//!
//! Shutdown here is cooperative at the HTTP layer: stop accepting new
//! connections, let in-flight requests finish, then return. The concrete
//! broker connection, channel, and database pool are owned by the
//! `apps/sda-admin-api` binary (constructed before being erased into the
//! trait objects on [`AppState`]) so it can close them explicitly once this
//! function returns — no in-flight delivery is acked during that window
//! because workers, not the API, hold broker consumers.

use tokio::net::TcpListener;
use tracing::info;

use sda_core::{config::ApiConfig, Error, Result};

use crate::{routes, AppState};

pub struct Server {
    listener: TcpListener,
    router: axum::Router,
}

impl Server {
    pub async fn bind(config: &ApiConfig, state: AppState) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Internal(format!("binding {addr}: {e}")))?;
        info!(%addr, "✅ admin API listening");
        Ok(Self { listener, router: routes::router(state) })
    }

    /// Serve until a shutdown signal (SIGINT, or SIGTERM on unix) arrives,
    /// draining in-flight requests before returning (§5 "close inputs
    /// first... drain in-flight tasks... then close outputs").
    pub async fn serve(self) -> Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(format!("server error: {e}")))
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sig = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        sig.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received, draining in-flight requests");
}
