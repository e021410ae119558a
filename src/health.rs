//! Liveness endpoint for container orchestration.
//!
//! `GET /` answers `200 I am alive!` for as long as the process runs. The
//! server stops when the shared [`ShutdownCoordinator`](crate::shutdown::ShutdownCoordinator)
//! fires.

use crate::shutdown::SharedShutdown;
use axum::{http::StatusCode, routing::get, Router};
use std::net::SocketAddr;
use tracing::info;

/// Default bind address
pub const DEFAULT_HEALTH_ADDR: &str = "0.0.0.0:7860";

/// Body returned by the liveness route
pub const ALIVE_BODY: &str = "I am alive!";

/// Liveness handler
pub async fn alive() -> (StatusCode, &'static str) {
    (StatusCode::OK, ALIVE_BODY)
}

/// Router exposing the liveness route
pub fn router() -> Router {
    Router::new().route("/", get(alive))
}

/// Serve the liveness route on `addr` until shutdown
pub async fn serve(addr: SocketAddr, shutdown: SharedShutdown) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Health endpoint listening");
    axum::serve(listener, router())
        .with_graceful_shutdown(async move { shutdown.wait_for_shutdown().await })
        .await?;
    info!("Health endpoint stopped");
    Ok(())
}
