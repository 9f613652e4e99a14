//! Signature Device HTTP Server

use axum::{
    Router,
    routing::{get, post, put},
};
use sigdev::{DeviceManager, MemoryDeviceStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::handlers::{self, AppState};

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/v0/devices",
            post(handlers::create_device).get(handlers::list_devices),
        )
        .route(
            "/api/v0/devices/:id",
            get(handlers::get_device).delete(handlers::delete_device),
        )
        .route("/api/v0/devices/:id/sign", put(handlers::sign_data))
        .with_state(state)
}

pub async fn run(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown = CancellationToken::new();
    let state = Arc::new(AppState {
        manager: DeviceManager::new(MemoryDeviceStore::new()),
        shutdown: shutdown.clone(),
    });

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("signature device service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    Ok(())
}

/// Waits for ctrl-c or SIGTERM, then cancels pending lock waits so in-flight
/// requests queued behind a device lock fail fast instead of stalling the
/// graceful shutdown.
async fn shutdown_signal(shutdown: CancellationToken) {
    use tokio::signal;

    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl+C signal"),
            Err(e) => tracing::error!("Failed to listen for Ctrl+C: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                tracing::info!("Received SIGTERM signal");
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                // Wait forever since we can't receive SIGTERM
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    shutdown.cancel();
    tracing::info!("Starting graceful shutdown...");
}
