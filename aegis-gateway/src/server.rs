//! Gateway server setup

use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use aegis_core::error::{AegisError, AegisResult};

use crate::routes::create_router;
use crate::state::AppState;

/// Create the router and the address it should bind.
pub fn create_server(state: AppState) -> (Router, SocketAddr) {
    let enable_cors = state.config.enable_cors;
    let port = state.config.listen_port;

    let mut router = create_router(state).layer(TraceLayer::new_for_http());

    if enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    (router, addr)
}

/// Run the gateway until `shutdown` resolves.
pub async fn run_server(
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> AegisResult<()> {
    let (router, addr) = create_server(state);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| AegisError::Configuration(format!("failed to bind {addr}: {e}")))?;

    tracing::info!("aegis gateway listening on {addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| AegisError::Fatal(e.to_string()))
}

/// Start the server on an ephemeral port in the background; returns the
/// bound address. Used by tests and the CLI's local demo mode.
pub async fn start_background_server(state: AppState) -> AegisResult<SocketAddr> {
    let (router, _) = create_server(state);

    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .map_err(|e| AegisError::Configuration(format!("failed to bind: {e}")))?;
    let addr = listener
        .local_addr()
        .map_err(|e| AegisError::Configuration(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!("server error: {e}");
        }
    });

    Ok(addr)
}
