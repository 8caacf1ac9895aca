use log::*;
use tokio::net::TcpListener;

pub use error::{Error, Result};
pub use service::AppState;

mod controller;
pub mod error;
mod router;
mod ws;

pub use router::define_routes;

/// Serve the HTTP API until the app state's shutdown token is cancelled.
pub async fn init_server(app_state: AppState) -> std::io::Result<()> {
    let listen_addr = app_state.config.listen_address();
    let shutdown = app_state.shutdown.clone();

    info!(
        "Server starting... listening for connections on http://{} ({} environment)",
        listen_addr, app_state.config.runtime_env
    );

    let listener = TcpListener::bind(&listen_addr).await?;
    let router = define_routes(app_state);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Server stopped");
    Ok(())
}
