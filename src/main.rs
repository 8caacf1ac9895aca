use log::*;
use realtime::{ChangeListener, Hub, PgNotificationSource};
use service::{config::Config, logging::Logger, AppState};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let config = Config::new();
    Logger::init_logger(&config as &Config);

    info!("Starting up Hanbase...");

    let db = match service::init_database(&config).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to establish database connection: {e}");
            std::process::exit(1);
        }
    };

    let shutdown = CancellationToken::new();

    // Exactly one hub per process; every component gets a handle to it.
    let (hub, hub_loop) = Hub::new(config.hub_config());
    let hub_task = tokio::spawn(hub_loop.run(shutdown.clone()));

    let source = match PgNotificationSource::connect(config.database_url()).await {
        Ok(source) => source,
        Err(e) => {
            error!("Failed to open the change notification connection: {e}");
            std::process::exit(1);
        }
    };
    let listener = ChangeListener::new(source, hub.clone(), config.notify_channel.clone());
    let listener_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = listener.run(listener_shutdown).await {
            // No reconnection policy: losing the notification connection is fatal.
            error!("Change listener terminated: {e}");
            std::process::exit(1);
        }
    });

    tokio::spawn(shutdown_signal(shutdown.clone()));

    let app_state = AppState::new(config, &db, hub, shutdown.clone());

    if let Err(e) = web::init_server(app_state).await {
        error!("Failed to start server: {e}");
        std::process::exit(1);
    }

    shutdown.cancel();
    if let Err(e) = hub_task.await {
        error!("Realtime hub task failed: {e}");
    }

    info!("Hanbase stopped");
}

/// Cancels `shutdown` on Ctrl+C or SIGTERM.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
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

    info!("Shutdown signal received, closing realtime sessions...");
    shutdown.cancel();
}
