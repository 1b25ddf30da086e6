mod config;
mod db;
mod error;
mod response;
mod routes;
mod state;
mod validation;
mod workflow;

use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "refereed=info,tower_http=info".into()),
        )
        .init();

    let config = Arc::new(config::Config::from_env()?);
    let repos = db::open(&config).await?;
    let state = Arc::new(state::AppState::new(config.clone(), repos));
    let app = routes::router(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Refereed listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Refereed stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM, whichever arrives first.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
