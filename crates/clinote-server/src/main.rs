// crates/clinote-server/src/main.rs
//! Clinical-note analytics server binary.

use std::net::SocketAddr;

use anyhow::Result;
use clinote_core::Settings;
use clinote_db::Database;
use clinote_server::metrics::init_metrics;
use clinote_server::routes::api_routes;
use clinote_server::AppState;
use tracing_subscriber::FmtSubscriber;

const DEFAULT_PORT: u16 = 4477;

fn get_port() -> u16 {
    std::env::var("CLINOTE_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    init_metrics();

    let settings = Settings::from_env();
    let db = Database::open_default().await?;
    let state = AppState::new(db, settings);

    let app = api_routes(state);

    let port = get_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "clinote-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
