use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};

use sellscale_server::api;
use sellscale_server::config::{Config, DatabaseLocation};
use sellscale_server::slack::SlackNotifier;
use sellscale_server::state_machine::{outbox_retry_loop, SqliteRepository};
use sellscale_server::{AppState, ProspectStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!(
        "Starting SellScale prospect service {}",
        sellscale_server::get_version()
    );

    let config = Config::from_env().context("Failed to load configuration")?;
    info!("Environment: {}", config.environment.as_str());

    let repository = match &config.database {
        DatabaseLocation::Memory => {
            info!("Using in-memory database");
            SqliteRepository::new_in_memory()
        }
        DatabaseLocation::Path(path) => {
            info!("Using database: {}", path.display());
            SqliteRepository::new(path)
        }
    }
    .context("Failed to initialize SQLite database")?;

    let notifier = SlackNotifier::new(config.slack_webhooks.clone());
    let settings = config.store_settings();
    let store = Arc::new(ProspectStore::new(
        Arc::new(repository),
        Arc::new(notifier),
        config.app_base_url.clone(),
        settings,
    ));

    // Retry undelivered effects, including rows left behind by a crash
    // between commit and dispatch
    let retry_ctx = store.interpreter().clone();
    tokio::spawn(async move {
        outbox_retry_loop(retry_ctx, settings.outbox).await;
    });

    let app_state = Arc::new(AppState { store });
    let app = api::router(app_state).layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
