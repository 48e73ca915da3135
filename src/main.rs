use anyhow::{Context, Result};
use fieldwatch::api::{create_router, AppState};
use fieldwatch::config;
use fieldwatch::filter::{FilterContext, FilterRegistry};
use fieldwatch::geo::Wgs84Converter;
use fieldwatch::session::SessionCatalog;
use fieldwatch::state::Scheduler;
use fieldwatch::symbol::EchelonSymbolCoder;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fieldwatch=info".into()),
        )
        .init();

    info!("Fieldwatch starting...");

    let config = config::load_from_env().context("Failed to load configuration")?;
    let settings = config.filter.settings();
    info!(
        bind_address = %config.server.bind_address,
        entity_timeout_secs = settings.entity_timeout.as_secs(),
        heartbeat_interval_ms = config.filter.heartbeat_interval_ms,
        throttle_interval_ms = config.filter.throttle_interval_ms,
        "Configuration loaded"
    );

    let catalog = Arc::new(SessionCatalog::new());
    let (monitor, _) = broadcast::channel(config.monitor.channel_capacity);

    let context = FilterContext {
        sessions: catalog.clone(),
        geo: Arc::new(Wgs84Converter),
        symbols: Arc::new(EchelonSymbolCoder),
        scheduler: Scheduler::current(),
        settings,
    };
    let registry = Arc::new(FilterRegistry::new(context));
    info!("Filter registry initialized");

    let app_state = AppState {
        catalog,
        registry: Arc::clone(&registry),
        monitor,
        viewer_buffer: config.filter.viewer_buffer,
    };
    let app = create_router(app_state).layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_address))?;
    info!(address = %config.server.bind_address, "HTTP server listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    info!(
        viewers = registry.viewer_count(),
        filters = registry.filter_count(),
        "Fieldwatch stopped"
    );

    Ok(())
}
