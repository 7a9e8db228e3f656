/// Main application entry point with clean architecture
mod clients;
mod config;
mod domain;
mod errors;
mod handlers;
mod routes;
mod services;
mod utils;

use crate::clients::OcmClient;
use crate::config::{AppConfig, SessionLifetime};
use crate::handlers::AppState;
use crate::routes::build_router;
use crate::services::{ReferenceLoader, SessionOptions, SessionRegistry};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    // Load configuration
    let config = AppConfig::from_env()?;
    info!("Configuration loaded successfully");

    // Initialize clients
    let ocm_client = Arc::new(OcmClient::new(config.ocm.clone())?);
    info!(
        base_url = ocm_client.base_url(),
        country = %config.ocm.country_code,
        "Open Charge Map client ready"
    );

    // Initialize services
    let reference = Arc::new(ReferenceLoader::new(ocm_client.clone()));
    let registry = Arc::new(SessionRegistry::new(
        ocm_client,
        SessionOptions::from_config(&config),
    ));

    // Initialize application state
    let state = AppState {
        registry: registry.clone(),
        reference: reference.clone(),
    };

    // Warm the reference vocabularies and sweep idle sessions in the background
    start_background_tasks(reference, registry, config.sessions.clone());

    // Build router
    let app = build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("charging_explorer listening on {}", config.bind_addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

/// Start background tasks
fn start_background_tasks(
    reference: Arc<ReferenceLoader<OcmClient>>,
    registry: Arc<SessionRegistry<OcmClient>>,
    lifetime: SessionLifetime,
) {
    tokio::spawn(async move {
        if let Err(e) = reference.load().await {
            error!("Reference data warm-up error: {:?}", e);
        }
    });

    tokio::spawn(async move {
        info!(
            "Starting idle session sweep (idle timeout {}s, every {}s)",
            lifetime.idle_timeout.as_secs(),
            lifetime.sweep_interval.as_secs()
        );
        loop {
            tokio::time::sleep(lifetime.sweep_interval).await;
            registry.evict_idle(lifetime.idle_timeout).await;
        }
    });
}
