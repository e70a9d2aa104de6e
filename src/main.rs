//! ORPflow venue router
//!
//! Maintains order books for every configured (venue, symbol), feeds their
//! market quality into the venue registry and serves routing decisions,
//! health and metrics over HTTP.

use std::sync::Arc;
use tokio::time::interval;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use orp_flow_router::server::{self, AppState};
use orp_flow_router::venue::bridge;
use orp_flow_router::{BookMaintainer, Config, NetworkFeed, SmartVenueRouter, Telemetry, VenueRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting ORPflow Venue Router");

    // Load configuration
    let config = Config::load()?;
    info!(venues = ?config.venues, symbols = ?config.symbols, "Configuration loaded");

    let feed = Arc::new(NetworkFeed::new(
        &config.rest_endpoint,
        &config.ws_endpoint,
        config.depth_levels,
    ));
    let maintainer = BookMaintainer::new(feed, config.maintainer_settings());
    let registry = Arc::new(VenueRegistry::default());
    let router = Arc::new(SmartVenueRouter::new(registry.clone(), config.router_settings()));
    let telemetry = Arc::new(Telemetry::new()?);

    for (venue, symbol) in config.pairs() {
        registry.register_venue(&venue, &symbol);
        maintainer.start_maintaining(&venue, &symbol)?;
    }

    let period = config.health_check_interval();
    maintainer.spawn_staleness_monitor(period);

    let state = AppState::new(maintainer.clone(), registry.clone(), router, telemetry);

    // Keep venue metrics in step with the books
    let sync_state = state.clone();
    let sync_task = tokio::spawn(async move {
        let mut ticker = interval(period);
        loop {
            ticker.tick().await;
            let updated = bridge::sync_from_books(&sync_state.maintainer, &sync_state.registry);
            sync_state.refresh_telemetry();
            if !sync_state.maintainer.is_healthy() {
                warn!(updated, "Book maintainer unhealthy");
            }
        }
    });

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Shutdown signal received");
    };

    let result = server::serve(state, config.http_port, shutdown).await;

    sync_task.abort();
    maintainer.shutdown();
    info!("ORPflow Venue Router stopped");

    result
}
