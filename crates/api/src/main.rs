//! API server entry point.

use domain::{Money, Product};
use store::{CommerceStore, InMemoryCommerceStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Seeds the demo catalog.
async fn seed_catalog(store: &InMemoryCommerceStore) {
    let products = [
        Product::new(
            "AQ-GEN-100",
            "Atmospheric water generator 100L",
            Money::from_cents(249_900),
            8,
        ),
        Product::new("AQ-TANK-30", "30L storage tank", Money::from_cents(89_900), 15),
        Product::new("AQ-FILTER-01", "Replacement filter", Money::from_cents(4_900), 120),
        Product::new("AQ-MINERAL-KIT", "Mineralization kit", Money::from_cents(12_900), 40),
    ];
    for product in products {
        store
            .upsert_product(product)
            .await
            .expect("failed to seed catalog");
    }
}

#[tokio::main]
async fn main() {
    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Create the store and application state
    let config = api::config::Config::from_env();
    let store = InMemoryCommerceStore::new();
    seed_catalog(&store).await;
    let state = api::create_default_state(store, config.clone());

    // 4. Start the reservation sweep
    let sweeper = checkout::spawn_reservation_sweeper(
        state.orchestrator.ledger().clone(),
        std::time::Duration::from_secs(config.sweep_interval_secs),
    );

    // 5. Serve until shutdown
    let app = api::create_app(state, metrics_handle);
    let listener = tokio::net::TcpListener::bind(config.addr())
        .await
        .expect("failed to bind listen address");
    tracing::info!(addr = %config.addr(), "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    sweeper.abort();
}
