//! HTTP API server for the storefront order core.
//!
//! Exposes checkout, the product catalog, order reads, a live tracking
//! stream, and a staff-side status transition, with structured logging
//! (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use checkout::{
    CheckoutOrchestrator, InMemoryDeliveryService, InMemoryPaymentGateway, InMemoryUserDirectory,
};
use metrics_exporter_prometheus::PrometheusHandle;
use store::CommerceStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: CommerceStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/products", get(routes::products::list::<S>))
        .route("/products/{id}", get(routes::products::get::<S>))
        .route("/checkout", post(routes::checkout::submit::<S>))
        .route("/checkout/config", get(routes::checkout::config::<S>))
        .route("/orders", get(routes::orders::list::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/items", get(routes::orders::items::<S>))
        .route("/orders/{id}/status", post(routes::orders::set_status::<S>))
        .route("/orders/{id}/track", get(routes::orders::track::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the default application state over a store, wired to the
/// in-memory payment gateway, delivery service, and user directory.
pub fn create_default_state<S: CommerceStore + Clone + 'static>(
    store: S,
    config: Config,
) -> Arc<AppState<S>> {
    let gateway = InMemoryPaymentGateway::new();
    let delivery = InMemoryDeliveryService::new();
    let directory = InMemoryUserDirectory::new();

    let ttl = chrono::Duration::seconds(config.reservation_ttl_secs as i64);
    let orchestrator = CheckoutOrchestrator::new(
        store.clone(),
        gateway.clone(),
        delivery.clone(),
        directory.clone(),
    )
    .with_ledger(checkout::StockLedger::with_ttl(store.clone(), ttl));

    Arc::new(AppState {
        orchestrator,
        store,
        gateway,
        delivery,
        directory,
        config,
    })
}
