//! HTTP API server for the sourcing marketplace.
//!
//! Exposes catalog, request, bid, cart and order endpoints over a
//! [`Marketplace`], with structured logging (tracing) and Prometheus metrics.
//! Callers identify themselves through the headers read by [`auth::CurrentUser`].

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{MarketSettings, Marketplace};
use store::MarketStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state for all handlers.
pub struct AppState<S> {
    pub market: Marketplace<S>,
}

impl<S: MarketStore + Clone> AppState<S> {
    pub fn new(store: S, settings: MarketSettings) -> Self {
        Self {
            market: Marketplace::new(store, settings),
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: MarketStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    use routes::{bids, cart, orders, products, requests, users};

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/users/me", put(users::upsert_me::<S>))
        .route(
            "/products",
            post(products::create::<S>).get(products::list::<S>),
        )
        .route(
            "/products/{id}",
            get(products::get::<S>).put(products::update::<S>),
        )
        .route("/products/{id}/quote", get(products::quote::<S>))
        .route(
            "/products/{id}/variants/{sku}/stock",
            put(products::set_variant_stock::<S>),
        )
        .route(
            "/requests",
            post(requests::create::<S>).get(requests::list::<S>),
        )
        .route("/requests/{id}", get(requests::get::<S>))
        .route("/requests/{id}/close", post(requests::close::<S>))
        .route("/bids", post(bids::create::<S>).get(bids::list::<S>))
        .route("/bids/{id}", get(bids::get::<S>))
        .route("/bids/{id}/accept", post(bids::accept::<S>))
        .route("/bids/{id}/reject", post(bids::reject::<S>))
        .route("/bids/{id}/withdraw", post(bids::withdraw::<S>))
        .route("/cart", get(cart::get::<S>))
        .route("/cart/items", post(cart::add_item::<S>))
        .route(
            "/cart/items/{id}",
            patch(cart::update_item::<S>).delete(cart::remove_item::<S>),
        )
        .route(
            "/orders",
            post(orders::create::<S>).get(orders::list::<S>),
        )
        .route("/orders/checkout", post(orders::checkout::<S>))
        .route("/orders/{id}", get(orders::get::<S>))
        .route("/orders/{id}/status", post(orders::update_status::<S>))
        .route("/orders/{id}/payment", post(orders::update_payment::<S>))
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
