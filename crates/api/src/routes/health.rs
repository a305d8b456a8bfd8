//! Liveness check.

use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// GET /health
pub async fn check() -> Json<Health> {
    Json(Health {
        status: "ok",
        service: "sourcing-marketplace",
        version: env!("CARGO_PKG_VERSION"),
    })
}
