//! Catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{ProductId, UserId};
use domain::{NewProduct, PriceQuote, Product, ProductUpdate, UpdateReport, VariantSelection};
use serde::{Deserialize, Serialize};
use store::{MarketStore, ProductFilter};

use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductListParams {
    pub supplier_id: Option<UserId>,
    pub category: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct QuoteParams {
    pub quantity: u32,
    pub sku: Option<String>,
    pub color: Option<String>,
    pub size: Option<String>,
    pub material: Option<String>,
    pub style: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StockRequest {
    pub stock: u32,
}

// -- Response types --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductUpdatedResponse {
    pub product: Product,
    pub report: UpdateReport,
}

// -- Handlers --

/// POST /products: list a new product with generated variants.
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: MarketStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(actor): CurrentUser,
    payload: Result<Json<NewProduct>, JsonRejection>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let Json(input) = payload?;
    let product = state.market.catalog.create_product(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// GET /products: browse the catalog.
#[tracing::instrument(skip(state))]
pub async fn list<S: MarketStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<ProductListParams>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let filter = ProductFilter {
        supplier_id: params.supplier_id,
        category: params.category,
        limit: params.limit,
    };
    Ok(Json(state.market.catalog.list_products(filter).await?))
}

/// GET /products/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: MarketStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<ProductId>,
) -> Result<Json<Product>, ApiError> {
    Ok(Json(state.market.catalog.get_product(id).await?))
}

/// PUT /products/{id}: partial update by the owning supplier.
#[tracing::instrument(skip(state, payload))]
pub async fn update<S: MarketStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<ProductId>,
    payload: Result<Json<ProductUpdate>, JsonRejection>,
) -> Result<Json<ProductUpdatedResponse>, ApiError> {
    let Json(update) = payload?;
    let (product, report) = state.market.catalog.update_product(&actor, id, update).await?;
    Ok(Json(ProductUpdatedResponse { product, report }))
}

/// GET /products/{id}/quote?quantity=N&sku=SKU_0
#[tracing::instrument(skip(state))]
pub async fn quote<S: MarketStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<ProductId>,
    Query(params): Query<QuoteParams>,
) -> Result<Json<PriceQuote>, ApiError> {
    let selection = VariantSelection {
        sku: params.sku,
        color: params.color,
        size: params.size,
        material: params.material,
        style: params.style,
    };
    let quote = state
        .market
        .catalog
        .quote(id, params.quantity, &selection)
        .await?;
    Ok(Json(quote))
}

/// PUT /products/{id}/variants/{sku}/stock
#[tracing::instrument(skip(state, payload))]
pub async fn set_variant_stock<S: MarketStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(actor): CurrentUser,
    Path((id, sku)): Path<(ProductId, String)>,
    payload: Result<Json<StockRequest>, JsonRejection>,
) -> Result<Json<Product>, ApiError> {
    let Json(body) = payload?;
    let product = state
        .market
        .catalog
        .set_variant_stock(&actor, id, &sku, body.stock)
        .await?;
    Ok(Json(product))
}
