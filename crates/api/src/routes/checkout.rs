//! Checkout endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use checkout::{CheckoutRequest, PaymentMethodToken};
use domain::CartItem;
use serde::{Deserialize, Serialize};
use store::CommerceStore;
use uuid::Uuid;

use crate::error::ApiError;
use crate::routes::orders::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct CheckoutRequestBody {
    pub user_id: Uuid,
    pub items: Vec<CartLineRequest>,
    pub shipping_address: String,
    pub billing_address: Option<String>,
    /// Token minted by the hosted card widget; card data never reaches us.
    pub payment_method: String,
}

#[derive(Deserialize)]
pub struct CartLineRequest {
    pub product_id: String,
    pub quantity: u32,
}

// -- Response types --

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub order_id: String,
    pub total_cents: i64,
    pub authorization_id: String,
}

#[derive(Serialize)]
pub struct CheckoutConfigResponse {
    pub payment_public_key: Option<String>,
}

// -- Handlers --

/// POST /checkout — runs one checkout attempt for the authenticated user.
pub async fn submit<S: CommerceStore + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<CheckoutRequestBody>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let request = CheckoutRequest {
        user_id: body.user_id.into(),
        items: body
            .items
            .into_iter()
            .map(|line| CartItem::new(line.product_id, line.quantity))
            .collect(),
        shipping_address: body.shipping_address,
        billing_address: body.billing_address,
        payment_method: PaymentMethodToken::new(body.payment_method),
    };

    let receipt = state.orchestrator.checkout(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            order_id: receipt.order_id.to_string(),
            total_cents: receipt.total.cents(),
            authorization_id: receipt.authorization_id,
        }),
    ))
}

/// GET /checkout/config — publishable gateway key for the card widget.
pub async fn config<S: CommerceStore + Clone>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<CheckoutConfigResponse> {
    Json(CheckoutConfigResponse {
        payment_public_key: state.config.payment_public_key.clone(),
    })
}
