//! Order read, tracking, and staff transition endpoints.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use checkout::{
    CheckoutOrchestrator, InMemoryDeliveryService, InMemoryPaymentGateway, InMemoryUserDirectory,
};
use chrono::{DateTime, Utc};
use common::OrderId;
use domain::{Order, OrderItem, OrderStatus};
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use store::CommerceStore;
use uuid::Uuid;

use crate::config::Config;
use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: CommerceStore + Clone> {
    pub orchestrator: CheckoutOrchestrator<
        S,
        InMemoryPaymentGateway,
        InMemoryDeliveryService,
        InMemoryUserDirectory,
    >,
    pub store: S,
    pub gateway: InMemoryPaymentGateway,
    pub delivery: InMemoryDeliveryService,
    pub directory: InMemoryUserDirectory,
    pub config: Config,
}

// -- Request types --

#[derive(Deserialize)]
pub struct OrdersQuery {
    pub user_id: Uuid,
}

#[derive(Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
    pub tracking_number: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub user_id: String,
    pub status: String,
    pub total_cents: i64,
    pub shipping_address: String,
    pub billing_address: String,
    pub authorization_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            user_id: order.user_id.to_string(),
            status: order.status.to_string(),
            total_cents: order.total_amount.cents(),
            shipping_address: order.shipping_address.to_string(),
            billing_address: order.billing_address.to_string(),
            authorization_id: order.authorization_id,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

impl From<OrderItem> for OrderItemResponse {
    fn from(item: OrderItem) -> Self {
        Self {
            product_id: item.product_id.to_string(),
            quantity: item.quantity,
            unit_price_cents: item.unit_price.cents(),
        }
    }
}

// -- Handlers --

/// GET /orders/{id} — fetches one order.
pub async fn get<S: CommerceStore + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = OrderId::from_uuid(id);
    let order = state
        .orchestrator
        .recorder()
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("order {order_id} not found")))?;
    Ok(Json(order.into()))
}

/// GET /orders/{id}/items — fetches an order's lines.
pub async fn items<S: CommerceStore + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<OrderItemResponse>>, ApiError> {
    let items = state
        .orchestrator
        .recorder()
        .items(OrderId::from_uuid(id))
        .await?;
    Ok(Json(items.into_iter().map(Into::into).collect()))
}

/// GET /orders?user_id= — lists a customer's orders, most recent first.
pub async fn list<S: CommerceStore + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<OrdersQuery>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state
        .orchestrator
        .recorder()
        .orders_for_user(query.user_id.into())
        .await?;
    Ok(Json(orders.into_iter().map(Into::into).collect()))
}

/// POST /orders/{id}/status — staff-side lifecycle transition.
///
/// Validates the state machine and dispatches the matching customer
/// notification (with the tracking number appended for shipments).
pub async fn set_status<S: CommerceStore + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusUpdateRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let new_status = OrderStatus::parse(&body.status)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown status {:?}", body.status)))?;

    let order_id = OrderId::from_uuid(id);
    let order = state
        .orchestrator
        .recorder()
        .update_status(order_id, new_status)
        .await?;

    let extra = body
        .tracking_number
        .map(|n| format!("Tracking number: {n}"));
    state
        .orchestrator
        .notifier()
        .notify_best_effort(order.user_id, order_id, new_status, extra.as_deref())
        .await;

    Ok(Json(order.into()))
}

/// GET /orders/{id}/track — live status stream for the tracking view.
///
/// Emits the current status immediately, then one event per change.
pub async fn track<S: CommerceStore + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let order_id = OrderId::from_uuid(id);
    let order = state
        .orchestrator
        .recorder()
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("order {order_id} not found")))?;
    let subscription = state.orchestrator.recorder().subscribe(order_id).await?;

    let stream = futures_util::stream::unfold(
        (Some(order.status), subscription),
        |(pending, mut subscription)| async move {
            let status = match pending {
                Some(initial) => initial,
                None => subscription.next_status().await?,
            };
            let event = Event::default().event("status").data(status.as_str());
            Some((Ok(event), (None, subscription)))
        },
    );

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
