//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;
use domain::DomainError;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Checkout or order operation error.
    Checkout(CheckoutError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Checkout(err) => checkout_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, String) {
    match &err {
        CheckoutError::InsufficientStock { .. } | CheckoutError::ProductUnavailable(_) => {
            (StatusCode::CONFLICT, err.to_string())
        }
        CheckoutError::PaymentDeclined(_) => (StatusCode::PAYMENT_REQUIRED, err.to_string()),
        CheckoutError::Gateway(_) => (StatusCode::BAD_GATEWAY, err.to_string()),
        CheckoutError::OrderNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        CheckoutError::Domain(domain_err) => match domain_err {
            DomainError::EmptyCart
            | DomainError::InvalidQuantity { .. }
            | DomainError::InvalidAddress(_) => (StatusCode::BAD_REQUEST, err.to_string()),
            DomainError::InvalidStatusTransition { .. } => (StatusCode::CONFLICT, err.to_string()),
        },
        CheckoutError::Store(store_err) => {
            tracing::error!(error = %store_err, "store error surfaced to API");
            if store_err.is_transient() {
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "temporarily unavailable, please try again".to_string(),
                )
            } else {
                match store_err {
                    StoreError::ProductNotFound(_) | StoreError::OrderNotFound(_) => {
                        (StatusCode::NOT_FOUND, store_err.to_string())
                    }
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal error".to_string(),
                    ),
                }
            }
        }
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Checkout(CheckoutError::Store(err))
    }
}
