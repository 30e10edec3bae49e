//! API error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use storefront_billing::BillingError;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Billing(#[from] BillingError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone()),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ApiError::Billing(e) => billing_status(e),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Map billing errors onto HTTP statuses. Anything ambiguous fails closed;
/// 5xx on webhook processing tells the provider to redeliver.
fn billing_status(e: &BillingError) -> (StatusCode, String) {
    match e {
        BillingError::WebhookSignatureInvalid
        | BillingError::InvalidPayload(_)
        | BillingError::NoCustomer
        | BillingError::NoPriceForPlan(_) => (StatusCode::BAD_REQUEST, e.to_string()),
        // A missing subscription denies the operation, never defaults open.
        BillingError::NoSubscription(_) => (StatusCode::FORBIDDEN, e.to_string()),
        BillingError::NoStore(_) | BillingError::NotFound(_) => {
            (StatusCode::NOT_FOUND, e.to_string())
        }
        BillingError::DuplicateSlug(_) => (StatusCode::CONFLICT, e.to_string()),
        BillingError::PlanNotFound(_)
        | BillingError::Database(_)
        | BillingError::StripeApi(_)
        | BillingError::Config(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal server error".to_string(),
        ),
    }
}
