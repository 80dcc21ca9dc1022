//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use catwatch_core::BillingError;
use catwatch_store::StoreError;

use crate::billing::BillingServiceError;
use crate::gateway::GatewayError;
use crate::jobs::JobError;

/// Where the client should send the user after a gateway failure.
pub const GATEWAY_ERROR_REDIRECT: &str = "/settings";

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden - valid credentials but insufficient permissions.
    #[error("forbidden")]
    Forbidden,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict - resource already exists or invalid state transition.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Well-formed input that breaks a billing rule.
    #[error("unprocessable: {0}")]
    Unprocessable(String),

    /// The payment gateway refused or failed the call.
    #[error(transparent)]
    Gateway(GatewayError),

    /// Background work could not be queued.
    #[error("job queue unavailable: {0}")]
    QueueUnavailable(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

fn gateway_status(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::CardDeclined(_) => StatusCode::PAYMENT_REQUIRED,
        GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        GatewayError::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
        GatewayError::Authentication(_) | GatewayError::Api(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::Forbidden => (StatusCode::FORBIDDEN, "forbidden", self.to_string(), None),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::Unprocessable(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "unprocessable",
                msg.clone(),
                None,
            ),
            Self::Gateway(err) => {
                tracing::warn!(kind = err.kind(), error = %err, "Payment gateway call failed");
                (
                    gateway_status(err),
                    err.kind(),
                    err.user_message().to_string(),
                    Some(serde_json::json!({
                        "level": "error",
                        "redirect_to": GATEWAY_ERROR_REDIRECT,
                    })),
                )
            }
            Self::QueueUnavailable(msg) => {
                tracing::error!(error = %msg, "Job queue unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "queue_unavailable",
                    "Please try again later".to_string(),
                    None,
                )
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound(format!("{entity} not found: {id}")),
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::Database(msg) | StoreError::Corrupt(msg) => Self::Internal(msg),
        }
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        Self::Unprocessable(err.to_string())
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self::Gateway(err)
    }
}

impl From<BillingServiceError> for ApiError {
    fn from(err: BillingServiceError) -> Self {
        match err {
            BillingServiceError::Gateway(e) => Self::Gateway(e),
            BillingServiceError::Store(e) => e.into(),
            BillingServiceError::Invalid(e) => e.into(),
            BillingServiceError::AlreadySubscribed => Self::Conflict(err.to_string()),
            BillingServiceError::NotSubscribed | BillingServiceError::NoPaymentMethod => {
                Self::NotFound(err.to_string())
            }
            BillingServiceError::SamePlan(_) => Self::Unprocessable(err.to_string()),
        }
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        Self::QueueUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn gateway_errors_hide_raw_text() {
        let (status, body) =
            body_of(GatewayError::CardDeclined("do_not_honor: raw".into()).into()).await;

        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["error"]["code"], "card_declined");
        assert_eq!(
            body["error"]["message"],
            "Sorry, your card was declined. Try again perhaps?"
        );
        assert_eq!(body["error"]["details"]["redirect_to"], "/settings");
        assert_eq!(body["error"]["details"]["level"], "error");
    }

    #[tokio::test]
    async fn gateway_connection_is_unavailable() {
        let (status, _) = body_of(GatewayError::Connection("timeout".into()).into()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn billing_errors_map_to_statuses() {
        let (status, body) = body_of(BillingServiceError::AlreadySubscribed.into()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["message"], "You already have an active subscription.");

        let (status, _) = body_of(BillingServiceError::NotSubscribed.into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) =
            body_of(BillingServiceError::Invalid(BillingError::UnknownPlan("tin".into())).into())
                .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn internal_errors_are_masked() {
        let (status, body) =
            body_of(StoreError::Database("connection reset".into()).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["message"], "An internal error occurred");
    }
}
