//! `IntoResponse` for `FleetError` (spec §7), grounded in the teacher's
//! `riptide_api::errors::ApiError` status-mapping and JSON error body shape.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fleetlb_types::FleetError;
use serde_json::json;

pub trait StatusCodeExt {
    fn status_code(&self) -> StatusCode;
}

impl StatusCodeExt for FleetError {
    fn status_code(&self) -> StatusCode {
        match self {
            FleetError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            FleetError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            FleetError::Forbidden { .. } => StatusCode::FORBIDDEN,
            FleetError::UnknownTier { .. } => StatusCode::BAD_REQUEST,
            FleetError::UnknownWorker { .. } => StatusCode::BAD_REQUEST,
            FleetError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            FleetError::RequestEntityTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            FleetError::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
            FleetError::NoCapacity { .. } => StatusCode::SERVICE_UNAVAILABLE,
            FleetError::UpstreamError { .. } => StatusCode::BAD_GATEWAY,
            FleetError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Wrapper so the `IntoResponse` impl lives in this crate (`FleetError` stays
/// framework-agnostic in `fleetlb-types`).
pub struct ApiError(pub FleetError);

impl From<FleetError> for ApiError {
    fn from(err: FleetError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        let error_type = self.0.error_type();
        let message = self.0.to_string();

        match status {
            StatusCode::INTERNAL_SERVER_ERROR | StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => {
                tracing::error!(error_type, message = %message, "request failed");
            }
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                tracing::warn!(error_type, message = %message, "request rejected");
            }
            _ => {
                tracing::info!(error_type, message = %message, "request failed");
            }
        }

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "retryable": self.0.is_retryable(),
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_capacity_maps_to_503() {
        let err = FleetError::no_capacity("lite");
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn unknown_tier_maps_to_400() {
        let err = FleetError::unknown_tier("huge");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn upstream_error_maps_to_502() {
        let err = FleetError::upstream("w1", "connection refused");
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }
}
