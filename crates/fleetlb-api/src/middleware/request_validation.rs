//! Early rejection of malformed requests (spec §11 step 1), grounded in
//! `riptide_api::middleware::request_validation`: method/content-type checks
//! that run before routing, so a bad request never reaches a handler.

use axum::extract::Request;
use axum::http::{header, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::routes::is_management_path;

pub async fn request_validation_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    if let Err(resp) = validate_method(&method, &path) {
        return resp;
    }
    if should_validate_content_type(&method, &path) {
        if let Err(resp) = validate_content_type(request.headers()) {
            return resp;
        }
    }

    next.run(request).await
}

/// Only the explicit JSON-bodied management endpoints get a content-type
/// check; a proxied POST (file upload, form post, protobuf, ...) is forwarded
/// as-is (spec §4.H step 7).
fn should_validate_content_type(method: &Method, path: &str) -> bool {
    matches!(method, &Method::POST) && is_management_path(path)
}

fn allowed_methods(path: &str) -> &'static [&'static str] {
    match path {
        "/health" | "/clients" => &["GET"],
        "/register" | "/stats" | "/route" | "/clients/purge" | "/clients/purge-pending" => &["POST"],
        _ => &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"],
    }
}

fn validate_method(method: &Method, path: &str) -> Result<(), Response> {
    let allowed = allowed_methods(path);
    if allowed.contains(&method.as_str()) {
        return Ok(());
    }
    Err(json_error(
        StatusCode::METHOD_NOT_ALLOWED,
        "method_not_allowed",
        format!("method {method} not allowed for {path}"),
    ))
}

fn validate_content_type(headers: &axum::http::HeaderMap) -> Result<(), Response> {
    let content_type = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
    match content_type {
        Some(ct) if ct.starts_with("application/json") => Ok(()),
        _ => Err(json_error(
            StatusCode::BAD_REQUEST,
            "bad_request",
            "expected Content-Type: application/json".to_string(),
        )),
    }
}

fn json_error(status: StatusCode, error_type: &str, message: String) -> Response {
    (
        status,
        axum::Json(json!({ "error": { "type": error_type, "message": message, "retryable": false } })),
    )
        .into_response()
}
