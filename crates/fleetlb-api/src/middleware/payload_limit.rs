//! Enforces `max_request_body_bytes` from `Content-Length` before the body is
//! read, grounded in `riptide_api::middleware::payload_limit::PayloadLimitLayer`.

use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tower::{Layer, Service};

#[derive(Clone)]
pub struct PayloadLimitLayer {
    max_size: usize,
}

impl PayloadLimitLayer {
    pub fn with_limit(max_size: usize) -> Self {
        Self { max_size }
    }
}

impl<S> Layer<S> for PayloadLimitLayer {
    type Service = PayloadLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PayloadLimitService { inner, max_size: self.max_size }
    }
}

#[derive(Clone)]
pub struct PayloadLimitService<S> {
    inner: S,
    max_size: usize,
}

impl<S> Service<Request> for PayloadLimitService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let max_size = self.max_size;
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            if let Some(length) = request
                .headers()
                .get(http::header::CONTENT_LENGTH)
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<usize>().ok())
            {
                if length > max_size {
                    tracing::warn!(size = length, max_size, "request payload too large");
                    return Ok(Response::builder()
                        .status(StatusCode::PAYLOAD_TOO_LARGE)
                        .header(http::header::CONTENT_TYPE, "application/json")
                        .body(Body::from(
                            json!({
                                "error": {
                                    "type": "request_entity_too_large",
                                    "message": format!("request entity too large: {length} bytes (limit {max_size})"),
                                    "retryable": false,
                                }
                            })
                            .to_string(),
                        ))
                        .unwrap()
                        .into_response());
                }
            }

            inner.call(request).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::Router;
    use tower::ServiceExt;

    #[tokio::test]
    async fn payload_within_limit_passes_through() {
        let app = Router::new()
            .route("/test", post(|| async { "OK" }))
            .layer(PayloadLimitLayer::with_limit(100));

        let request = Request::builder()
            .method("POST")
            .uri("/test")
            .header(http::header::CONTENT_LENGTH, "50")
            .body(Body::from("small payload"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn payload_exceeding_limit_is_rejected() {
        let app = Router::new()
            .route("/test", post(|| async { "OK" }))
            .layer(PayloadLimitLayer::with_limit(100));

        let request = Request::builder()
            .method("POST")
            .uri("/test")
            .header(http::header::CONTENT_LENGTH, "200")
            .body(Body::from("large payload"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn missing_content_length_passes_through() {
        let app = Router::new()
            .route("/test", post(|| async { "OK" }))
            .layer(PayloadLimitLayer::with_limit(100));

        let request = Request::builder().method("POST").uri("/test").body(Body::from("x")).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
