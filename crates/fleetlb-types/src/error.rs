//! Error taxonomy for FleetLB (spec §7).
//!
//! Kept HTTP-framework-agnostic: this crate does not depend on axum, so the
//! IntoResponse mapping lives in `fleetlb-api::errors`. Each variant carries the
//! status-code intent as a comment; `fleetlb-api` is the single place that turns
//! that intent into an actual `http::StatusCode`.

use thiserror::Error;

/// All error kinds the core and API surface can raise, one per §7 row.
#[derive(Error, Debug)]
pub enum FleetError {
    /// Malformed JSON, missing `worker_id`, invalid content-type, path traversal (400).
    #[error("bad request: {message}")]
    BadRequest { message: String },

    /// Missing API key (401).
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Invalid API key or IP not on the whitelist (403).
    #[error("forbidden: {message}")]
    Forbidden { message: String },

    /// Tier name not present in the configured tier table (400).
    #[error("unknown tier: {tier}")]
    UnknownTier { tier: String },

    /// Stats posted for a `worker_id` that never registered (400, or ignored by policy).
    #[error("unknown worker: {worker_id}")]
    UnknownWorker { worker_id: String },

    /// Per-IP token bucket exhausted (429).
    #[error("rate limit exceeded")]
    TooManyRequests,

    /// Request body exceeded `max_request_body_bytes` (413).
    #[error("request entity too large: {size} bytes (limit {limit})")]
    RequestEntityTooLarge { size: usize, limit: usize },

    /// Request exceeded its deadline (408).
    #[error("request timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// `selectWorker` returned no candidate (503).
    #[error("no available workers for tier {tier}")]
    NoCapacity { tier: String },

    /// Reverse proxy could not reach the chosen worker (502/504).
    #[error("upstream error contacting {worker_id}: {message}")]
    UpstreamError { worker_id: String, message: String },

    /// Recovered panic, or any other unexpected internal failure (500).
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl FleetError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn unknown_tier(tier: impl Into<String>) -> Self {
        Self::UnknownTier { tier: tier.into() }
    }

    pub fn unknown_worker(worker_id: impl Into<String>) -> Self {
        Self::UnknownWorker {
            worker_id: worker_id.into(),
        }
    }

    pub fn no_capacity(tier: impl Into<String>) -> Self {
        Self::NoCapacity { tier: tier.into() }
    }

    pub fn upstream(worker_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UpstreamError {
            worker_id: worker_id.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// A short machine-stable identifier, used for logging and as the `"type"`
    /// field in the JSON error body.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "bad_request",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Forbidden { .. } => "forbidden",
            Self::UnknownTier { .. } => "unknown_tier",
            Self::UnknownWorker { .. } => "unknown_worker",
            Self::TooManyRequests => "too_many_requests",
            Self::RequestEntityTooLarge { .. } => "request_entity_too_large",
            Self::Timeout { .. } => "timeout",
            Self::NoCapacity { .. } => "no_capacity",
            Self::UpstreamError { .. } => "upstream_error",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Whether a client could reasonably retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TooManyRequests | Self::NoCapacity { .. } | Self::UpstreamError { .. }
        )
    }
}

impl From<serde_json::Error> for FleetError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest {
            message: format!("invalid JSON: {err}"),
        }
    }
}

pub type FleetResult<T> = Result<T, FleetError>;
