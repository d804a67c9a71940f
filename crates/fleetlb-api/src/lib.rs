//! HTTP management surface and reverse proxy for FleetLB, grounded in the
//! teacher's `riptide_api` crate layout (a thin `main.rs` over a `lib.rs`
//! that integration tests and the binary both depend on).

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod proxy;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;
