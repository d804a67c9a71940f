//! Shared data model, wire DTOs, port traits and error taxonomy for FleetLB.
//!
//! Kept framework-agnostic on purpose: `fleetlb-core` and `fleetlb-persistence`
//! depend on these types without pulling in Axum or Redis.

pub mod error;
pub mod model;
pub mod ports;
pub mod wire;

pub use error::{FleetError, FleetResult};
