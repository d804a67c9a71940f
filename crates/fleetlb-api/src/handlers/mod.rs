//! HTTP management surface handlers (spec §6).

pub mod clients;
pub mod health;
pub mod register;
pub mod route;
pub mod stats;

pub use clients::{list_clients, purge_all, purge_pending};
pub use health::health;
pub use register::register;
pub use route::route;
pub use stats::stats;
