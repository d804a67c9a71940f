//! Redis-backed `PersistenceAdapter` (spec §4.H / SPEC component "Persistence
//! Adapter"): warm-start snapshot load and best-effort periodic mirroring.
//!
//! Persistence is advisory everywhere it's consulted — the in-memory `State`
//! is the source of truth (spec §4.K: "Persistence write: Log + continue").

pub mod redis_adapter;

pub use redis_adapter::{NullPersistence, RedisPersistence};
