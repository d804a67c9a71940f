//! `tracing`/`tracing-subscriber` setup, grounded in the teacher's
//! `riptide-api::main` initialization: an `EnvFilter` seeded from `RUST_LOG`
//! with an `info`-level default, and a formatting layer chosen by config.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global `tracing` subscriber. `json` selects the
/// production JSON formatter; otherwise the human-readable `fmt` layer is
/// used, matching local/dev output in the teacher repo.
///
/// Must be called exactly once, as early as possible in `main`.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(fmt::layer().json().with_current_span(true)).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
