//! Periodic tasks: the health prober scheduler (spec §4.E) and the sweeper
//! (spec §4.J). Both run as independent `tokio::time::interval` loops and
//! observe a shared shutdown signal (spec §5: "periodic tasks observe a
//! shared cancellation signal").

use std::sync::Arc;
use std::time::Duration;

use fleetlb_types::ports::Prober;
use tokio::sync::watch;
use tracing::info;

use crate::state::State;

/// Fires one probe round per worker every `interval`, each bounded by the
/// state's configured probe timeout (spec §4.E: "spawns a probe task with a
/// per-probe deadline").
pub async fn run_health_prober(
    state: Arc<State>,
    prober: Arc<dyn Prober>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                state.probe_all(&prober).await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("health prober shutting down");
                    break;
                }
            }
        }
    }
}

/// Runs `State::sweep` on a fixed cadence until shutdown (spec §4.J).
pub async fn run_sweeper(state: Arc<State>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                state.sweep().await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("sweeper shutting down");
                    break;
                }
            }
        }
    }
}
