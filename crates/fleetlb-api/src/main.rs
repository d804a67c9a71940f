//! FleetLB server entry point, grounded in the teacher's `riptide-api`
//! `main.rs`: CLI parsing, tracing init, dependency construction, router
//! assembly, background tasks, and a signal-driven graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use fleetlb_config::{AppConfig, CliArgs};
use fleetlb_core::scheduler::{run_health_prober, run_sweeper};
use fleetlb_core::State;
use fleetlb_monitoring::{init_tracing, FleetMetrics};
use fleetlb_persistence::{NullPersistence, RedisPersistence};
use fleetlb_types::ports::PersistenceAdapter;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliArgs::parse();
    let config = AppConfig::load(cli.config.as_deref(), &cli)?;

    init_tracing(config.log_json);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), port = config.port, "starting fleetlb-server");

    let config = Arc::new(config);

    let persistence: Arc<dyn PersistenceAdapter> = match &config.redis_url {
        Some(url) => {
            tracing::info!("connecting to redis for warm-start persistence");
            Arc::new(RedisPersistence::connect(url).await?)
        }
        None => {
            tracing::info!("no redis_url configured, running with in-memory-only persistence");
            Arc::new(NullPersistence)
        }
    };

    let core = Arc::new(State::new(config.clone(), persistence));
    core.warm_start().await;

    let metrics = Arc::new(FleetMetrics::new());
    let (prometheus_layer, transport_metrics) = axum_prometheus::PrometheusMetricLayer::pair();

    let app_state = fleetlb_api::AppState::new(config.clone(), core.clone(), metrics, transport_metrics);
    let router = fleetlb_api::build_router(app_state, prometheus_layer);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut background_tasks = Vec::new();
    if config.health_check_enabled {
        let prober = fleetlb_core::probe::build_prober(
            config.health_check_type,
            config.health_check_timeout(),
            config.health_check_path.clone(),
        )
        .into();
        background_tasks.push(tokio::spawn(run_health_prober(
            core.clone(),
            prober,
            config.health_check_interval(),
            shutdown_rx.clone(),
        )));
    }
    background_tasks.push(tokio::spawn(run_sweeper(core.clone(), config.cleanup_interval(), shutdown_rx.clone())));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "fleetlb-server listening");

    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(shutdown_tx, config.shutdown_timeout()))
        .await?;

    for task in background_tasks {
        let _ = task.await;
    }

    tracing::info!("fleetlb-server shutdown complete");
    Ok(())
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>, grace_period: Duration) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut handler) => {
                handler.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install sigterm handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c, starting graceful shutdown"),
        _ = terminate => tracing::info!("received sigterm, starting graceful shutdown"),
    }

    let _ = shutdown_tx.send(true);
    tokio::time::sleep(grace_period.min(Duration::from_secs(5))).await;
}
