//! Scenario 4 (spec §8): a worker with 80 GiB of free VRAM admits exactly
//! five concurrent 16 GiB GPU-memory reservations; a sixth gets 503.

mod common;

use fleetlb_config::tiers::TierSpecRaw;
use serde_json::json;

#[tokio::test]
async fn sixth_gpu_reservation_is_rejected() {
    let config = common::config(|cfg| {
        cfg.tiers = fleetlb_config::TierTable::from_specs(vec![TierSpecRaw {
            name: "gpu-inference".into(),
            vcpu: 1,
            memory_gb: 1.0,
            storage_gb: 1.0,
            gpu: 0,
            gpu_memory_gb: 16.0,
        }])
        .unwrap();
    });
    let app = common::build_app(config);

    app.core.register(common::worker("w-gpu", "http://10.0.0.1:11000", 32));
    app.core.update_stats("w-gpu", common::gpu_stats(256.0, 1000.0, 80.0)).unwrap();

    let mut tasks = Vec::new();
    for _ in 0..6 {
        let router = app.router.clone();
        tasks.push(tokio::spawn(async move {
            common::post_json(&router, "/route", json!({ "tier": "gpu-inference" }), &[]).await.0
        }));
    }

    let mut ok = 0;
    let mut unavailable = 0;
    for task in tasks {
        match task.await.unwrap() {
            axum::http::StatusCode::OK => ok += 1,
            axum::http::StatusCode::SERVICE_UNAVAILABLE => unavailable += 1,
            other => panic!("unexpected status {other}"),
        }
    }

    assert_eq!(ok, 5);
    assert_eq!(unavailable, 1);
}
