//! TCP and HTTP probe implementations of `fleetlb_types::ports::Prober`
//! (spec §4.E).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use fleetlb_config::HealthCheckType;
use fleetlb_types::model::Worker;
use fleetlb_types::ports::{ProbeOutcome, Prober};

/// Connects to `host:port` parsed from the worker's primary endpoint; success
/// iff the connection completes before the caller's deadline.
pub struct TcpProber {
    pub timeout: Duration,
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, worker: &Worker) -> (ProbeOutcome, Duration) {
        let Some(authority) = host_port(&worker.primary_endpoint) else {
            return (ProbeOutcome::Failure, Duration::ZERO);
        };
        let start = Instant::now();
        let outcome = match tokio::time::timeout(
            self.timeout,
            tokio::net::TcpStream::connect(&authority),
        )
        .await
        {
            Ok(Ok(_stream)) => ProbeOutcome::Success,
            _ => ProbeOutcome::Failure,
        };
        (outcome, start.elapsed())
    }
}

/// GETs `endpoint + health_path`; success iff the status falls in `[200,400)`
/// (spec §4.E HTTP probe).
pub struct HttpProber {
    pub client: reqwest::Client,
    pub timeout: Duration,
    pub health_path: String,
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, worker: &Worker) -> (ProbeOutcome, Duration) {
        let url = format!(
            "{}{}",
            worker.primary_endpoint.trim_end_matches('/'),
            self.health_path
        );
        let start = Instant::now();
        let outcome = match tokio::time::timeout(self.timeout, self.client.get(&url).send()).await
        {
            Ok(Ok(resp)) => {
                let status = resp.status().as_u16();
                if (200..400).contains(&status) {
                    ProbeOutcome::Success
                } else {
                    ProbeOutcome::Failure
                }
            }
            _ => ProbeOutcome::Failure,
        };
        (outcome, start.elapsed())
    }
}

fn host_port(endpoint: &str) -> Option<String> {
    let url = url::Url::parse(endpoint).ok()?;
    let host = url.host_str()?;
    let port = url.port_or_known_default().unwrap_or(80);
    Some(format!("{host}:{port}"))
}

/// Builds the configured prober kind (spec §6 `health_check_type`).
pub fn build_prober(
    kind: HealthCheckType,
    timeout: Duration,
    health_path: String,
) -> Box<dyn Prober> {
    match kind {
        HealthCheckType::Tcp => Box::new(TcpProber { timeout }),
        HealthCheckType::Http => Box::new(HttpProber {
            client: reqwest::Client::new(),
            timeout,
            health_path,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_port_parses_explicit_port() {
        assert_eq!(host_port("http://10.0.0.1:9000"), Some("10.0.0.1:9000".to_string()));
    }

    #[test]
    fn host_port_falls_back_to_scheme_default() {
        assert_eq!(host_port("http://10.0.0.1"), Some("10.0.0.1:80".to_string()));
        assert_eq!(host_port("https://10.0.0.1"), Some("10.0.0.1:443".to_string()));
    }

    #[test]
    fn host_port_rejects_unparseable_endpoint() {
        assert_eq!(host_port("not a url"), None);
    }

    #[tokio::test]
    async fn tcp_probe_fails_fast_against_closed_port() {
        let prober = TcpProber { timeout: Duration::from_millis(200) };
        let worker = Worker {
            worker_id: "w1".into(),
            hostname: "h".into(),
            public_ip: "127.0.0.1".into(),
            local_ip: "127.0.0.1".into(),
            latitude: None,
            longitude: None,
            country: None,
            city: None,
            total_vcpu: 1,
            total_memory_gb: 1.0,
            total_storage_gb: 1.0,
            total_gpus: 0,
            gpu_models: vec![],
            primary_endpoint: "http://127.0.0.1:1".into(),
            endpoint_routes: vec![],
        };
        let (outcome, _latency) = prober.probe(&worker).await;
        assert_eq!(outcome, ProbeOutcome::Failure);
    }

    #[tokio::test]
    async fn http_probe_succeeds_on_2xx() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/health"))
            .respond_with(wiremock::ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let prober = HttpProber {
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(2),
            health_path: "/health".to_string(),
        };
        let worker = Worker {
            worker_id: "w1".into(),
            hostname: "h".into(),
            public_ip: "127.0.0.1".into(),
            local_ip: "127.0.0.1".into(),
            latitude: None,
            longitude: None,
            country: None,
            city: None,
            total_vcpu: 1,
            total_memory_gb: 1.0,
            total_storage_gb: 1.0,
            total_gpus: 0,
            gpu_models: vec![],
            primary_endpoint: server.uri(),
            endpoint_routes: vec![],
        };
        let (outcome, _latency) = prober.probe(&worker).await;
        assert_eq!(outcome, ProbeOutcome::Success);
    }

    #[tokio::test]
    async fn http_probe_fails_on_5xx() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/health"))
            .respond_with(wiremock::ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let prober = HttpProber {
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(2),
            health_path: "/health".to_string(),
        };
        let worker = Worker {
            worker_id: "w1".into(),
            hostname: "h".into(),
            public_ip: "127.0.0.1".into(),
            local_ip: "127.0.0.1".into(),
            latitude: None,
            longitude: None,
            country: None,
            city: None,
            total_vcpu: 1,
            total_memory_gb: 1.0,
            total_storage_gb: 1.0,
            total_gpus: 0,
            gpu_models: vec![],
            primary_endpoint: server.uri(),
            endpoint_routes: vec![],
        };
        let (outcome, _latency) = prober.probe(&worker).await;
        assert_eq!(outcome, ProbeOutcome::Failure);
    }
}
