//! Configuration loading for FleetLB.
//!
//! Precedence, highest to lowest: CLI flags > environment (`FLEETLB_*`) > YAML
//! file > built-in defaults. Unknown YAML keys are ignored; missing keys take
//! the documented default.

pub mod cli;
pub mod env;
pub mod error;
pub mod tiers;

use std::time::Duration;

use serde::Deserialize;

pub use cli::CliArgs;
pub use error::ConfigError;
pub use tiers::TierTable;

/// Fully resolved, process-lifetime configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Network
    pub port: u16,
    pub host: String,
    pub tls_cert_file: Option<String>,
    pub tls_key_file: Option<String>,
    pub tls_insecure_skip_verify: bool,

    // Security
    pub server_key: Option<String>,
    pub api_keys: Vec<String>,
    pub whitelisted_ips: Vec<String>,
    pub rate_limit_per_minute: u32,
    pub rate_limit_burst: u32,
    pub max_request_body_bytes: usize,
    pub request_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
    pub read_header_timeout_seconds: u64,
    pub enable_cors: bool,
    pub cors_allowed_origins: Vec<String>,
    pub disable_security_headers: bool,

    // Lifecycle
    pub stale_minutes: u64,
    pub cleanup_interval_seconds: u64,
    pub shutdown_timeout_seconds: u64,
    pub pending_allocation_timeout_seconds: u64,

    // Sticky
    pub sticky_header: Option<String>,
    pub sticky_by_ip: bool,
    pub sticky_affinity_enabled: bool,

    // Tier extraction
    pub tier_field_name: String,
    pub tier_header: String,

    // Tiers
    pub tiers: TierTable,

    // Proxy
    pub proxy_endpoints: Vec<String>,
    pub proxy_sse_flush_interval_ms: i64,

    // Health
    pub health_check_enabled: bool,
    pub health_check_interval_seconds: u64,
    pub health_check_timeout_seconds: u64,
    pub health_check_type: HealthCheckType,
    pub health_check_path: String,
    pub health_check_unhealthy_threshold: u32,
    pub health_check_healthy_threshold: u32,

    // Persistence
    pub redis_url: Option<String>,
    pub redis_pool_size: u32,

    // Logging
    pub log_json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthCheckType {
    Tcp,
    Http,
}

impl AppConfig {
    pub fn stale_timeout(&self) -> Duration {
        Duration::from_secs(self.stale_minutes * 60)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_seconds)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_secs(self.health_check_timeout_seconds)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }

    pub fn pending_allocation_timeout(&self) -> Duration {
        Duration::from_secs(self.pending_allocation_timeout_seconds)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }

    /// Effective rate-limit burst: the configured value, or 2x the per-minute
    /// rate when unset (spec §5 Rate limiting).
    pub fn effective_rate_limit_burst(&self) -> u32 {
        if self.rate_limit_burst > 0 {
            self.rate_limit_burst
        } else {
            self.rate_limit_per_minute.saturating_mul(2)
        }
    }

    /// Load from an optional YAML file, overlaid with `FLEETLB_*` env vars,
    /// overlaid with explicit CLI flags.
    pub fn load(yaml_path: Option<&str>, cli: &CliArgs) -> Result<Self, ConfigError> {
        let raw = match yaml_path {
            Some(path) => RawConfig::from_yaml_file(path)?,
            None => RawConfig::default(),
        };
        let raw = raw.overlay_env(&env::EnvConfigLoader::new("FLEETLB"));
        let raw = raw.overlay_cli(cli);
        raw.resolve()
    }
}

/// Deserializable mirror of `AppConfig`, every field optional so that a YAML
/// document may specify only the keys it cares about.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub tls_cert_file: Option<String>,
    pub tls_key_file: Option<String>,
    pub tls_insecure_skip_verify: Option<bool>,

    pub server_key: Option<String>,
    pub api_keys: Option<Vec<String>>,
    pub whitelisted_ips: Option<Vec<String>>,
    pub rate_limit_per_minute: Option<u32>,
    pub rate_limit_burst: Option<u32>,
    pub max_request_body_bytes: Option<usize>,
    pub request_timeout_seconds: Option<u64>,
    pub idle_timeout_seconds: Option<u64>,
    pub read_header_timeout_seconds: Option<u64>,
    pub enable_cors: Option<bool>,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub disable_security_headers: Option<bool>,

    pub stale_minutes: Option<u64>,
    pub cleanup_interval_seconds: Option<u64>,
    pub shutdown_timeout_seconds: Option<u64>,
    pub pending_allocation_timeout_seconds: Option<u64>,

    pub sticky_header: Option<String>,
    pub sticky_by_ip: Option<bool>,
    pub sticky_affinity_enabled: Option<bool>,

    pub tier_field_name: Option<String>,
    pub tier_header: Option<String>,

    pub tiers: Option<Vec<tiers::TierSpecRaw>>,

    pub proxy_endpoints: Option<Vec<String>>,
    pub proxy_sse_flush_interval_ms: Option<i64>,

    pub health_check_enabled: Option<bool>,
    pub health_check_interval_seconds: Option<u64>,
    pub health_check_timeout_seconds: Option<u64>,
    pub health_check_type: Option<HealthCheckType>,
    pub health_check_path: Option<String>,
    pub health_check_unhealthy_threshold: Option<u32>,
    pub health_check_healthy_threshold: Option<u32>,

    pub redis_url: Option<String>,
    pub redis_pool_size: Option<u32>,

    pub log_json: Option<bool>,
}

impl RawConfig {
    fn from_yaml_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io { path: path.to_string(), source: e })?;
        serde_yaml::from_str(&contents)
            .map_err(|e| ConfigError::Yaml { path: path.to_string(), source: e })
    }

    fn overlay_env(mut self, loader: &env::EnvConfigLoader) -> Self {
        macro_rules! ov {
            ($field:ident, $getter:ident) => {
                if let Some(v) = loader.$getter(stringify!($field)) {
                    self.$field = Some(v);
                }
            };
        }
        ov!(port, get_u16);
        ov!(host, get_string);
        ov!(tls_cert_file, get_string);
        ov!(tls_key_file, get_string);
        ov!(tls_insecure_skip_verify, get_bool);
        ov!(server_key, get_string);
        ov!(api_keys, get_list);
        ov!(whitelisted_ips, get_list);
        ov!(rate_limit_per_minute, get_u32);
        ov!(rate_limit_burst, get_u32);
        ov!(max_request_body_bytes, get_usize);
        ov!(request_timeout_seconds, get_u64);
        ov!(idle_timeout_seconds, get_u64);
        ov!(read_header_timeout_seconds, get_u64);
        ov!(enable_cors, get_bool);
        ov!(cors_allowed_origins, get_list);
        ov!(disable_security_headers, get_bool);
        ov!(stale_minutes, get_u64);
        ov!(cleanup_interval_seconds, get_u64);
        ov!(shutdown_timeout_seconds, get_u64);
        ov!(pending_allocation_timeout_seconds, get_u64);
        ov!(sticky_header, get_string);
        ov!(sticky_by_ip, get_bool);
        ov!(sticky_affinity_enabled, get_bool);
        ov!(tier_field_name, get_string);
        ov!(tier_header, get_string);
        ov!(proxy_endpoints, get_list);
        ov!(proxy_sse_flush_interval_ms, get_i64);
        ov!(health_check_enabled, get_bool);
        ov!(health_check_interval_seconds, get_u64);
        ov!(health_check_timeout_seconds, get_u64);
        ov!(health_check_path, get_string);
        ov!(health_check_unhealthy_threshold, get_u32);
        ov!(health_check_healthy_threshold, get_u32);
        ov!(redis_url, get_string);
        ov!(redis_pool_size, get_u32);
        ov!(log_json, get_bool);
        self
    }

    fn overlay_cli(mut self, cli: &CliArgs) -> Self {
        if let Some(v) = cli.port {
            self.port = Some(v);
        }
        if let Some(v) = cli.host.clone() {
            self.host = Some(v);
        }
        if let Some(v) = cli.server_key.clone() {
            self.server_key = Some(v);
        }
        if let Some(v) = cli.redis_url.clone() {
            self.redis_url = Some(v);
        }
        if cli.disable_security_headers {
            self.disable_security_headers = Some(true);
        }
        self
    }

    fn resolve(self) -> Result<AppConfig, ConfigError> {
        let tiers = tiers::TierTable::from_specs(self.tiers.unwrap_or_default())?;
        Ok(AppConfig {
            port: self.port.unwrap_or(8080),
            host: self.host.unwrap_or_else(|| "0.0.0.0".to_string()),
            tls_cert_file: self.tls_cert_file,
            tls_key_file: self.tls_key_file,
            tls_insecure_skip_verify: self.tls_insecure_skip_verify.unwrap_or(false),

            server_key: self.server_key,
            api_keys: self.api_keys.unwrap_or_default(),
            whitelisted_ips: self.whitelisted_ips.unwrap_or_default(),
            rate_limit_per_minute: self.rate_limit_per_minute.unwrap_or(120),
            rate_limit_burst: self.rate_limit_burst.unwrap_or(0),
            max_request_body_bytes: self.max_request_body_bytes.unwrap_or(10 * 1024 * 1024),
            request_timeout_seconds: self.request_timeout_seconds.unwrap_or(30),
            idle_timeout_seconds: self.idle_timeout_seconds.unwrap_or(120),
            read_header_timeout_seconds: self.read_header_timeout_seconds.unwrap_or(10),
            enable_cors: self.enable_cors.unwrap_or(false),
            cors_allowed_origins: self.cors_allowed_origins.unwrap_or_default(),
            disable_security_headers: self.disable_security_headers.unwrap_or(false),

            stale_minutes: self.stale_minutes.unwrap_or(5),
            cleanup_interval_seconds: self.cleanup_interval_seconds.unwrap_or(60),
            shutdown_timeout_seconds: self.shutdown_timeout_seconds.unwrap_or(30),
            pending_allocation_timeout_seconds: self
                .pending_allocation_timeout_seconds
                .unwrap_or(120),

            sticky_header: self.sticky_header,
            sticky_by_ip: self.sticky_by_ip.unwrap_or(false),
            sticky_affinity_enabled: self.sticky_affinity_enabled.unwrap_or(true),

            tier_field_name: self.tier_field_name.unwrap_or_else(|| "tier".to_string()),
            tier_header: self.tier_header.unwrap_or_else(|| "X-Tier".to_string()),

            tiers,

            proxy_endpoints: self.proxy_endpoints.unwrap_or_default(),
            proxy_sse_flush_interval_ms: self.proxy_sse_flush_interval_ms.unwrap_or(-1),

            health_check_enabled: self.health_check_enabled.unwrap_or(true),
            health_check_interval_seconds: self.health_check_interval_seconds.unwrap_or(10),
            health_check_timeout_seconds: self.health_check_timeout_seconds.unwrap_or(2),
            health_check_type: self.health_check_type.unwrap_or(HealthCheckType::Tcp),
            health_check_path: self.health_check_path.unwrap_or_else(|| "/health".to_string()),
            health_check_unhealthy_threshold: self
                .health_check_unhealthy_threshold
                .unwrap_or(3),
            health_check_healthy_threshold: self.health_check_healthy_threshold.unwrap_or(2),

            redis_url: self.redis_url,
            redis_pool_size: self.redis_pool_size.unwrap_or(10),

            log_json: self.log_json.unwrap_or(false),
        })
    }
}
