//! Command-line flags. Only the handful of settings an operator typically
//! wants to override at launch time are exposed here; everything else lives
//! in the YAML file or environment.

use clap::Parser;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "fleetlb-server", about = "Resource-aware layer-7 load balancer")]
pub struct CliArgs {
    /// Path to the YAML configuration file.
    #[arg(long, env = "FLEETLB_CONFIG")]
    pub config: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub server_key: Option<String>,

    #[arg(long)]
    pub redis_url: Option<String>,

    #[arg(long, default_value_t = false)]
    pub disable_security_headers: bool,
}
