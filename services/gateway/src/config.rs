use clap::Parser;
use depth_mirror::MirrorConfig;
use depth_mirror::config::{
    DEFAULT_DEPTH_LIMIT, DEFAULT_HISTORY_CAPACITY, DEFAULT_REST_BASE_URL, DEFAULT_SYMBOL,
    DEFAULT_WS_BASE_URL,
};
use std::net::SocketAddr;
use std::time::Duration;
use types::ids::Symbol;

/// Local order book mirror with an HTTP query API.
#[derive(Debug, Clone, Parser)]
#[command(version, about, long_about = None)]
pub struct GatewayConfig {
    /// Exchange symbol to mirror.
    #[arg(long, env = "SYMBOL", default_value = DEFAULT_SYMBOL)]
    pub symbol: String,

    /// REST base URL for depth snapshots.
    #[arg(long, env = "REST_BASE_URL", default_value = DEFAULT_REST_BASE_URL)]
    pub rest_base_url: String,

    /// WebSocket base URL for the diff stream.
    #[arg(long, env = "WS_BASE_URL", default_value = DEFAULT_WS_BASE_URL)]
    pub ws_base_url: String,

    /// Levels per side requested in each snapshot.
    #[arg(long, env = "DEPTH_LIMIT", default_value_t = DEFAULT_DEPTH_LIMIT)]
    pub depth_limit: u32,

    /// Diff stream speed in milliseconds (100, 250 or 500).
    #[arg(long, env = "STREAM_SPEED_MS")]
    pub stream_speed_ms: Option<u32>,

    /// Maximum number of per-second history captures.
    #[arg(long, env = "MAX_HISTORY_SNAPSHOTS", default_value_t = DEFAULT_HISTORY_CAPACITY)]
    pub max_history_snapshots: usize,

    /// Seconds to wait before reconnecting.
    #[arg(long, env = "RECONNECT_DELAY", default_value_t = 5)]
    pub reconnect_delay_secs: u64,

    /// Seconds allowed for a WebSocket connect.
    #[arg(long, env = "CONNECT_TIMEOUT", default_value_t = 30)]
    pub connect_timeout_secs: u64,

    /// Seconds allowed for a snapshot request.
    #[arg(long, env = "REQUEST_TIMEOUT", default_value_t = 10)]
    pub request_timeout_secs: u64,

    /// HTTP listen address.
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8000")]
    pub listen_addr: SocketAddr,

    /// Seconds to wait for tasks to finish on shutdown.
    #[arg(long, env = "SHUTDOWN_GRACE", default_value_t = 5)]
    pub shutdown_grace_secs: u64,
}

impl GatewayConfig {
    /// Build and validate the mirror configuration.
    pub fn mirror_config(&self) -> anyhow::Result<MirrorConfig> {
        let symbol = Symbol::try_new(self.symbol.as_str())
            .ok_or_else(|| anyhow::anyhow!("invalid symbol: {:?}", self.symbol))?;

        let mut config = MirrorConfig::for_symbol(symbol);
        config.rest_base_url = self.rest_base_url.clone();
        config.ws_base_url = self.ws_base_url.clone();
        config.depth_limit = self.depth_limit;
        config.stream_speed_ms = self.stream_speed_ms;
        config.history_capacity = self.max_history_snapshots;
        config.reconnect_delay = Duration::from_secs(self.reconnect_delay_secs);
        config.connect_timeout = Duration::from_secs(self.connect_timeout_secs);
        config.request_timeout = Duration::from_secs(self.request_timeout_secs);
        config.validate()?;
        Ok(config)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
