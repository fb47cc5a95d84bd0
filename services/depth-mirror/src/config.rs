//! Runtime configuration for the depth mirror

use std::time::Duration;

use types::ids::Symbol;

use crate::error::{MirrorError, MirrorResult};

pub const DEFAULT_SYMBOL: &str = "ETHUSDT";
pub const DEFAULT_REST_BASE_URL: &str = "https://fapi.binance.com";
pub const DEFAULT_WS_BASE_URL: &str = "wss://fstream.binance.com";
pub const DEFAULT_DEPTH_LIMIT: u32 = 1000;
/// One capture per second for a day.
pub const DEFAULT_HISTORY_CAPACITY: usize = 86_400;
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Depth limits accepted by the snapshot endpoint.
pub const VALID_DEPTH_LIMITS: [u32; 7] = [5, 10, 20, 50, 100, 500, 1000];

/// Configuration for one mirrored symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    pub symbol: Symbol,
    /// REST base, e.g. `https://fapi.binance.com`.
    pub rest_base_url: String,
    /// WebSocket base, e.g. `wss://fstream.binance.com`.
    pub ws_base_url: String,
    /// Levels per side requested in each snapshot.
    pub depth_limit: u32,
    /// Diff stream update speed in milliseconds; `None` uses the exchange default.
    pub stream_speed_ms: Option<u32>,
    /// Maximum number of history entries.
    pub history_capacity: usize,
    /// Fixed wait between reconnect attempts.
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl MirrorConfig {
    /// Defaults for `symbol`.
    pub fn for_symbol(symbol: Symbol) -> Self {
        Self {
            symbol,
            rest_base_url: DEFAULT_REST_BASE_URL.to_string(),
            ws_base_url: DEFAULT_WS_BASE_URL.to_string(),
            depth_limit: DEFAULT_DEPTH_LIMIT,
            stream_speed_ms: None,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Reject settings the mirror cannot run with.
    pub fn validate(&self) -> MirrorResult<()> {
        if self.history_capacity == 0 {
            return Err(MirrorError::Config(
                "history capacity must be at least 1".to_string(),
            ));
        }
        if !VALID_DEPTH_LIMITS.contains(&self.depth_limit) {
            return Err(MirrorError::Config(format!(
                "depth limit {} not one of {:?}",
                self.depth_limit, VALID_DEPTH_LIMITS
            )));
        }
        if let Some(speed) = self.stream_speed_ms {
            if ![100, 250, 500].contains(&speed) {
                return Err(MirrorError::Config(format!(
                    "stream speed {}ms not one of 100, 250, 500",
                    speed
                )));
            }
        }
        if !self.rest_base_url.starts_with("http://") && !self.rest_base_url.starts_with("https://") {
            return Err(MirrorError::Config(format!(
                "REST base URL must be http(s): {}",
                self.rest_base_url
            )));
        }
        if !self.ws_base_url.starts_with("ws://") && !self.ws_base_url.starts_with("wss://") {
            return Err(MirrorError::Config(format!(
                "WebSocket base URL must be ws(s): {}",
                self.ws_base_url
            )));
        }
        if self.connect_timeout.is_zero() || self.request_timeout.is_zero() {
            return Err(MirrorError::Config("timeouts must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Full snapshot URL including the query string.
    pub fn snapshot_url(&self) -> String {
        format!(
            "{}/fapi/v1/depth?symbol={}&limit={}",
            self.rest_base_url.trim_end_matches('/'),
            self.symbol,
            self.depth_limit
        )
    }

    /// Combined-stream URL for the symbol's depth diffs.
    pub fn stream_url(&self) -> String {
        let mut stream = format!("{}@depth", self.symbol.stream_name());
        if let Some(speed) = self.stream_speed_ms {
            stream.push_str(&format!("@{}ms", speed));
        }
        format!(
            "{}/stream?streams={}",
            self.ws_base_url.trim_end_matches('/'),
            stream
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_config() -> MirrorConfig {
        MirrorConfig::for_symbol(Symbol::try_new(DEFAULT_SYMBOL).unwrap())
    }

    #[test]
    fn test_defaults_match_deployment() {
        let config = default_config();
        assert_eq!(config.symbol.as_str(), "ETHUSDT");
        assert_eq!(
            config.snapshot_url(),
            "https://fapi.binance.com/fapi/v1/depth?symbol=ETHUSDT&limit=1000"
        );
        assert_eq!(
            config.stream_url(),
            "wss://fstream.binance.com/stream?streams=ethusdt@depth"
        );
        assert_eq!(config.history_capacity, 86_400);
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stream_url_with_speed() {
        let mut config = MirrorConfig::for_symbol(Symbol::try_new("BTCUSDT").unwrap());
        config.ws_base_url = "wss://example.test/".to_string();
        config.stream_speed_ms = Some(100);
        assert_eq!(
            config.stream_url(),
            "wss://example.test/stream?streams=btcusdt@depth@100ms"
        );
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let mut config = default_config();
        config.history_capacity = 0;
        assert!(matches!(config.validate(), Err(MirrorError::Config(_))));

        let mut config = default_config();
        config.depth_limit = 7;
        assert!(config.validate().is_err());

        let mut config = default_config();
        config.stream_speed_ms = Some(42);
        assert!(config.validate().is_err());

        let mut config = default_config();
        config.ws_base_url = "https://fstream.binance.com".to_string();
        assert!(config.validate().is_err());
    }
}
