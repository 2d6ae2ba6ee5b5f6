//! Session configuration from environment variables

use std::env;

/// Configuration for the kiosk session runtime.
///
/// Loaded from environment variables with defaults matching the station's
/// access-point deployment.
#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket endpoint of the station
    pub ws_url: String,

    /// Base URL for the HTTP fallback surface
    pub http_url: String,

    /// Fixed delay between reconnect attempts (no backoff growth)
    pub reconnect_delay_ms: u64,

    /// Cap on a single connect attempt, so a hung dial cannot stall the
    /// retry loop
    pub connect_timeout_ms: u64,

    /// Maximum number of live series
    pub series_capacity: usize,

    /// A series with no reading for this long is swept
    pub stale_timeout_ms: i64,

    /// Initial trailing display window
    pub window_ms: i64,

    /// Snapshot/redraw period
    pub redraw_interval_ms: u64,

    /// Stale-sweep period
    pub sweep_interval_ms: u64,

    /// Initial spec threshold for grading
    pub min_spec: f64,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `WEIGHLINK_WS_URL` (default: ws://192.168.4.1/ws)
    /// - `WEIGHLINK_HTTP_URL` (default: http://192.168.4.1)
    /// - `RECONNECT_DELAY_MS` (default: 1500)
    /// - `CONNECT_TIMEOUT_MS` (default: 10000)
    /// - `SERIES_CAPACITY` (default: 4)
    /// - `STALE_TIMEOUT_MS` (default: 300000)
    /// - `WINDOW_MS` (default: 300000)
    /// - `REDRAW_INTERVAL_MS` (default: 1000)
    /// - `SWEEP_INTERVAL_MS` (default: 30000)
    /// - `MIN_SPEC` (default: 550)
    pub fn from_env() -> Self {
        Self {
            ws_url: env::var("WEIGHLINK_WS_URL")
                .unwrap_or_else(|_| "ws://192.168.4.1/ws".to_string()),

            http_url: env::var("WEIGHLINK_HTTP_URL")
                .unwrap_or_else(|_| "http://192.168.4.1".to_string()),

            reconnect_delay_ms: env_parse("RECONNECT_DELAY_MS", 1_500),
            connect_timeout_ms: env_parse("CONNECT_TIMEOUT_MS", 10_000),
            series_capacity: env_parse("SERIES_CAPACITY", 4),
            stale_timeout_ms: env_parse("STALE_TIMEOUT_MS", 5 * 60 * 1000),
            window_ms: env_parse("WINDOW_MS", 5 * 60 * 1000),
            redraw_interval_ms: env_parse("REDRAW_INTERVAL_MS", 1_000),
            sweep_interval_ms: env_parse("SWEEP_INTERVAL_MS", 30_000),
            min_spec: env_parse("MIN_SPEC", 550.0),
        }
    }
}
