//! Core data structures for the kiosk session
//!
//! Everything here is plain data: the registry owns the only mutable copies,
//! consumers get snapshots or notifications.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// A single reading from a reporting node.
///
/// `Missing` means the node reported "no data this tick" (a null weight on
/// the wire). It is kept in the sample history so gaps stay visible, but it
/// never participates in numeric aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SampleValue {
    Present(f64),
    Missing,
}

impl SampleValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SampleValue::Present(v) => Some(*v),
            SampleValue::Missing => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, SampleValue::Present(_))
    }
}

/// Timestamped reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Unix timestamp in milliseconds
    pub timestamp_ms: i64,
    pub value: SampleValue,
}

impl Sample {
    pub fn present(timestamp_ms: i64, value: f64) -> Self {
        Self {
            timestamp_ms,
            value: SampleValue::Present(value),
        }
    }

    pub fn missing(timestamp_ms: i64) -> Self {
        Self {
            timestamp_ms,
            value: SampleValue::Missing,
        }
    }
}

/// Default trace color for a series that has not been recolored yet.
pub const DEFAULT_SERIES_COLOR: &str = "#0077cc";

/// Named, colored, time-ordered sample history for one reporting node.
#[derive(Debug, Clone)]
pub struct Series {
    pub id: String,
    pub display_name: String,
    pub color: String,
    /// Samples in non-decreasing timestamp order, trimmed to the window
    pub samples: VecDeque<Sample>,
    /// Last time a Present sample arrived (ms). Missing samples do not
    /// refresh this, so a node that only reports nulls goes stale.
    pub last_update_ms: i64,
}

impl Series {
    pub fn new(id: &str, display_name: Option<&str>, now_ms: i64) -> Self {
        let display_name = display_name
            .map(|n| n.to_string())
            .unwrap_or_else(|| format!("Node {}", id));
        Self {
            id: id.to_string(),
            display_name,
            color: DEFAULT_SERIES_COLOR.to_string(),
            samples: VecDeque::new(),
            last_update_ms: now_ms,
        }
    }
}

/// Connection lifecycle state of the channel to the station server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Trailing duration over which samples are retained and aggregated.
/// Global: changing it affects every series uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    pub duration_ms: i64,
}

impl Default for WindowSpec {
    fn default() -> Self {
        Self {
            duration_ms: 5 * 60 * 1000,
        }
    }
}

impl WindowSpec {
    pub fn new(duration_ms: i64) -> Self {
        Self { duration_ms }
    }

    /// Update the shared duration. Buffers are not eagerly re-trimmed;
    /// the new cutoff applies on the next touch or aggregate call.
    pub fn set_duration(&mut self, duration_ms: i64) {
        self.duration_ms = duration_ms;
    }
}

/// Minimum acceptable aggregate value for pass/near-miss/fail grading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpecThreshold {
    pub min_value: f64,
}

impl Default for SpecThreshold {
    fn default() -> Self {
        Self { min_value: 550.0 }
    }
}

/// Why a series left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    UserRequest,
    CapacityEvicted,
    Stale,
}

/// Registry change notification consumed by the presentation adapter.
///
/// `Removed` is the adapter's cue to drop display objects and cancel any
/// per-series timers it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Created { id: String },
    Updated { id: String },
    Removed { id: String, reason: RemovalReason },
}

/// Transient, user-visible session events for the status line.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    ConnectionChanged(ConnectionState),
    CommandSent { summary: String },
    CommandFailed { summary: String, detail: String },
    CalibrationResult { id: String, value: Option<f64> },
    TimerUpdate { seconds: i64 },
    AnnouncementConfig { before: String, after: String },
    RosterNames { names: Vec<String> },
    WindowChanged { duration_ms: i64 },
    SpecChanged { min_value: f64 },
}

/// Eviction/tie-break ordering key for node ids: numeric ids sort
/// numerically, everything else lexicographically after them.
pub fn id_order_key(id: &str) -> (u64, &str) {
    (id.parse::<u64>().unwrap_or(u64::MAX), id)
}
