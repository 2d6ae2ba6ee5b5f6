//! # Kiosk session core
//!
//! In-memory state for a long-lived display session fed by a live stream of
//! node readings:
//!
//! 1. Decoded frames arrive from the connection manager (in arrival order)
//! 2. The registry resolves each node id to a bounded Series
//! 3. The sliding window buffer appends and trims sample history
//! 4. The aggregator recomputes 5 s / full-window stats on the redraw tick
//! 5. The presentation adapter consumes snapshots and change notifications
//!
//! Raw readings are never persisted; the window bound keeps the memory
//! footprint constant no matter how long the session runs.
//!
//! ## Module organization
//!
//! - `types` - Core data structures (Sample, Series, WindowSpec, events)
//! - `registry` - Per-node series registry with eviction and stale sweep
//! - `window` - Rolling window buffer operations
//! - `aggregate` - Windowed stats and spec grading
//! - `engine` - Single-owner orchestration and display snapshots

pub mod aggregate;
pub mod engine;
pub mod registry;
pub mod types;
pub mod window;

// Re-export commonly used types
pub use aggregate::{classify, SpecVerdict, WindowStats, NEAR_MISS_BAND, SHORT_WINDOW_MS};
pub use engine::{SeriesReport, SessionEngine};
pub use registry::SeriesRegistry;
pub use types::{
    ConnectionState, RegistryEvent, RemovalReason, Sample, SampleValue, Series, SpecThreshold,
    StatusEvent, WindowSpec,
};
pub use window::RollingWindow;
