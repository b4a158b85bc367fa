//! Progress reporting. The runner emits one event per persisted result; the console layer
//! consumes them through a sink.

use std::sync::Arc;

/// One progress update for a run. `total` is unknown while a mission is still going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub run_id: String,
    pub completed: u32,
    pub total: Option<u32>,
}

/// Sink for progress events. Implementations may throttle.
pub type ProgressSink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;
