//! # Analytics Sink
//!
//! Fire-and-forget event emission. The flow reports what happened
//! (`asset_selected`, `validation_rejected`, `flow_completed`, ...) with a
//! property bag; the sink does whatever it does with that. Emission is
//! infallible by signature — a sink that fails internally logs and moves
//! on, and the purchase flow never notices.
//!
//! Sinks are constructor-injected with an explicit lifecycle (created with
//! the controller, dropped with it). No ambient module-level buffers.

use parking_lot::Mutex;
use serde_json::Value;

/// Bound on [`MemorySink`]'s buffer. Oldest events are dropped first.
const MEMORY_SINK_CAPACITY: usize = 256;

/// A destination for flow events.
pub trait AnalyticsSink: Send + Sync {
    /// Record one event with its property bag. Must not block and must not
    /// fail observably.
    fn record(&self, event: &str, properties: Value);
}

// ---------------------------------------------------------------------------
// Tracing Sink
// ---------------------------------------------------------------------------

/// Emits events as structured `tracing` records at `info` level.
///
/// The default sink: in production the log pipeline is the analytics
/// transport, and in development you just see the events scroll by.
#[derive(Debug, Default)]
pub struct TracingSink;

impl AnalyticsSink for TracingSink {
    fn record(&self, event: &str, properties: Value) {
        tracing::info!(target: "parcel_flow::analytics", event, %properties, "flow event");
    }
}

// ---------------------------------------------------------------------------
// Memory Sink
// ---------------------------------------------------------------------------

/// A recorded event, as held by [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    /// Event name.
    pub event: String,
    /// Property bag as passed to `record`.
    pub properties: Value,
}

/// Buffers events in memory, bounded, oldest-first eviction.
///
/// Used by tests to assert emission counts and by the CLI to dump a flow's
/// event trail at the end of a run.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<RecordedEvent>>,
}

impl MemorySink {
    /// A new, empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the buffered events, oldest first.
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    /// Number of buffered events with the given name.
    pub fn count(&self, event: &str) -> usize {
        self.events.lock().iter().filter(|e| e.event == event).count()
    }
}

impl AnalyticsSink for MemorySink {
    fn record(&self, event: &str, properties: Value) {
        let mut events = self.events.lock();
        if events.len() >= MEMORY_SINK_CAPACITY {
            events.remove(0);
        }
        events.push(RecordedEvent {
            event: event.to_string(),
            properties,
        });
    }
}
