//! Entry/exit callback logic — the recording domain
//!
//! One `Recorder` per attached target, cloned into the provider at attach
//! time. The firing identity is pre-resolved: the recorder already holds its
//! target's metadata, so the hot path does no name lookup, takes no lock,
//! and allocates nothing. Recording errors are counted and logged, never
//! raised into the observed program.

use crate::engine::Core;
use crate::log_store::{EventKind, LogEntry};
use crate::registry::TargetInfo;
use crate::render;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Callback object invoked by the instrumentation provider on every entry
/// and exit of one probed function
#[derive(Clone)]
pub struct Recorder {
    core: Arc<Core>,
    target: Arc<TargetInfo>,
}

impl Recorder {
    pub(crate) fn new(core: Arc<Core>, target: Arc<TargetInfo>) -> Self {
        Self { core, target }
    }

    /// The probed function was entered
    pub fn enter(&self) {
        self.record(EventKind::Enter);
    }

    /// The probed function returned
    pub fn exit(&self) {
        self.record(EventKind::Exit);
    }

    fn record(&self, kind: EventKind) {
        let core = &self.core;
        if !core.settings.logging_enabled() {
            return;
        }
        // a concurrent unregister may have raced in; late events for a
        // detached (or reused) slot are dropped, fail-closed
        if !core.registry.is_attached(self.target.target_ref) {
            core.stale_events.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(target_name = %self.target.name, "event for detached target dropped");
            return;
        }
        let timestamp = (core.settings.timestamp_enabled() && self.target.record_timestamp)
            .then(|| core.elapsed_nanos());
        let entry = LogEntry {
            timestamp,
            target: self.target.target_ref,
            kind,
        };
        match core.store.append(entry) {
            Ok(index) => {
                if core.settings.eager_print_enabled() {
                    // renders synchronously inside the traced call; opt-in
                    // latency the operator accepted by enabling eager print
                    let format = core.settings.timestamp_format();
                    if let Some(line) =
                        render::render_entry(&core.store, &core.registry, format, index)
                    {
                        println!("{line}");
                    }
                }
            }
            Err(_) => {
                tracing::debug!(target_name = %self.target.name, "log store full, event dropped");
            }
        }
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("target", &self.target.name)
            .finish()
    }
}
