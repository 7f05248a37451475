//! The trace engine: one owned, long-lived context
//!
//! `TraceEngine` ties the registry, log store, and settings together and is
//! passed (behind `Arc`) to both the control dispatcher and the recorders,
//! replacing the global module state of the original implementation while
//! keeping its single-writer/many-reader discipline: the control domain is
//! the only mutator of registry membership and the only log clearer; the
//! recording domain only reads target state and appends.

use crate::error::TraceError;
use crate::log_store::LogStore;
use crate::params::{ControlSettings, ParamUpdate};
use crate::provider::InstrumentationProvider;
use crate::recorder::Recorder;
use crate::registry::{RegisterOptions, Registry};
use crate::render::{self, LogRecordView};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Capacities fixed at engine construction
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Registry slot count
    pub max_targets: usize,
    /// Log store capacity
    pub log_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_targets: 16,
            log_capacity: 1024,
        }
    }
}

/// State shared between the control and recording domains
pub(crate) struct Core {
    pub(crate) settings: ControlSettings,
    pub(crate) store: LogStore,
    pub(crate) registry: Registry,
    pub(crate) stale_events: AtomicU64,
    epoch: Instant,
}

impl Core {
    /// Monotonic nanoseconds since engine start
    pub(crate) fn elapsed_nanos(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}

/// Trace registry and recording engine
pub struct TraceEngine {
    core: Arc<Core>,
    provider: Arc<dyn InstrumentationProvider>,
}

impl TraceEngine {
    pub fn new(provider: Arc<dyn InstrumentationProvider>, config: EngineConfig) -> Self {
        tracing::info!(
            max_targets = config.max_targets,
            log_capacity = config.log_capacity,
            "trace engine initialized"
        );
        Self {
            core: Arc::new(Core {
                settings: ControlSettings::default(),
                store: LogStore::new(config.log_capacity),
                registry: Registry::new(config.max_targets),
                stale_events: AtomicU64::new(0),
                epoch: Instant::now(),
            }),
            provider,
        }
    }

    pub fn with_defaults(provider: Arc<dyn InstrumentationProvider>) -> Self {
        Self::new(provider, EngineConfig::default())
    }

    /// Register `name` and attach its probe; rolls back on provider failure
    pub fn register(&self, name: &str, options: RegisterOptions) -> Result<(), TraceError> {
        let core = Arc::clone(&self.core);
        self.core
            .registry
            .register(name, options, self.provider.as_ref(), move |target| {
                Recorder::new(core, target)
            })
            .map(|_| ())
    }

    /// Detach and free the attached target named `name`
    pub fn unregister(&self, name: &str) -> Result<(), TraceError> {
        self.core.registry.unregister(name, self.provider.as_ref())
    }

    /// Detach every target and clear the log store
    pub fn reset(&self) {
        self.core.registry.reset(self.provider.as_ref());
        self.core.store.clear();
        tracing::info!("tracer reset");
    }

    /// Decode a control word and merge it into the settings
    pub fn apply_params(&self, word: u32) {
        let update = ParamUpdate::decode(word);
        self.core.settings.apply(&update);
        tracing::debug!(?update, "control parameters applied");
    }

    pub fn settings(&self) -> &ControlSettings {
        &self.core.settings
    }

    pub fn store(&self) -> &LogStore {
        &self.core.store
    }

    pub fn registry(&self) -> &Registry {
        &self.core.registry
    }

    /// Events dropped because their target was unregistered mid-flight
    pub fn stale_events(&self) -> u64 {
        self.core.stale_events.load(Ordering::Relaxed)
    }

    /// Rendered settings and target table
    pub fn dump_settings(&self) -> String {
        render::render_settings(
            &self.core.settings.snapshot(),
            &self.core.registry.snapshot(),
        )
    }

    /// Every stored log line, rendered with the active timestamp format
    pub fn dump_logs(&self) -> Vec<String> {
        render::render_log_range(
            &self.core.store,
            &self.core.registry,
            self.core.settings.timestamp_format(),
            0,
            self.core.store.len(),
        )
    }

    /// Machine-readable resolved log records
    pub fn log_views(&self) -> Vec<LogRecordView> {
        render::log_views(
            &self.core.store,
            &self.core.registry,
            self.core.settings.timestamp_format(),
            0,
            self.core.store.len(),
        )
    }
}

impl Drop for TraceEngine {
    fn drop(&mut self) {
        // module teardown detaches everything it attached
        self.core.registry.reset(self.provider.as_ref());
    }
}

impl std::fmt::Debug for TraceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceEngine")
            .field("registry", &self.core.registry)
            .field("store", &self.core.store)
            .finish()
    }
}
