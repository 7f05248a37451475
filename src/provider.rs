//! Instrumentation provider seam
//!
//! The mechanism that intercepts a call by symbolic name is a privileged,
//! environment-specific capability (a kretprobe-style facility in the
//! original deployment). The engine consumes it through this trait only: it
//! asks for a probe to be installed with entry/exit callbacks and gets back
//! an opaque handle it can later detach. Nothing here assumes how the
//! interception works, only that the provider delivers entry/exit
//! notifications with bounded, allocation-free overhead.

use crate::log_store::EventKind;
use crate::recorder::Recorder;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Opaque, provider-owned identifier for one installed probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeHandle(pub u64);

/// Why a probe could not be installed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttachError {
    #[error("symbol '{0}' not found")]
    SymbolNotFound(String),
    #[error("provider rejected probe: {0}")]
    Rejected(String),
}

/// Host capability that installs and removes probes.
///
/// The provider invokes the supplied [`Recorder`] once on every entry and
/// once on every exit of the probed function, possibly concurrently across
/// calls and from execution contexts that must never block.
pub trait InstrumentationProvider: Send + Sync {
    fn attach(&self, symbol: &str, recorder: Recorder) -> Result<ProbeHandle, AttachError>;
    fn detach(&self, handle: ProbeHandle);
}

struct ManualProbe {
    symbol: String,
    recorder: Recorder,
}

/// In-process provider that fires events on demand.
///
/// Stands in for the privileged interception capability in tests and in the
/// CLI's `--sample` mode, the way the original module's debug build exposed
/// a sample function to generate traffic.
#[derive(Default)]
pub struct ManualProvider {
    probes: Mutex<HashMap<u64, ManualProbe>>,
    next_handle: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ManualProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire one event for the probe attached to `symbol`.
    /// Returns false if no such probe is installed.
    pub fn fire(&self, symbol: &str, kind: EventKind) -> bool {
        // clone the recorder out of the lock so the callback itself runs
        // unlocked, like a real provider would invoke it
        let recorder = lock(&self.probes)
            .values()
            .find(|p| p.symbol == symbol)
            .map(|p| p.recorder.clone());
        match recorder {
            Some(recorder) => {
                match kind {
                    EventKind::Enter => recorder.enter(),
                    EventKind::Exit => recorder.exit(),
                }
                true
            }
            None => false,
        }
    }

    /// Fire a full enter-then-exit pair for `symbol`
    pub fn fire_call(&self, symbol: &str) -> bool {
        self.fire(symbol, EventKind::Enter) && self.fire(symbol, EventKind::Exit)
    }

    /// Number of probes currently installed
    pub fn probe_count(&self) -> usize {
        lock(&self.probes).len()
    }
}

impl InstrumentationProvider for ManualProvider {
    fn attach(&self, symbol: &str, recorder: Recorder) -> Result<ProbeHandle, AttachError> {
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        lock(&self.probes).insert(
            id,
            ManualProbe {
                symbol: symbol.to_string(),
                recorder,
            },
        );
        Ok(ProbeHandle(id))
    }

    fn detach(&self, handle: ProbeHandle) {
        lock(&self.probes).remove(&handle.0);
    }
}
