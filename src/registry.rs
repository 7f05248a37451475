//! Fixed-slot registry of instrumented targets
//!
//! The registry is an arena with stable indices, not a growable collection:
//! hot-path checks and teardown stay allocation-free and a slot index stays
//! valid for the lifetime of an attached target. Each slot carries an atomic
//! state word (`generation << 1 | attached`) that the recording domain reads
//! lock-free; a generation bump on every new occupancy guards against index
//! reuse, so a callback left over from a previous occupant of the slot can
//! be detected and dropped. Slot metadata (name, probe handle) is touched
//! only by the control domain, which is single-caller by the session guard.

use crate::error::TraceError;
use crate::provider::InstrumentationProvider;
use crate::recorder::Recorder;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Longest accepted target name, in bytes
pub const MAX_TARGET_NAME: usize = 64;

/// Stable, reuse-guarded reference to a registry slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetRef {
    pub index: u32,
    pub generation: u32,
}

/// One instrumented function. Immutable once created; shared between the
/// registry slot and the recorder bound into the provider callback.
#[derive(Debug)]
pub struct TargetInfo {
    pub name: String,
    /// Per-target timestamp opt-out, ANDed with the global toggle
    pub record_timestamp: bool,
    pub target_ref: TargetRef,
}

/// Per-target options carried by a Register request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterOptions {
    pub record_timestamp: bool,
}

impl Default for RegisterOptions {
    fn default() -> Self {
        Self {
            record_timestamp: true,
        }
    }
}

/// Row of the settings dump
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSummary {
    pub index: usize,
    pub name: String,
    pub attached: bool,
    pub record_timestamp: bool,
}

struct SlotData {
    info: Arc<TargetInfo>,
    probe: Option<crate::provider::ProbeHandle>,
}

struct Slot {
    /// `generation << 1 | attached`, readable from the recording domain
    state: AtomicU64,
    /// Control-domain-only metadata; kept after detach so already-recorded
    /// entries still render their target name until the slot is reused
    data: Mutex<Option<SlotData>>,
}

fn state_word(generation: u32, attached: bool) -> u64 {
    (u64::from(generation) << 1) | u64::from(attached)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the set of instrumented names and coordinates attach/detach with
/// the instrumentation provider
pub struct Registry {
    slots: Box<[Slot]>,
}

impl Registry {
    pub fn new(max_targets: usize) -> Self {
        assert!(max_targets > 0, "registry needs at least one slot");
        Self {
            slots: (0..max_targets)
                .map(|_| Slot {
                    state: AtomicU64::new(0),
                    data: Mutex::new(None),
                })
                .collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Register `name` and attach a probe for it. A duplicate attached name
    /// fails `AlreadyExists`; a full table fails `CapacityExceeded`; a
    /// provider refusal fails `ProbeInstallFailed` and leaves no partial
    /// target, because the slot is only committed after the attach succeeds.
    pub(crate) fn register(
        &self,
        name: &str,
        options: RegisterOptions,
        provider: &dyn InstrumentationProvider,
        make_recorder: impl FnOnce(Arc<TargetInfo>) -> Recorder,
    ) -> Result<Arc<TargetInfo>, TraceError> {
        validate_name(name)?;

        let mut vacant = None;
        let mut reuse = None;
        for (index, slot) in self.slots.iter().enumerate() {
            let attached = slot.state.load(Ordering::Acquire) & 1 != 0;
            let data = lock(&slot.data);
            match data.as_ref() {
                Some(d) if d.info.name == name && attached => {
                    return Err(TraceError::AlreadyExists(name.to_string()));
                }
                Some(d) if d.info.name == name => {
                    reuse.get_or_insert(index);
                }
                Some(_) if attached => {}
                _ => {
                    vacant.get_or_insert(index);
                }
            }
        }
        let index = reuse
            .or(vacant)
            .ok_or(TraceError::CapacityExceeded(self.slots.len()))?;

        let slot = &self.slots[index];
        let generation = (slot.state.load(Ordering::Acquire) >> 1) as u32 + 1;
        let info = Arc::new(TargetInfo {
            name: name.to_string(),
            record_timestamp: options.record_timestamp,
            target_ref: TargetRef {
                index: index as u32,
                generation,
            },
        });

        let recorder = make_recorder(Arc::clone(&info));
        let handle = provider
            .attach(name, recorder)
            .map_err(|e| TraceError::ProbeInstallFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        *lock(&slot.data) = Some(SlotData {
            info: Arc::clone(&info),
            probe: Some(handle),
        });
        slot.state
            .store(state_word(generation, true), Ordering::Release);
        tracing::info!(target_name = name, index, "probe attached");
        Ok(info)
    }

    /// Detach and free the attached target matching `name` exactly
    pub(crate) fn unregister(
        &self,
        name: &str,
        provider: &dyn InstrumentationProvider,
    ) -> Result<(), TraceError> {
        for slot in self.slots.iter() {
            if slot.state.load(Ordering::Acquire) & 1 == 0 {
                continue;
            }
            let mut data = lock(&slot.data);
            if let Some(d) = data.as_mut() {
                if d.info.name == name {
                    Self::detach_slot(slot, d, provider);
                    return Ok(());
                }
            }
        }
        Err(TraceError::NotFound(name.to_string()))
    }

    /// Detach every attached target. Idempotent; used by the Reset command
    /// and at engine teardown.
    pub(crate) fn reset(&self, provider: &dyn InstrumentationProvider) {
        for slot in self.slots.iter() {
            if slot.state.load(Ordering::Acquire) & 1 == 0 {
                continue;
            }
            let mut data = lock(&slot.data);
            if let Some(d) = data.as_mut() {
                Self::detach_slot(slot, d, provider);
            }
        }
    }

    fn detach_slot(slot: &Slot, data: &mut SlotData, provider: &dyn InstrumentationProvider) {
        let generation = data.info.target_ref.generation;
        // clear the attached bit before detaching so a callback racing the
        // detach sees the target as gone and drops its event
        slot.state
            .store(state_word(generation, false), Ordering::Release);
        if let Some(handle) = data.probe.take() {
            provider.detach(handle);
        }
        tracing::info!(target_name = %data.info.name, "probe detached");
    }

    /// Lock-free hot-path check used by the recorder
    pub fn is_attached(&self, target: TargetRef) -> bool {
        self.slots.get(target.index as usize).is_some_and(|slot| {
            slot.state.load(Ordering::Acquire) == state_word(target.generation, true)
        })
    }

    /// Exact-name lookup among slots that still carry metadata.
    /// O(table size), no allocation beyond the returned `Arc` clone.
    pub fn lookup_by_name(&self, name: &str) -> Option<Arc<TargetInfo>> {
        self.slots.iter().find_map(|slot| {
            let data = lock(&slot.data);
            data.as_ref()
                .filter(|d| d.info.name == name)
                .map(|d| Arc::clone(&d.info))
        })
    }

    /// Generation-checked resolution of a recorded reference; `None` once
    /// the slot has been reused by a newer target
    pub fn resolve(&self, target: TargetRef) -> Option<Arc<TargetInfo>> {
        let slot = self.slots.get(target.index as usize)?;
        let data = lock(&slot.data);
        data.as_ref()
            .filter(|d| d.info.target_ref == target)
            .map(|d| Arc::clone(&d.info))
    }

    /// Rows for the settings dump, in slot order
    pub fn snapshot(&self) -> Vec<TargetSummary> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let attached = slot.state.load(Ordering::Acquire) & 1 != 0;
                let data = lock(&slot.data);
                data.as_ref().map(|d| TargetSummary {
                    index,
                    name: d.info.name.clone(),
                    attached,
                    record_timestamp: d.info.record_timestamp,
                })
            })
            .collect()
    }

    /// Number of currently attached targets
    pub fn attached_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.state.load(Ordering::Acquire) & 1 != 0)
            .count()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("capacity", &self.capacity())
            .field("attached", &self.attached_count())
            .finish()
    }
}

fn validate_name(name: &str) -> Result<(), TraceError> {
    if name.is_empty() {
        return Err(TraceError::PayloadTransferFailed(
            "target name is empty".to_string(),
        ));
    }
    if name.len() > MAX_TARGET_NAME {
        return Err(TraceError::PayloadTransferFailed(format!(
            "target name exceeds {MAX_TARGET_NAME} bytes"
        )));
    }
    Ok(())
}
