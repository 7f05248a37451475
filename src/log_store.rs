//! Bounded, append-only store of recorded events — the hot path
//!
//! The recording domain appends concurrently from arbitrary execution
//! contexts and must never block, sleep, or allocate, while the control
//! domain reads ranges out for rendering and is the only one that clears.
//!
//! Appends reserve an index with a saturating atomic counter and then
//! publish the written slot with a release store, so `count` can never
//! exceed `capacity` and a reader only ever observes fully written entries.
//! Once the store is full further appends fail closed: the rejected entry is
//! dropped and everything already stored stays intact until an explicit
//! `clear`.

use crate::error::TraceError;
use crate::registry::TargetRef;
use crossbeam::utils::CachePadded;
use serde::Serialize;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// Whether an event marks a call beginning or ending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Enter,
    Exit,
}

impl EventKind {
    /// Single-character marker used in rendered log lines
    pub fn marker(self) -> char {
        match self {
            Self::Enter => 'e',
            Self::Exit => 'r',
        }
    }
}

/// One recorded entry/exit event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogEntry {
    /// Monotonic nanoseconds since engine start, present only if
    /// timestamping was enabled at record time
    pub timestamp: Option<u64>,
    /// Generation-guarded reference to the firing target
    pub target: TargetRef,
    pub kind: EventKind,
}

/// Fixed-capacity ordered sequence of [`LogEntry`]
pub struct LogStore {
    slots: Box<[UnsafeCell<MaybeUninit<LogEntry>>]>,
    published: Box<[AtomicBool]>,
    /// Next free index; saturates at capacity instead of wrapping
    reserved: CachePadded<AtomicUsize>,
    total_appended: AtomicU64,
    total_rejected: AtomicU64,
}

// Safety: a slot is written exactly once between a successful index
// reservation and the release store of its `published` flag; readers only
// dereference a slot after an acquire load observes the flag. `clear` is
// restricted to the control domain (single caller, see the session guard).
unsafe impl Send for LogStore {}
unsafe impl Sync for LogStore {}

impl LogStore {
    /// Create a store with a fixed capacity. Panics if capacity is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "log store capacity must be > 0");
        Self {
            slots: (0..capacity)
                .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
                .collect(),
            published: (0..capacity).map(|_| AtomicBool::new(false)).collect(),
            reserved: CachePadded::new(AtomicUsize::new(0)),
            total_appended: AtomicU64::new(0),
            total_rejected: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of entries currently held, `0 ..= capacity`
    pub fn len(&self) -> usize {
        self.reserved.load(Ordering::Acquire).min(self.capacity())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append one entry. O(1), lock-free, allocation-free. Fails closed
    /// with [`TraceError::LogStoreFull`] once `len() == capacity()`;
    /// already-stored entries are never evicted or overwritten.
    pub fn append(&self, entry: LogEntry) -> Result<usize, TraceError> {
        let capacity = self.capacity();
        let reserve = self
            .reserved
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                if n < capacity {
                    Some(n + 1)
                } else {
                    None
                }
            });
        let Ok(index) = reserve else {
            self.total_rejected.fetch_add(1, Ordering::Relaxed);
            return Err(TraceError::LogStoreFull);
        };
        // Safety: the reservation above hands out `index` to this appender
        // only, and the slot is unpublished until the store below.
        unsafe {
            (*self.slots[index].get()).write(entry);
        }
        self.published[index].store(true, Ordering::Release);
        self.total_appended.fetch_add(1, Ordering::Relaxed);
        Ok(index)
    }

    /// Read the entry at `index`, if it has been published
    pub fn get(&self, index: usize) -> Option<LogEntry> {
        if index >= self.len() || !self.published[index].load(Ordering::Acquire) {
            return None;
        }
        // Safety: the acquire load above synchronizes with the release
        // store in `append`, so the slot is fully written.
        Some(unsafe { (*self.slots[index].get()).assume_init() })
    }

    /// Lazy, finite, restartable walk over `[start, start + limit)`,
    /// silently clamped to the valid range. `start >= len()` yields nothing.
    pub fn iter(&self, start: usize, limit: usize) -> impl Iterator<Item = (usize, LogEntry)> + '_ {
        let end = start.saturating_add(limit).min(self.len());
        let start = start.min(end);
        (start..end).filter_map(|i| self.get(i).map(|e| (i, e)))
    }

    /// Reset `len` to 0. Old entries become unreachable; memory is not
    /// zeroed. Control-domain only; an append racing with a clear lands in
    /// the cleared log, the same benign race the Reset command always had.
    pub fn clear(&self) {
        self.reserved.store(0, Ordering::SeqCst);
        for flag in self.published.iter() {
            flag.store(false, Ordering::SeqCst);
        }
    }

    /// Lifetime counters: (appended, rejected)
    pub fn totals(&self) -> (u64, u64) {
        (
            self.total_appended.load(Ordering::Relaxed),
            self.total_rejected.load(Ordering::Relaxed),
        )
    }
}

impl std::fmt::Debug for LogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStore")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(timestamp: u64) -> LogEntry {
        LogEntry {
            timestamp: Some(timestamp),
            target: TargetRef {
                index: 0,
                generation: 1,
            },
            kind: EventKind::Enter,
        }
    }

    #[test]
    fn test_append_and_get() {
        let store = LogStore::new(4);
        assert_eq!(store.append(entry(10)), Ok(0));
        assert_eq!(store.append(entry(20)), Ok(1));
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(0).unwrap().timestamp, Some(10));
        assert_eq!(store.get(1).unwrap().timestamp, Some(20));
        assert_eq!(store.get(2), None);
    }

    #[test]
    fn test_full_store_rejects_without_losing_entries() {
        let store = LogStore::new(2);
        store.append(entry(1)).unwrap();
        store.append(entry(2)).unwrap();
        assert_eq!(store.append(entry(3)), Err(TraceError::LogStoreFull));
        assert_eq!(store.append(entry(4)), Err(TraceError::LogStoreFull));
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(0).unwrap().timestamp, Some(1));
        assert_eq!(store.get(1).unwrap().timestamp, Some(2));
        assert_eq!(store.totals(), (2, 2));
    }

    #[test]
    fn test_iter_clamps_out_of_range_requests() {
        let store = LogStore::new(8);
        for i in 0..3 {
            store.append(entry(i)).unwrap();
        }
        let all: Vec<_> = store.iter(0, usize::MAX).collect();
        assert_eq!(all.len(), 3);
        let tail: Vec<_> = store.iter(2, 10).collect();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].0, 2);
        assert_eq!(store.iter(3, 10).count(), 0);
        assert_eq!(store.iter(100, 10).count(), 0);
    }

    #[test]
    fn test_iter_is_restartable() {
        let store = LogStore::new(8);
        for i in 0..4 {
            store.append(entry(i)).unwrap();
        }
        assert_eq!(store.iter(0, 4).count(), 4);
        assert_eq!(store.iter(0, 4).count(), 4);
    }

    #[test]
    fn test_clear_resets_len() {
        let store = LogStore::new(4);
        store.append(entry(1)).unwrap();
        store.append(entry(2)).unwrap();
        store.clear();
        assert_eq!(store.len(), 0);
        assert_eq!(store.get(0), None);
        // store is usable again after a clear
        assert_eq!(store.append(entry(3)), Ok(0));
        assert_eq!(store.get(0).unwrap().timestamp, Some(3));
    }

    #[test]
    #[should_panic(expected = "log store capacity must be > 0")]
    fn test_zero_capacity_panics() {
        let _ = LogStore::new(0);
    }

    #[test]
    fn test_concurrent_appends_never_exceed_capacity() {
        use std::sync::Arc;

        let store = Arc::new(LogStore::new(64));
        let mut handles = Vec::new();
        for t in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                for i in 0..32 {
                    let _ = store.append(entry((t * 100 + i) as u64));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 64);
        let (appended, rejected) = store.totals();
        assert_eq!(appended, 64);
        assert_eq!(appended + rejected, 8 * 32);
        // every reserved slot is published once the appenders are done
        assert_eq!(store.iter(0, usize::MAX).count(), 64);
    }
}
