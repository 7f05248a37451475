//! Text rendering of settings and stored logs
//!
//! Line layouts follow the original dump format: a fixed-width timestamp
//! prefix (when the entry carries one), a 1-based sequence number, the
//! event marker (`e` entry / `r` return), and the target name. Relative
//! formats subtract the first or previous entry's sampled time; the very
//! first entry has no predecessor and displays 0.

use crate::log_store::{EventKind, LogEntry, LogStore};
use crate::params::{SettingsSnapshot, TimestampFormat};
use crate::registry::{Registry, TargetSummary};
use serde::Serialize;
use std::fmt::Write;

fn enable_disable(on: bool) -> &'static str {
    if on {
        "Enable"
    } else {
        "Disable"
    }
}

/// Current settings plus every known target with its attachment flag
pub fn render_settings(settings: &SettingsSnapshot, targets: &[TargetSummary]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Logger        : {}", enable_disable(settings.logging));
    let _ = writeln!(
        out,
        "Eager print   : {}",
        enable_disable(settings.eager_print)
    );
    let _ = writeln!(out, "Timestamp     : {}", enable_disable(settings.timestamp));
    let _ = writeln!(out, "Timestamp fmt : {}", settings.format.label());
    let _ = writeln!(out, "[Indx] [Reg] function_name");
    for target in targets {
        let _ = writeln!(
            out,
            "[{:>4}] [ {} ] {}",
            target.index,
            if target.attached { 'Y' } else { 'N' },
            target.name
        );
    }
    out
}

/// Timestamp to display for the entry at `index`, per `format`
fn display_timestamp(
    store: &LogStore,
    format: TimestampFormat,
    index: usize,
    entry: &LogEntry,
) -> Option<u64> {
    let sampled = entry.timestamp?;
    let base = match format {
        TimestampFormat::Absolute => return Some(sampled),
        TimestampFormat::RelativeToFirst => store.get(0).and_then(|e| e.timestamp),
        TimestampFormat::RelativeToPrevious => {
            if index == 0 {
                // no predecessor: relative to itself, i.e. 0
                Some(sampled)
            } else {
                store.get(index - 1).and_then(|e| e.timestamp)
            }
        }
    };
    Some(sampled.saturating_sub(base.unwrap_or(sampled)))
}

fn target_name(registry: &Registry, entry: &LogEntry) -> String {
    registry
        .resolve(entry.target)
        .map(|info| info.name.clone())
        .unwrap_or_else(|| "?".to_string())
}

/// Render the single entry at `index`, used for both eager print and dumps
pub fn render_entry(
    store: &LogStore,
    registry: &Registry,
    format: TimestampFormat,
    index: usize,
) -> Option<String> {
    let entry = store.get(index)?;
    let mut line = String::new();
    if let Some(ts) = display_timestamp(store, format, index, &entry) {
        let _ = write!(line, "[{ts:>20} nsec] ");
    }
    let _ = write!(
        line,
        "[{}] {} {}",
        index + 1,
        entry.kind.marker(),
        target_name(registry, &entry)
    );
    Some(line)
}

/// Render `[start, start + limit)`, clamped to the stored range
pub fn render_log_range(
    store: &LogStore,
    registry: &Registry,
    format: TimestampFormat,
    start: usize,
    limit: usize,
) -> Vec<String> {
    store
        .iter(start, limit)
        .filter_map(|(index, _)| render_entry(store, registry, format, index))
        .collect()
}

/// Machine-readable resolved log record
#[derive(Debug, Clone, Serialize)]
pub struct LogRecordView {
    /// 1-based sequence number
    pub seq: usize,
    /// Displayed timestamp per the active format, nanoseconds
    pub timestamp_nsec: Option<u64>,
    pub kind: EventKind,
    pub target: String,
}

/// Resolved records for JSON output
pub fn log_views(
    store: &LogStore,
    registry: &Registry,
    format: TimestampFormat,
    start: usize,
    limit: usize,
) -> Vec<LogRecordView> {
    store
        .iter(start, limit)
        .map(|(index, entry)| LogRecordView {
            seq: index + 1,
            timestamp_nsec: display_timestamp(store, format, index, &entry),
            kind: entry.kind,
            target: target_name(registry, &entry),
        })
        .collect()
}
