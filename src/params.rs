//! Control-parameter codec and runtime settings
//!
//! A single packed `u32` word carries any subset of the runtime toggles so
//! one SetParams request can change one, several, or none of them. Each
//! boolean field occupies 2 bits: an update bit (apply this field at all)
//! and a value bit (the new setting). The timestamp format occupies a
//! separate 2-bit field that is interpreted only when the timestamp update
//! bit is set, so the format always travels together with the timestamp
//! toggle.
//!
//! ```text
//!      3                   2                   1                   0
//!    1 0 9 8 7 6 5 4 3 2 1 0 9 8 7 6 5 4 3 2 1 0 9 8 7 6 5 4 3 2 1 0
//!   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!   | F |                                               | C | B | A |
//!   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!   A: logger        B: eager print   C: timestamp   F: timestamp format
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

const UPDATE_BIT: u32 = 0b10;
const VALUE_BIT: u32 = 0b01;

const LOGGER_SHIFT: u32 = 0;
const EAGER_SHIFT: u32 = 2;
const TIMESTAMP_SHIFT: u32 = 4;
const FORMAT_SHIFT: u32 = 30;

/// How a stored timestamp is displayed when rendering logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampFormat {
    /// Raw sampled time
    Absolute,
    /// Sampled time minus the first entry's sampled time
    RelativeToFirst,
    /// Sampled time minus the previous entry's sampled time
    RelativeToPrevious,
}

impl TimestampFormat {
    fn from_bits(bits: u32) -> Option<Self> {
        match bits & 0b11 {
            0b00 => Some(Self::Absolute),
            0b01 => Some(Self::RelativeToFirst),
            0b10 => Some(Self::RelativeToPrevious),
            _ => None,
        }
    }

    fn as_bits(self) -> u32 {
        match self {
            Self::Absolute => 0b00,
            Self::RelativeToFirst => 0b01,
            Self::RelativeToPrevious => 0b10,
        }
    }

    /// Human-readable name used by the settings dump
    pub fn label(self) -> &'static str {
        match self {
            Self::Absolute => "Absolute time",
            Self::RelativeToFirst => "Relative time from the first log",
            Self::RelativeToPrevious => "Relative time from the previous log",
        }
    }
}

/// Timestamp toggle plus the format that rides on its update bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampUpdate {
    pub enabled: bool,
    pub format: TimestampFormat,
}

/// A decoded control word: `None` means "keep the current setting"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParamUpdate {
    pub logging: Option<bool>,
    pub eager_print: Option<bool>,
    pub timestamp: Option<TimestampUpdate>,
}

impl ParamUpdate {
    /// True if this update touches no field at all
    pub fn is_noop(&self) -> bool {
        self.logging.is_none() && self.eager_print.is_none() && self.timestamp.is_none()
    }

    /// Pack this update into a control word
    pub fn encode(&self) -> u32 {
        let mut word = 0u32;
        if let Some(v) = self.logging {
            word |= encode_field(v, LOGGER_SHIFT);
        }
        if let Some(v) = self.eager_print {
            word |= encode_field(v, EAGER_SHIFT);
        }
        if let Some(ts) = self.timestamp {
            word |= encode_field(ts.enabled, TIMESTAMP_SHIFT);
            word |= ts.format.as_bits() << FORMAT_SHIFT;
        }
        word
    }

    /// Unpack a control word. Never fails: fields with a clear update bit
    /// come back as `None`, and unknown format bits fall back to `Absolute`.
    pub fn decode(word: u32) -> Self {
        let timestamp = decode_field(word, TIMESTAMP_SHIFT).map(|enabled| {
            let bits = word >> FORMAT_SHIFT;
            let format = TimestampFormat::from_bits(bits).unwrap_or_else(|| {
                tracing::debug!(bits = bits & 0b11, "unknown timestamp format bits");
                TimestampFormat::Absolute
            });
            TimestampUpdate { enabled, format }
        });
        Self {
            logging: decode_field(word, LOGGER_SHIFT),
            eager_print: decode_field(word, EAGER_SHIFT),
            timestamp,
        }
    }
}

fn encode_field(value: bool, shift: u32) -> u32 {
    (UPDATE_BIT | u32::from(value)) << shift
}

fn decode_field(word: u32, shift: u32) -> Option<bool> {
    if (word >> shift) & UPDATE_BIT != 0 {
        Some((word >> shift) & VALUE_BIT != 0)
    } else {
        None
    }
}

/// Process-wide runtime settings, read lock-free from the recording domain
/// and mutated only by SetParams on the control domain.
#[derive(Debug)]
pub struct ControlSettings {
    logging: AtomicBool,
    eager_print: AtomicBool,
    timestamp: AtomicBool,
    format: AtomicU8,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            logging: AtomicBool::new(false),
            eager_print: AtomicBool::new(false),
            timestamp: AtomicBool::new(true),
            format: AtomicU8::new(TimestampFormat::Absolute.as_bits() as u8),
        }
    }
}

impl ControlSettings {
    pub fn logging_enabled(&self) -> bool {
        self.logging.load(Ordering::Relaxed)
    }

    pub fn eager_print_enabled(&self) -> bool {
        self.eager_print.load(Ordering::Relaxed)
    }

    pub fn timestamp_enabled(&self) -> bool {
        self.timestamp.load(Ordering::Relaxed)
    }

    pub fn timestamp_format(&self) -> TimestampFormat {
        TimestampFormat::from_bits(self.format.load(Ordering::Relaxed) as u32)
            .unwrap_or(TimestampFormat::Absolute)
    }

    /// Merge the present fields of `update`, leaving absent fields untouched
    pub fn apply(&self, update: &ParamUpdate) {
        if let Some(v) = update.logging {
            self.logging.store(v, Ordering::Relaxed);
        }
        if let Some(v) = update.eager_print {
            self.eager_print.store(v, Ordering::Relaxed);
        }
        if let Some(ts) = update.timestamp {
            self.timestamp.store(ts.enabled, Ordering::Relaxed);
            self.format.store(ts.format.as_bits() as u8, Ordering::Relaxed);
        }
    }

    /// Point-in-time copy for rendering
    pub fn snapshot(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            logging: self.logging_enabled(),
            eager_print: self.eager_print_enabled(),
            timestamp: self.timestamp_enabled(),
            format: self.timestamp_format(),
        }
    }
}

/// Immutable view of the settings at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SettingsSnapshot {
    pub logging: bool,
    pub eager_print: bool,
    pub timestamp: bool,
    pub format: TimestampFormat,
}
