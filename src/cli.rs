//! Command-line interface definition

use crate::params::{ParamUpdate, TimestampFormat, TimestampUpdate};
use crate::registry::RegisterOptions;
use clap::{Parser, ValueEnum};

/// Explicit on/off argument for runtime toggles
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn as_bool(self) -> bool {
        matches!(self, Self::On)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    /// Raw sampled time
    Absolute,
    /// Relative to the first stored log
    RelativeFirst,
    /// Relative to the previous stored log
    RelativePrev,
}

impl From<FormatArg> for TimestampFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Absolute => Self::Absolute,
            FormatArg::RelativeFirst => Self::RelativeToFirst,
            FormatArg::RelativePrev => Self::RelativeToPrevious,
        }
    }
}

/// Output format for log dumps
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "rastro",
    about = "Dynamic function entry/exit tracer with a bounded in-memory log",
    version
)]
pub struct Cli {
    /// Register a function for tracing (repeatable)
    #[arg(short = 'A', long = "add", value_name = "FUNC")]
    pub add: Vec<String>,

    /// Unregister a traced function (repeatable)
    #[arg(short = 'D', long = "delete", value_name = "FUNC")]
    pub delete: Vec<String>,

    /// Unregister every function and clear the stored logs
    #[arg(short = 'R', long = "reset")]
    pub reset: bool,

    /// Enable the logger
    #[arg(short = 'e', long = "enable-logger", conflicts_with = "disable_logger")]
    pub enable_logger: bool,

    /// Disable the logger
    #[arg(short = 'd', long = "disable-logger")]
    pub disable_logger: bool,

    /// Print each log line as it is recorded
    #[arg(long = "eager-print", value_name = "ON|OFF")]
    pub eager_print: Option<Toggle>,

    /// Record timestamps on new log entries
    #[arg(long = "timestamp", value_name = "ON|OFF")]
    pub timestamp: Option<Toggle>,

    /// Timestamp display format (travels with --timestamp)
    #[arg(long = "ts-format", value_name = "FORMAT", requires = "timestamp")]
    pub ts_format: Option<FormatArg>,

    /// Register added functions without per-entry timestamps
    #[arg(short = 'n', long = "no-record-timestamp")]
    pub no_record_timestamp: bool,

    /// Fire sample entry/exit events for a registered function (repeatable)
    #[arg(short = 's', long = "sample", value_name = "FUNC")]
    pub sample: Vec<String>,

    /// Number of sample calls to fire per --sample function
    #[arg(long = "sample-count", value_name = "N", default_value_t = 1)]
    pub sample_count: usize,

    /// Dump the current settings and registered functions
    #[arg(short = 'p', long = "settings")]
    pub settings: bool,

    /// Dump the stored logs
    #[arg(short = 'L', long = "logs")]
    pub logs: bool,

    /// Output format for --logs
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Maximum number of registered functions
    #[arg(long = "max-targets", value_name = "N", default_value_t = 16)]
    pub max_targets: usize,

    /// Capacity of the in-memory log store
    #[arg(long = "log-capacity", value_name = "N", default_value_t = 1024)]
    pub log_capacity: usize,
}

impl Cli {
    /// True if the invocation asks for at least one operation
    pub fn has_action(&self) -> bool {
        !self.add.is_empty()
            || !self.delete.is_empty()
            || self.reset
            || self.enable_logger
            || self.disable_logger
            || self.eager_print.is_some()
            || self.timestamp.is_some()
            || !self.sample.is_empty()
            || self.settings
            || self.logs
    }

    /// Fold the toggle flags into one control-parameter update
    pub fn param_update(&self) -> ParamUpdate {
        let logging = if self.enable_logger {
            Some(true)
        } else if self.disable_logger {
            Some(false)
        } else {
            None
        };
        let timestamp = self.timestamp.map(|t| TimestampUpdate {
            enabled: t.as_bool(),
            format: self
                .ts_format
                .map(TimestampFormat::from)
                .unwrap_or(TimestampFormat::Absolute),
        });
        ParamUpdate {
            logging,
            eager_print: self.eager_print.map(Toggle::as_bool),
            timestamp,
        }
    }

    /// Options applied to every function named by --add
    pub fn register_options(&self) -> RegisterOptions {
        RegisterOptions {
            record_timestamp: !self.no_record_timestamp,
        }
    }
}
