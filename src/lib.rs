//! rastro - dynamic function entry/exit tracer
//!
//! Registers functions by name with a pluggable instrumentation provider,
//! records their entry and return events into a bounded lock-free log store,
//! and serves control commands (register, reset, set-params, dumps) through
//! a single-occupancy control channel.
//!
//! The recording hot path takes no locks and allocates nothing: runtime
//! toggles are atomics, target identity is pre-resolved at attach time, and
//! the store rejects appends once full instead of blocking or evicting.

pub mod cli;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod log_store;
pub mod params;
pub mod provider;
pub mod recorder;
pub mod registry;
pub mod render;
