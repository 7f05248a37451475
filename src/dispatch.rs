//! Control channel: wire decode, session guard, command dispatch
//!
//! A control request arrives as a raw command code plus an untyped byte
//! payload (an ioctl-shaped transport in the original deployment). Decoding
//! happens before any state mutation: an unknown code fails
//! `InvalidCommand`, a malformed payload fails `PayloadTransferFailed`.
//!
//! The channel is single-occupancy: `open` flips an atomic flag and a second
//! concurrent opener fails `SessionBusy` immediately — a reject, never a
//! queue. Dropping the session always releases the channel.

use crate::engine::TraceEngine;
use crate::error::TraceError;
use crate::registry::{RegisterOptions, MAX_TARGET_NAME};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const CMD_TARGET_CONFIG: u32 = 1;
pub const CMD_RESET: u32 = 2;
pub const CMD_SET_PARAMS: u32 = 3;
pub const CMD_DUMP_SETTINGS: u32 = 4;
pub const CMD_DUMP_LOGS: u32 = 5;

/// NUL-padded name field + register flag + per-target timestamp flag
pub const TARGET_CONFIG_LEN: usize = MAX_TARGET_NAME + 2;

/// A decoded control command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRequest {
    Register {
        name: String,
        options: RegisterOptions,
    },
    Unregister {
        name: String,
    },
    Reset,
    SetParams(u32),
    DumpSettings,
    DumpLogs,
}

impl ControlRequest {
    /// Decode a raw command code and payload. No state is touched here, so
    /// a failure leaves the engine exactly as it was.
    pub fn decode(code: u32, payload: &[u8]) -> Result<Self, TraceError> {
        match code {
            CMD_TARGET_CONFIG => {
                if payload.len() != TARGET_CONFIG_LEN {
                    return Err(TraceError::PayloadTransferFailed(format!(
                        "target config payload must be {TARGET_CONFIG_LEN} bytes, got {}",
                        payload.len()
                    )));
                }
                let raw_name = &payload[..MAX_TARGET_NAME];
                let end = raw_name
                    .iter()
                    .position(|&b| b == 0)
                    .unwrap_or(MAX_TARGET_NAME);
                let name = std::str::from_utf8(&raw_name[..end])
                    .map_err(|_| {
                        TraceError::PayloadTransferFailed(
                            "target name is not valid UTF-8".to_string(),
                        )
                    })?
                    .to_string();
                if name.is_empty() {
                    return Err(TraceError::PayloadTransferFailed(
                        "target name is empty".to_string(),
                    ));
                }
                let register = payload[MAX_TARGET_NAME] != 0;
                let record_timestamp = payload[MAX_TARGET_NAME + 1] != 0;
                Ok(if register {
                    Self::Register {
                        name,
                        options: RegisterOptions { record_timestamp },
                    }
                } else {
                    Self::Unregister { name }
                })
            }
            CMD_RESET => Ok(Self::Reset),
            CMD_SET_PARAMS => {
                let bytes: [u8; 4] = payload.try_into().map_err(|_| {
                    TraceError::PayloadTransferFailed(format!(
                        "set-params payload must be 4 bytes, got {}",
                        payload.len()
                    ))
                })?;
                Ok(Self::SetParams(u32::from_le_bytes(bytes)))
            }
            CMD_DUMP_SETTINGS => Ok(Self::DumpSettings),
            CMD_DUMP_LOGS => Ok(Self::DumpLogs),
            other => Err(TraceError::InvalidCommand(other)),
        }
    }

    /// Encode a target-config payload (the inverse of `decode` for
    /// `CMD_TARGET_CONFIG`), for transports and tests
    pub fn encode_target_config(
        name: &str,
        register: bool,
        record_timestamp: bool,
    ) -> Result<[u8; TARGET_CONFIG_LEN], TraceError> {
        if name.is_empty() || name.len() > MAX_TARGET_NAME {
            return Err(TraceError::PayloadTransferFailed(format!(
                "target name must be 1..={MAX_TARGET_NAME} bytes"
            )));
        }
        let mut payload = [0u8; TARGET_CONFIG_LEN];
        payload[..name.len()].copy_from_slice(name.as_bytes());
        payload[MAX_TARGET_NAME] = u8::from(register);
        payload[MAX_TARGET_NAME + 1] = u8::from(record_timestamp);
        Ok(payload)
    }
}

/// What a command produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlResponse {
    Done,
    Text(String),
}

/// Single-occupancy access point for control requests
pub struct ControlChannel {
    engine: Arc<TraceEngine>,
    available: AtomicBool,
}

impl ControlChannel {
    pub fn new(engine: Arc<TraceEngine>) -> Self {
        Self {
            engine,
            available: AtomicBool::new(true),
        }
    }

    /// Acquire the channel. Fails `SessionBusy` immediately if another
    /// session is open; never waits.
    pub fn open(&self) -> Result<Session<'_>, TraceError> {
        if self
            .available
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("control channel busy");
            return Err(TraceError::SessionBusy);
        }
        tracing::debug!("control channel opened");
        Ok(Session { channel: self })
    }

    pub fn engine(&self) -> &Arc<TraceEngine> {
        &self.engine
    }
}

impl std::fmt::Debug for ControlChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlChannel")
            .field("available", &self.available.load(Ordering::Relaxed))
            .finish()
    }
}

/// An open control session; dropping it releases the channel
#[derive(Debug)]
pub struct Session<'a> {
    channel: &'a ControlChannel,
}

impl Session<'_> {
    /// Execute one decoded command
    pub fn execute(&mut self, request: ControlRequest) -> Result<ControlResponse, TraceError> {
        let engine = &self.channel.engine;
        match request {
            ControlRequest::Register { name, options } => {
                engine.register(&name, options)?;
                Ok(ControlResponse::Done)
            }
            ControlRequest::Unregister { name } => {
                engine.unregister(&name)?;
                Ok(ControlResponse::Done)
            }
            ControlRequest::Reset => {
                engine.reset();
                Ok(ControlResponse::Done)
            }
            ControlRequest::SetParams(word) => {
                engine.apply_params(word);
                Ok(ControlResponse::Done)
            }
            ControlRequest::DumpSettings => Ok(ControlResponse::Text(engine.dump_settings())),
            ControlRequest::DumpLogs => Ok(ControlResponse::Text(engine.dump_logs().join("\n"))),
        }
    }

    /// Decode and execute a raw request
    pub fn execute_raw(
        &mut self,
        code: u32,
        payload: &[u8],
    ) -> Result<ControlResponse, TraceError> {
        self.execute(ControlRequest::decode(code, payload)?)
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.channel.available.store(true, Ordering::Release);
        tracing::debug!("control channel closed");
    }
}
