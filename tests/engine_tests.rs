//! Integration tests for the trace engine: registry lifecycle, recording,
//! control dispatch, and the session guard.

use rastro::dispatch::{
    ControlChannel, ControlRequest, ControlResponse, CMD_DUMP_LOGS, CMD_SET_PARAMS,
    CMD_TARGET_CONFIG,
};
use rastro::engine::{EngineConfig, TraceEngine};
use rastro::error::TraceError;
use rastro::log_store::EventKind;
use rastro::params::{ParamUpdate, TimestampFormat, TimestampUpdate};
use rastro::provider::{AttachError, InstrumentationProvider, ManualProvider, ProbeHandle};
use rastro::recorder::Recorder;
use rastro::registry::RegisterOptions;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

fn engine_pair(config: EngineConfig) -> (Arc<ManualProvider>, TraceEngine) {
    let provider = Arc::new(ManualProvider::new());
    let engine = TraceEngine::new(
        Arc::clone(&provider) as Arc<dyn InstrumentationProvider>,
        config,
    );
    (provider, engine)
}

fn enable_logging(engine: &TraceEngine) {
    engine.apply_params(
        ParamUpdate {
            logging: Some(true),
            ..Default::default()
        }
        .encode(),
    );
}

#[test]
fn test_register_unregister_lifecycle() {
    let (provider, engine) = engine_pair(EngineConfig::default());

    engine.register("alpha", Default::default()).unwrap();
    engine.register("beta", Default::default()).unwrap();
    assert_eq!(engine.registry().attached_count(), 2);
    assert_eq!(provider.probe_count(), 2);

    engine.unregister("alpha").unwrap();
    assert_eq!(engine.registry().attached_count(), 1);
    assert_eq!(provider.probe_count(), 1);

    // detached names are not unregisterable twice
    assert_eq!(
        engine.unregister("alpha"),
        Err(TraceError::NotFound("alpha".to_string()))
    );
    assert_eq!(
        engine.unregister("never-added"),
        Err(TraceError::NotFound("never-added".to_string()))
    );
}

#[test]
fn test_duplicate_register_fails_and_leaves_one_entry() {
    let (_, engine) = engine_pair(EngineConfig::default());
    engine.register("foo", Default::default()).unwrap();
    assert_eq!(
        engine.register("foo", Default::default()),
        Err(TraceError::AlreadyExists("foo".to_string()))
    );
    let rows: Vec<_> = engine
        .registry()
        .snapshot()
        .into_iter()
        .filter(|r| r.name == "foo")
        .collect();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].attached);
}

#[test]
fn test_reregister_reuses_the_detached_slot() {
    let (_, engine) = engine_pair(EngineConfig::default());
    engine.register("foo", Default::default()).unwrap();
    let first = engine.registry().lookup_by_name("foo").unwrap().target_ref;
    engine.unregister("foo").unwrap();
    engine.register("foo", Default::default()).unwrap();
    let second = engine.registry().lookup_by_name("foo").unwrap().target_ref;
    assert_eq!(first.index, second.index);
    assert!(second.generation > first.generation);
}

#[test]
fn test_capacity_exceeded_leaves_prior_targets_intact() {
    let (_, engine) = engine_pair(EngineConfig {
        max_targets: 16,
        log_capacity: 64,
    });
    for i in 0..16 {
        engine
            .register(&format!("func_{i}"), Default::default())
            .unwrap();
    }
    assert_eq!(
        engine.register("one_too_many", Default::default()),
        Err(TraceError::CapacityExceeded(16))
    );
    assert_eq!(engine.registry().attached_count(), 16);
    assert!(engine.registry().lookup_by_name("func_0").is_some());
    assert!(engine.registry().lookup_by_name("one_too_many").is_none());
}

#[test]
fn test_logging_disabled_records_nothing() {
    let (provider, engine) = engine_pair(EngineConfig::default());
    engine.register("foo", Default::default()).unwrap();

    // logging defaults to off
    assert!(provider.fire_call("foo"));
    assert!(engine.store().is_empty());

    enable_logging(&engine);
    assert!(provider.fire_call("foo"));
    assert!(provider.fire_call("foo"));
    assert_eq!(engine.store().len(), 4);

    let kinds: Vec<_> = engine
        .store()
        .iter(0, usize::MAX)
        .map(|(_, e)| e.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::Enter,
            EventKind::Exit,
            EventKind::Enter,
            EventKind::Exit
        ]
    );
}

#[test]
fn test_per_target_timestamp_opt_out() {
    let (provider, engine) = engine_pair(EngineConfig::default());
    engine.register("stamped", Default::default()).unwrap();
    engine
        .register(
            "bare",
            RegisterOptions {
                record_timestamp: false,
            },
        )
        .unwrap();
    enable_logging(&engine);

    provider.fire("stamped", EventKind::Enter);
    provider.fire("bare", EventKind::Enter);

    let entries: Vec<_> = engine.store().iter(0, usize::MAX).collect();
    assert!(entries[0].1.timestamp.is_some());
    assert!(entries[1].1.timestamp.is_none());
}

#[test]
fn test_global_timestamp_toggle_overrides_per_target() {
    let (provider, engine) = engine_pair(EngineConfig::default());
    engine.register("foo", Default::default()).unwrap();
    engine.apply_params(
        ParamUpdate {
            logging: Some(true),
            timestamp: Some(TimestampUpdate {
                enabled: false,
                format: TimestampFormat::Absolute,
            }),
            ..Default::default()
        }
        .encode(),
    );
    provider.fire("foo", EventKind::Enter);
    let entry = engine.store().get(0).unwrap();
    assert!(entry.timestamp.is_none());
}

#[test]
fn test_full_store_drops_events_but_keeps_tracing_alive() {
    let (provider, engine) = engine_pair(EngineConfig {
        max_targets: 4,
        log_capacity: 3,
    });
    engine.register("foo", Default::default()).unwrap();
    enable_logging(&engine);

    for _ in 0..5 {
        provider.fire("foo", EventKind::Enter);
    }
    assert_eq!(engine.store().len(), 3);
    let (appended, rejected) = engine.store().totals();
    assert_eq!(appended, 3);
    assert_eq!(rejected, 2);

    // a reset frees the store for new events
    engine.reset();
    engine.register("foo", Default::default()).unwrap();
    provider.fire("foo", EventKind::Enter);
    assert_eq!(engine.store().len(), 1);
}

#[test]
fn test_reset_detaches_everything_and_clears_logs() {
    let (provider, engine) = engine_pair(EngineConfig::default());
    engine.register("a", Default::default()).unwrap();
    engine.register("b", Default::default()).unwrap();
    enable_logging(&engine);
    provider.fire_call("a");
    assert!(!engine.store().is_empty());

    engine.reset();
    assert_eq!(engine.registry().attached_count(), 0);
    assert_eq!(provider.probe_count(), 0);
    assert!(engine.store().is_empty());
    assert!(engine.dump_logs().is_empty());
}

#[test]
fn test_set_params_touches_only_flagged_fields() {
    let (_, engine) = engine_pair(EngineConfig::default());
    enable_logging(&engine);

    // an eager-print-only word must not disturb the logger or timestamps
    engine.apply_params(
        ParamUpdate {
            eager_print: Some(true),
            ..Default::default()
        }
        .encode(),
    );
    let snapshot = engine.settings().snapshot();
    assert!(snapshot.logging);
    assert!(snapshot.eager_print);
    assert!(snapshot.timestamp);
    assert_eq!(snapshot.format, TimestampFormat::Absolute);
}

/// Provider that refuses every attach, for rollback tests
struct RefusingProvider;

impl InstrumentationProvider for RefusingProvider {
    fn attach(&self, symbol: &str, _recorder: Recorder) -> Result<ProbeHandle, AttachError> {
        Err(AttachError::SymbolNotFound(symbol.to_string()))
    }

    fn detach(&self, _handle: ProbeHandle) {}
}

#[test]
fn test_failed_attach_leaves_no_partial_target() {
    let engine = TraceEngine::new(Arc::new(RefusingProvider), EngineConfig::default());
    let err = engine.register("ghost", Default::default()).unwrap_err();
    assert!(matches!(err, TraceError::ProbeInstallFailed { .. }));
    assert_eq!(engine.registry().attached_count(), 0);
    assert!(engine.registry().lookup_by_name("ghost").is_none());
    assert!(engine.registry().snapshot().is_empty());
    // the slot is still usable afterwards
    drop(engine);
    let (_, engine) = engine_pair(EngineConfig::default());
    engine.register("ghost", Default::default()).unwrap();
}

/// Provider that keeps recorders alive past detach, modelling a callback
/// already in flight when its target is unregistered
#[derive(Default)]
struct RetainingProvider {
    recorders: Mutex<Vec<Recorder>>,
    next_handle: AtomicU64,
}

impl InstrumentationProvider for RetainingProvider {
    fn attach(&self, _symbol: &str, recorder: Recorder) -> Result<ProbeHandle, AttachError> {
        self.recorders.lock().unwrap().push(recorder);
        Ok(ProbeHandle(self.next_handle.fetch_add(1, Ordering::Relaxed)))
    }

    fn detach(&self, _handle: ProbeHandle) {}
}

#[test]
fn test_late_event_for_detached_target_is_dropped() {
    let provider = Arc::new(RetainingProvider::default());
    let engine = TraceEngine::new(
        Arc::clone(&provider) as Arc<dyn InstrumentationProvider>,
        EngineConfig::default(),
    );
    engine.register("foo", Default::default()).unwrap();
    enable_logging(&engine);

    engine.unregister("foo").unwrap();
    let recorder = provider.recorders.lock().unwrap()[0].clone();
    recorder.exit();

    assert!(engine.store().is_empty());
    assert_eq!(engine.stale_events(), 1);
}

#[test]
fn test_control_channel_rejects_second_session() {
    let (_, engine) = engine_pair(EngineConfig::default());
    let channel = ControlChannel::new(Arc::new(engine));

    let session = channel.open().unwrap();
    assert_eq!(channel.open().unwrap_err(), TraceError::SessionBusy);
    drop(session);

    // the channel is reusable once the holder drops
    let mut session = channel.open().unwrap();
    assert_eq!(
        session.execute(ControlRequest::Reset).unwrap(),
        ControlResponse::Done
    );
}

#[test]
fn test_raw_dispatch_roundtrip() {
    let provider = Arc::new(ManualProvider::new());
    let engine = Arc::new(TraceEngine::new(
        Arc::clone(&provider) as Arc<dyn InstrumentationProvider>,
        EngineConfig::default(),
    ));
    let channel = ControlChannel::new(Arc::clone(&engine));
    let mut session = channel.open().unwrap();

    let payload = ControlRequest::encode_target_config("foo", true, true).unwrap();
    session.execute_raw(CMD_TARGET_CONFIG, &payload).unwrap();

    let word = ParamUpdate {
        logging: Some(true),
        ..Default::default()
    }
    .encode();
    session
        .execute_raw(CMD_SET_PARAMS, &word.to_le_bytes())
        .unwrap();

    provider.fire_call("foo");

    let response = session.execute_raw(CMD_DUMP_LOGS, &[]).unwrap();
    let ControlResponse::Text(text) = response else {
        panic!("dump returned no text");
    };
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("e foo"));
    assert!(lines[1].contains("r foo"));

    // a malformed request fails before any state changes
    let before = engine.registry().attached_count();
    assert!(session.execute_raw(CMD_TARGET_CONFIG, &[0u8; 3]).is_err());
    assert!(session.execute_raw(99, &[]).is_err());
    assert_eq!(engine.registry().attached_count(), before);
}

#[test]
fn test_concurrent_fire_and_register_stress() {
    let (provider, engine) = engine_pair(EngineConfig {
        max_targets: 8,
        log_capacity: 4096,
    });
    engine.register("hot", Default::default()).unwrap();
    enable_logging(&engine);

    let engine = Arc::new(engine);
    let mut handles = Vec::new();
    for _ in 0..4 {
        let provider = Arc::clone(&provider);
        handles.push(std::thread::spawn(move || {
            for _ in 0..200 {
                provider.fire_call("hot");
            }
        }));
    }
    // churn registry membership on other slots while events flow
    let churner = {
        let engine = Arc::clone(&engine);
        std::thread::spawn(move || {
            for i in 0..50 {
                let name = format!("churn_{}", i % 4);
                let _ = engine.register(&name, Default::default());
                let _ = engine.unregister(&name);
            }
        })
    };
    for handle in handles {
        handle.join().unwrap();
    }
    churner.join().unwrap();

    let (appended, rejected) = engine.store().totals();
    assert_eq!(appended + rejected, 4 * 200 * 2);
    assert_eq!(engine.store().len(), appended as usize);
    // every stored entry resolves to the still-attached hot target
    for (_, entry) in engine.store().iter(0, usize::MAX) {
        let info = engine.registry().resolve(entry.target).unwrap();
        assert_eq!(info.name, "hot");
    }
}

#[test]
fn test_json_views_match_store_contents() {
    let (provider, engine) = engine_pair(EngineConfig::default());
    engine.register("foo", Default::default()).unwrap();
    enable_logging(&engine);
    provider.fire_call("foo");

    let views = engine.log_views();
    assert_eq!(views.len(), 2);
    assert_eq!(views[0].seq, 1);
    assert_eq!(views[0].target, "foo");
    assert_eq!(views[0].kind, EventKind::Enter);
    assert_eq!(views[1].kind, EventKind::Exit);

    let json = serde_json::to_string(&views).unwrap();
    assert!(json.contains("\"kind\":\"enter\""));
    assert!(json.contains("\"target\":\"foo\""));
}
