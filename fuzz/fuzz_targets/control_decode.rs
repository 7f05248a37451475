#![no_main]

use libfuzzer_sys::fuzz_target;
use rastro::dispatch::ControlRequest;
use rastro::params::ParamUpdate;

// Wire decoding must never panic, whatever the transport delivers.
fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }
    let code = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let payload = &data[4..];
    let _ = ControlRequest::decode(code % 8, payload);
    if payload.len() >= 4 {
        let word = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let update = ParamUpdate::decode(word);
        assert_eq!(ParamUpdate::decode(update.encode()), update);
    }
});
