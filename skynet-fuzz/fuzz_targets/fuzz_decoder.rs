#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use skynet_core::message;

fuzz_target!(|data: &[u8]| {
    // First byte picks where the header frame ends.
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let split = usize::from(split).min(rest.len());
    let (header, payload) = rest.split_at(split);

    // Decoding must reject garbage without panicking.
    let _ = message::decode::<ciborium::Value>(header, payload);
    let _ = message::decode::<String>(header, payload);
    let _ = message::decode_payload::<Vec<f64>>(rest);

    let frames = [Bytes::copy_from_slice(header), Bytes::copy_from_slice(payload)];
    let _ = message::decode_frames::<ciborium::Value, _>(&frames);
    let _ = message::decode_frames::<ciborium::Value, _>(&frames[..1]);
});
