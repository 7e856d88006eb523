#![no_main]

use libfuzzer_sys::fuzz_target;
use secure_bridge::core::packet::Packet;
use secure_bridge::{MultiFormat, Request};

fuzz_target!(|data: &[u8]| {
    // Frame parsing and request decoding must never panic
    let _ = Packet::from_bytes(data);
    if let Ok((request, format)) = Request::deserialize_with_header(data) {
        let encoded = request.serialize_with_header(format);
        assert!(encoded.is_ok());
    }
});
