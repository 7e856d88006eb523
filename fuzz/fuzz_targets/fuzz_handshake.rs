#![no_main]

use libfuzzer_sys::fuzz_target;
use secure_bridge::protocol::message::HandshakeMessage;

fuzz_target!(|data: &[u8]| {
    // Handshake frames arrive before the peer is authenticated
    if let Ok(msg) = bincode::deserialize::<HandshakeMessage>(data) {
        if let Ok(serialized) = bincode::serialize(&msg) {
            let _ = bincode::deserialize::<HandshakeMessage>(&serialized);
        }
    }
});
