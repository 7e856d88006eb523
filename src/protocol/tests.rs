// test-only module included via protocol/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use crate::error::BridgeError;
use crate::protocol::handshake::*;
use crate::protocol::message::HandshakeMessage;
use crate::utils::keys::KeyPair;
use crate::utils::replay_cache::ReplayCache;

struct Parties {
    client: KeyPair,
    server: KeyPair,
    trust: PeerTrust,
    cache: ReplayCache,
}

fn parties() -> Parties {
    let client = KeyPair::generate();
    let server = KeyPair::generate();
    let trust = PeerTrust::Pinned(client.public_bytes());
    Parties {
        client,
        server,
        trust,
        cache: ReplayCache::new(),
    }
}

#[test]
fn test_secure_handshake_flow() {
    let mut p = parties();

    // =================== Step 1: Client hello ===================
    let (client_state, hello) =
        client_handshake_init(&p.client).expect("Client init should succeed");
    match &hello {
        HandshakeMessage::ClientHello { static_key, .. } => {
            assert_eq!(*static_key, p.client.public_bytes());
        }
        _ => panic!("Expected ClientHello message"),
    }

    // =================== Step 2: Server hello ===================
    let (server_state, server_hello) =
        server_handshake_response(&p.server, &p.trust, hello, "127.0.0.1", &mut p.cache)
            .expect("Server response should succeed");

    // =================== Step 3: Client verifies and finishes ===================
    let (client_key, finish) = client_handshake_verify(
        client_state,
        &p.client,
        &p.server.public_bytes(),
        server_hello,
    )
    .expect("Client verification should succeed");

    // =================== Step 4: Server finalizes ===================
    let (server_key, client_static) =
        server_handshake_finalize(server_state, finish).expect("Server finalization should succeed");

    // Keys should match (validates the Diffie-Hellman exchange worked)
    assert_eq!(*client_key, *server_key);
    assert_eq!(client_static, p.client.public_bytes());
}

#[test]
fn test_session_keys_differ_per_connection() {
    let mut p = parties();
    let mut keys = Vec::new();
    for _ in 0..2 {
        let (cs, hello) = client_handshake_init(&p.client).unwrap();
        let (ss, sh) =
            server_handshake_response(&p.server, &p.trust, hello, "peer", &mut p.cache).unwrap();
        let (ck, finish) =
            client_handshake_verify(cs, &p.client, &p.server.public_bytes(), sh).unwrap();
        let (sk, _) = server_handshake_finalize(ss, finish).unwrap();
        assert_eq!(*ck, *sk);
        keys.push(*ck);
    }
    assert_ne!(keys[0], keys[1]);
}

#[test]
fn test_untrusted_client_rejected() {
    let mut p = parties();
    let stranger = KeyPair::generate();
    let (_, hello) = client_handshake_init(&stranger).unwrap();

    let err = server_handshake_response(&p.server, &p.trust, hello, "peer", &mut p.cache)
        .err()
        .expect("stranger must be rejected");
    assert!(matches!(err, BridgeError::Handshake(_)));
}

#[test]
fn test_untrusted_hellos_do_not_fill_replay_cache() {
    let mut p = parties();
    for _ in 0..50 {
        let (_, hello) = client_handshake_init(&KeyPair::generate()).unwrap();
        assert!(server_handshake_response(&p.server, &p.trust, hello, "peer", &mut p.cache).is_err());
    }
    assert!(p.cache.is_empty());

    let (_, hello) = client_handshake_init(&p.client).unwrap();
    server_handshake_response(&p.server, &p.trust, hello, "peer", &mut p.cache).unwrap();
    assert_eq!(p.cache.len(), 1);
}

#[test]
fn test_directional_keys_agree_across_the_handshake() {
    let mut p = parties();
    let (cs, hello) = client_handshake_init(&p.client).unwrap();
    let (ss, sh) =
        server_handshake_response(&p.server, &p.trust, hello, "peer", &mut p.cache).unwrap();
    let (ck, finish) = client_handshake_verify(cs, &p.client, &p.server.public_bytes(), sh).unwrap();
    let (sk, _) = server_handshake_finalize(ss, finish).unwrap();

    let client = SessionKeys::split(&ck, Side::Client);
    let server = SessionKeys::split(&sk, Side::Server);
    assert_eq!(*client.send, *server.recv);
    assert_eq!(*server.send, *client.recv);
    assert_ne!(*client.send, *server.send);
}

#[test]
fn test_allow_any_accepts_unknown_client() {
    let mut p = parties();
    let stranger = KeyPair::generate();
    let (cs, hello) = client_handshake_init(&stranger).unwrap();
    let (ss, sh) =
        server_handshake_response(&p.server, &PeerTrust::AllowAny, hello, "peer", &mut p.cache)
            .unwrap();
    let (_, finish) = client_handshake_verify(cs, &stranger, &p.server.public_bytes(), sh).unwrap();
    let (_, client_static) = server_handshake_finalize(ss, finish).unwrap();
    assert_eq!(client_static, stranger.public_bytes());
}

#[test]
fn test_impostor_server_fails_proof() {
    let mut p = parties();
    let impostor = KeyPair::generate();
    let (cs, hello) = client_handshake_init(&p.client).unwrap();
    let (_, sh) =
        server_handshake_response(&impostor, &p.trust, hello, "peer", &mut p.cache).unwrap();

    // Client pins the real server key; the impostor cannot compute `es`
    let err = client_handshake_verify(cs, &p.client, &p.server.public_bytes(), sh)
        .err()
        .expect("impostor must fail");
    assert!(matches!(err, BridgeError::Handshake(_)));
}

#[test]
fn test_client_without_static_secret_fails_finalize() {
    let mut p = parties();
    // Claims the pinned client's public key but holds a different secret
    let forger = KeyPair::generate();
    let (cs, hello) = client_handshake_init(&forger).unwrap();
    let forged_hello = match hello {
        HandshakeMessage::ClientHello {
            ephemeral_key,
            timestamp,
            nonce,
            ..
        } => HandshakeMessage::ClientHello {
            static_key: p.client.public_bytes(),
            ephemeral_key,
            timestamp,
            nonce,
        },
        _ => panic!("Expected ClientHello message"),
    };

    let (ss, sh) =
        server_handshake_response(&p.server, &p.trust, forged_hello, "peer", &mut p.cache).unwrap();
    // The forger's transcript disagrees with the server's, so its own
    // verification already fails; fabricate a finish instead
    assert!(client_handshake_verify(cs, &forger, &p.server.public_bytes(), sh).is_err());
    let err = server_handshake_finalize(ss, HandshakeMessage::ClientFinish { proof: [0u8; 32] })
        .err()
        .expect("forged finish must fail");
    assert!(matches!(err, BridgeError::Handshake(_)));
}

#[test]
fn test_replayed_hello_rejected() {
    let mut p = parties();
    let (_, hello) = client_handshake_init(&p.client).unwrap();

    assert!(
        server_handshake_response(&p.server, &p.trust, hello.clone(), "peer", &mut p.cache)
            .is_ok()
    );
    let err = server_handshake_response(&p.server, &p.trust, hello, "peer", &mut p.cache)
        .err()
        .expect("replay must be rejected");
    assert!(matches!(err, BridgeError::Handshake(ref m) if m.contains("Replay")));
}

#[test]
fn test_stale_hello_rejected() {
    let mut p = parties();
    let (_, hello) = client_handshake_init(&p.client).unwrap();
    let stale = match hello {
        HandshakeMessage::ClientHello {
            static_key,
            ephemeral_key,
            timestamp,
            nonce,
        } => HandshakeMessage::ClientHello {
            static_key,
            ephemeral_key,
            timestamp: timestamp - (MAX_HELLO_AGE_SECS + 5) * 1000,
            nonce,
        },
        _ => panic!("Expected ClientHello message"),
    };
    assert!(server_handshake_response(&p.server, &p.trust, stale, "peer", &mut p.cache).is_err());
}

#[test]
fn test_reject_surfaces_reason_to_client() {
    let p = parties();
    let (cs, _) = client_handshake_init(&p.client).unwrap();
    let err = client_handshake_verify(
        cs,
        &p.client,
        &p.server.public_bytes(),
        HandshakeMessage::Reject {
            reason: "Peer public key is not trusted".into(),
        },
    )
    .err()
    .expect("reject must fail");
    assert!(matches!(err, BridgeError::Handshake(ref m) if m.contains("not trusted")));
}

#[test]
fn test_out_of_order_messages_rejected() {
    let mut p = parties();
    let finish = HandshakeMessage::ClientFinish { proof: [1u8; 32] };
    assert!(server_handshake_response(&p.server, &p.trust, finish, "peer", &mut p.cache).is_err());
}
