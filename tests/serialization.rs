//! Integration tests for the wire formats
//!
//! Tests the MultiFormat trait and the three formats a request may travel in:
//! JSON (default, human-readable), MessagePack (compact) and schema-binary
//! (bincode over a typed value model).

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::uninlined_format_args
)]

use secure_bridge::core::serialization::{
    decode, decode_named, encode, encode_named, MultiFormat, WireFormat,
};
use secure_bridge::error::BridgeError;
use secure_bridge::protocol::message::{Request, Response};
use serde_json::json;

fn sample_request() -> Request {
    Request::new(
        "sum",
        "eyJhbGciOiJIUzI1NiJ9.e30.sig",
        json!({"a": 5, "b": 3, "tags": ["x", "y"], "nested": {"ok": true, "ratio": 0.5}}),
    )
}

#[test]
fn test_json_is_default_and_human_readable() {
    assert_eq!(WireFormat::default(), WireFormat::Json);

    let bytes = sample_request()
        .serialize_format(WireFormat::Json)
        .expect("Failed to serialize");
    let text = std::str::from_utf8(&bytes).expect("Invalid UTF-8");
    assert!(text.contains(r#""operation":"sum""#));
    assert!(text.contains(r#""token":"#));
}

#[test]
fn test_all_formats_roundtrip() {
    let request = sample_request();
    for format in WireFormat::ALL {
        let bytes = request.serialize_format(format).expect("Failed to serialize");
        let recovered = Request::deserialize_format(&bytes, format)
            .unwrap_or_else(|e| panic!("{} failed: {}", format, e));
        assert_eq!(recovered, request, "{} roundtrip", format);
    }
}

#[test]
fn test_responses_roundtrip_in_all_formats() {
    let replies = [
        Response::success(json!({"result": 8})),
        Response::success(json!(null)),
        Response::error("Unknown operation"),
    ];
    for format in WireFormat::ALL {
        for reply in &replies {
            let bytes = reply.serialize_with_header(format).unwrap();
            let (recovered, detected) = Response::deserialize_with_header(&bytes).unwrap();
            assert_eq!(&recovered, reply);
            assert_eq!(detected, format);
        }
    }
}

#[test]
fn test_format_with_header() {
    let request = sample_request();
    for (format, byte) in [
        (WireFormat::Json, 0x01),
        (WireFormat::MessagePack, 0x02),
        (WireFormat::Schema, 0x03),
    ] {
        let bytes = request.serialize_with_header(format).unwrap();
        assert_eq!(bytes[0], byte);
        assert_eq!(WireFormat::from_byte(byte).unwrap(), format);
    }
}

#[test]
fn test_invalid_format_byte() {
    let err = WireFormat::from_byte(0xFF).unwrap_err();
    assert!(matches!(err, BridgeError::UnsupportedFormat(_)));
    assert!(WireFormat::from_byte(0x00).is_err());
}

#[test]
fn test_empty_data_deserialization() {
    assert!(Request::deserialize_with_header(&[]).is_err());
    for format in WireFormat::ALL {
        assert!(Request::deserialize_format(&[], format).is_err());
    }
}

#[test]
fn test_format_names() {
    for (name, format) in [
        ("json", WireFormat::Json),
        ("msgpack", WireFormat::MessagePack),
        ("schema", WireFormat::Schema),
    ] {
        assert_eq!(name.parse::<WireFormat>().unwrap(), format);
        assert_eq!(format.to_string(), name);
    }
    assert!("yaml".parse::<WireFormat>().is_err());
}

#[test]
fn test_named_codec_entry_points() {
    let value = json!({"k": [1, -2, 3.25, "four", null]});
    for name in ["json", "msgpack", "schema"] {
        let bytes = encode_named(&value, name).unwrap();
        assert_eq!(decode_named(&bytes, name).unwrap(), value);
    }
    assert!(encode_named(&value, "xml").is_err());
}

#[test]
fn test_binary_formats_are_more_compact() {
    let value = json!({
        "items": (0..100).map(|i| json!({"id": i, "flag": i % 3 == 0})).collect::<Vec<_>>()
    });
    let json_len = encode(&value, WireFormat::Json).unwrap().len();
    let msgpack_len = encode(&value, WireFormat::MessagePack).unwrap().len();

    println!("json={} msgpack={}", json_len, msgpack_len);
    assert!(msgpack_len < json_len);
}

#[test]
fn test_large_payload_all_formats() {
    let value = json!({"blob": "x".repeat(1024 * 1024)});
    for format in WireFormat::ALL {
        let bytes = encode(&value, format).unwrap();
        assert_eq!(decode(&bytes, format).unwrap(), value);
    }
}

#[test]
fn test_cross_format_bytes_are_rejected() {
    let json_bytes = sample_request().serialize_format(WireFormat::Json).unwrap();
    assert!(Request::deserialize_format(&json_bytes, WireFormat::Schema).is_err());
}

#[test]
fn test_payload_alias_accepted() {
    let bytes = br#"{"operation":"sum","token":"t","payload":{"a":1}}"#;
    let request = Request::deserialize_format(bytes, WireFormat::Json).unwrap();
    assert_eq!(request.data, json!({"a": 1}));
}
