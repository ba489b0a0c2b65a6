//! Wire format tests
//!
//! The JSON shape is shared with browser peers, so these tests pin the exact
//! field names and the forward-compatibility rules:
//! - `type` discriminator in SCREAMING_SNAKE_CASE
//! - `isPlaying` in camelCase
//! - unknown kinds and unknown fields are tolerated

use serde_json::{json, Value};
use syncwatch_core::{codec, Error, Message, PlaybackSnapshot};

fn wire(message: &Message) -> Value {
    let bytes = codec::encode(message).expect("encode failed");
    serde_json::from_slice(&bytes).expect("encoded payload is not JSON")
}

#[test]
fn test_unit_messages_carry_only_type() {
    assert_eq!(wire(&Message::Play), json!({ "type": "PLAY" }));
    assert_eq!(wire(&Message::Pause), json!({ "type": "PAUSE" }));
    assert_eq!(wire(&Message::SyncRequest), json!({ "type": "SYNC_REQUEST" }));
}

#[test]
fn test_seek_wire_shape() {
    assert_eq!(
        wire(&Message::Seek { time: 42.5 }),
        json!({ "type": "SEEK", "time": 42.5 })
    );
}

#[test]
fn test_sync_response_uses_camel_case_flag() {
    let value = wire(&Message::SyncResponse {
        time: 120.0,
        is_playing: true,
    });
    assert_eq!(
        value,
        json!({ "type": "SYNC_RESPONSE", "time": 120.0, "isPlaying": true })
    );
    assert!(value.get("is_playing").is_none());
}

#[test]
fn test_decode_browser_payload() {
    let msg = codec::decode(br#"{"type":"SYNC_RESPONSE","time":12,"isPlaying":false}"#).unwrap();
    assert_eq!(
        msg,
        Message::SyncResponse {
            time: 12.0,
            is_playing: false
        }
    );
}

#[test]
fn test_decode_ignores_extra_fields() {
    let msg = codec::decode(br#"{"type":"PAUSE","from":"someone","seq":4}"#).unwrap();
    assert_eq!(msg, Message::Pause);
}

#[test]
fn test_unknown_type_is_distinguished() {
    let err = codec::decode(br#"{"type":"CHAT","text":"hi"}"#).unwrap_err();
    assert!(err.is_unknown_type());
    match err {
        Error::UnknownMessageType(kind) => assert_eq!(kind, "CHAT"),
        other => panic!("Expected UnknownMessageType, got {:?}", other),
    }
}

#[test]
fn test_malformed_payloads_are_decode_errors() {
    for payload in [
        &b"not json"[..],
        &b"[1,2,3]"[..],
        &br#"{"type":"SEEK"}"#[..],
        &br#"{"type":"SEEK","time":"soon"}"#[..],
        &br#"{"type":"SYNC_RESPONSE","time":1.0}"#[..],
    ] {
        let err = codec::decode(payload).unwrap_err();
        assert!(
            matches!(err, Error::DecodeError(_)),
            "payload {:?} gave {:?}",
            String::from_utf8_lossy(payload),
            err
        );
    }
}

#[test]
fn test_snapshot_becomes_sync_response() {
    let msg: Message = PlaybackSnapshot::new(50.0, false).into();
    assert_eq!(
        msg,
        Message::SyncResponse {
            time: 50.0,
            is_playing: false
        }
    );
    assert_eq!(msg.kind(), "SYNC_RESPONSE");
}
