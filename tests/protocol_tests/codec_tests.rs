//! Tests for the wire codec
//!
//! These tests verify:
//! - Frame layout (type byte, big-endian length, JSON body)
//! - Command decoding and request validation
//! - Response decoding
//! - Size limits and truncated input

use std::io::Cursor;

use logkv::error::LogKvError;
use logkv::protocol::{
    decode_command, decode_response, encode_command, encode_frame, encode_response, read_command,
    read_response, write_command, write_response, Command, QueryKind, QueryRequest, Response,
    Status, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
use logkv::record::Record;
use serde_json::json;

// =============================================================================
// Frame Layout Tests
// =============================================================================

#[test]
fn test_frame_layout() {
    let bytes = encode_frame(0x02, b"{\"key\":\"k\"}");

    assert_eq!(bytes[0], 0x02);
    assert_eq!(&bytes[1..5], &11u32.to_be_bytes());
    assert_eq!(&bytes[HEADER_SIZE..], b"{\"key\":\"k\"}");
}

#[test]
fn test_ping_and_stop_have_empty_bodies() {
    let ping = encode_command(&Command::Ping).unwrap();
    assert_eq!(&ping[..], &[0x04, 0, 0, 0, 0]);

    let stop = encode_command(&Command::Stop).unwrap();
    assert_eq!(&stop[..], &[0x03, 0, 0, 0, 0]);
}

#[test]
fn test_query_body_is_json() {
    let command = Command::Query(QueryRequest::add("k", json!({"v": 1})));
    let bytes = encode_command(&command).unwrap();

    assert_eq!(bytes[0], 0x01);
    let body: serde_json::Value = serde_json::from_slice(&bytes[HEADER_SIZE..]).unwrap();
    assert_eq!(body, json!({"key": "k", "type": "add", "payload": {"v": 1}}));
}

// =============================================================================
// Command Decoding Tests
// =============================================================================

#[test]
fn test_decode_commands() {
    let commands = vec![
        Command::Query(QueryRequest::add("k", json!([1, 2, 3]))),
        Command::Find {
            key: "user:1".to_string(),
        },
        Command::Stop,
        Command::Ping,
    ];

    for command in commands {
        let bytes = encode_command(&command).unwrap();
        assert_eq!(decode_command(&bytes).unwrap(), command);
    }
}

#[test]
fn test_decode_query_without_key() {
    let bytes = encode_frame(0x01, br#"{"type":"add","payload":1}"#);

    match decode_command(&bytes).unwrap() {
        Command::Query(request) => {
            assert!(request.key.is_none());
            assert_eq!(request.kind, QueryKind::Add);
        }
        other => panic!("expected query, got {:?}", other),
    }
}

#[test]
fn test_decode_rejects_malformed_requests() {
    let not_json = encode_frame(0x01, b"{oops");
    assert!(matches!(
        decode_command(&not_json),
        Err(LogKvError::InvalidRequest(_))
    ));

    let not_object = encode_frame(0x01, b"[1,2]");
    assert!(matches!(
        decode_command(&not_object),
        Err(LogKvError::InvalidRequest(_))
    ));

    let find_without_key = encode_frame(0x02, b"{}");
    assert!(matches!(
        decode_command(&find_without_key),
        Err(LogKvError::InvalidRequest(_))
    ));

    let ping_with_body = encode_frame(0x04, b"x");
    assert!(matches!(
        decode_command(&ping_with_body),
        Err(LogKvError::Protocol(_))
    ));
}

#[test]
fn test_decode_unknown_command_type() {
    let bytes = encode_frame(0x7f, b"");
    assert!(matches!(decode_command(&bytes), Err(LogKvError::Protocol(_))));
}

#[test]
fn test_decode_truncated_input() {
    assert!(decode_command(&[0x01, 0, 0]).is_err());

    let bytes = encode_command(&Command::Find {
        key: "abc".to_string(),
    })
    .unwrap();
    assert!(decode_command(&bytes[..bytes.len() - 1]).is_err());
}

#[test]
fn test_oversized_frame_rejected() {
    let mut header = vec![0x01];
    header.extend_from_slice(&(MAX_PAYLOAD_SIZE + 1).to_be_bytes());

    assert!(matches!(decode_command(&header), Err(LogKvError::Protocol(_))));
    assert!(read_command(&mut Cursor::new(header)).is_err());
}

// =============================================================================
// Response Tests
// =============================================================================

#[test]
fn test_response_statuses() {
    let ok = decode_response(&encode_response(&Response::ok(Some(b"PONG".to_vec())))).unwrap();
    assert_eq!(ok.status, Status::Ok);
    assert_eq!(ok.text(), "PONG");

    let missing = decode_response(&encode_response(&Response::not_found())).unwrap();
    assert_eq!(missing.status, Status::NotFound);
    assert!(missing.payload.is_none());

    let error = decode_response(&encode_response(&Response::error("bad key"))).unwrap();
    assert_eq!(error.status, Status::Error);
    assert_eq!(error.text(), "bad key");
}

#[test]
fn test_record_response_carries_disk_form() {
    let record = Record::add("k", json!({"nested": [1, 2]}), "client", "admin");
    let response = Response::record(&record).unwrap();

    let body = response.json().unwrap();
    assert_eq!(body["key"], json!("k"));
    assert_eq!(body["clientId"], json!("client"));
    assert_eq!(body["status"], json!("add"));
    assert!(body.get("created").is_some());

    assert_eq!(response.into_record().unwrap(), record);
}

#[test]
fn test_unknown_response_status() {
    let bytes = encode_frame(0x09, b"");
    assert!(decode_response(&bytes).is_err());
}

// =============================================================================
// Stream Tests
// =============================================================================

#[test]
fn test_stream_helpers() {
    let mut wire = Vec::new();
    write_command(&mut wire, &Command::Ping).unwrap();
    write_command(
        &mut wire,
        &Command::Find {
            key: "k".to_string(),
        },
    )
    .unwrap();

    let mut cursor = Cursor::new(wire);
    assert_eq!(read_command(&mut cursor).unwrap(), Command::Ping);
    assert_eq!(
        read_command(&mut cursor).unwrap(),
        Command::Find {
            key: "k".to_string()
        }
    );
    assert!(matches!(read_command(&mut cursor), Err(LogKvError::Io(_))));

    let mut wire = Vec::new();
    write_response(&mut wire, &Response::not_found()).unwrap();
    let response = read_response(&mut Cursor::new(wire)).unwrap();
    assert_eq!(response.status, Status::NotFound);
}
