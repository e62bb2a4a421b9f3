//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//!
//! ### Frame
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Type (1) │ Len (4)  │      Body (JSON / text)     │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Body by Command Type
//! - QUERY: `{"key": "...", "type": "add", "payload": ...}`
//! - FIND:  `{"key": "..."}`
//! - STOP:  empty
//! - PING:  empty
//!
//! Responses use the same header with a status byte in place of the type.

use std::io::{Read, Write};

use bytes::{BufMut, Bytes, BytesMut};
use serde_json::Value;

use super::command::{parse_find, parse_query};
use super::{Command, CommandType, Response, Status};
use crate::error::{LogKvError, Result};

/// Header size: 1 byte type/status + 4 bytes length
pub const HEADER_SIZE: usize = 5;

/// Maximum body size (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// One raw frame: header byte plus body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: u8,
    pub body: Bytes,
}

// =============================================================================
// Frames
// =============================================================================

/// Encode a frame: kind (1) + body_len (4, big endian) + body
pub fn encode_frame(kind: u8, body: &[u8]) -> Bytes {
    let mut message = BytesMut::with_capacity(HEADER_SIZE + body.len());
    message.put_u8(kind);
    message.put_u32(body.len() as u32);
    message.put_slice(body);
    message.freeze()
}

fn body_len(header: &[u8; HEADER_SIZE]) -> Result<usize> {
    let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
    if len > MAX_PAYLOAD_SIZE {
        return Err(LogKvError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            len, MAX_PAYLOAD_SIZE
        )));
    }
    Ok(len as usize)
}

/// Decode one frame from the front of `bytes`
pub fn decode_frame(bytes: &[u8]) -> Result<Frame> {
    let header: &[u8; HEADER_SIZE] = bytes
        .get(..HEADER_SIZE)
        .and_then(|h| h.try_into().ok())
        .ok_or_else(|| {
            LogKvError::Protocol(format!(
                "Incomplete header: expected {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            ))
        })?;

    let len = body_len(header)?;
    let total_len = HEADER_SIZE + len;
    if bytes.len() < total_len {
        return Err(LogKvError::Protocol(format!(
            "Incomplete payload: expected {} bytes, got {}",
            total_len,
            bytes.len()
        )));
    }

    Ok(Frame {
        kind: header[0],
        body: Bytes::copy_from_slice(&bytes[HEADER_SIZE..total_len]),
    })
}

/// Read a complete frame from a stream
///
/// Blocks until a complete frame is received or an error occurs
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Frame> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let len = body_len(&header)?;
    let mut body = vec![0u8; len];
    if len > 0 {
        reader.read_exact(&mut body)?;
    }

    Ok(Frame {
        kind: header[0],
        body: Bytes::from(body),
    })
}

// =============================================================================
// Command Encoding/Decoding
// =============================================================================

/// Encode a command to bytes
pub fn encode_command(command: &Command) -> Result<Bytes> {
    let body = match command.body() {
        Some(body) => serde_json::to_vec(&body)?,
        None => Vec::new(),
    };
    Ok(encode_frame(command.command_type() as u8, &body))
}

/// Decode a command from bytes
pub fn decode_command(bytes: &[u8]) -> Result<Command> {
    command_from_frame(&decode_frame(bytes)?)
}

/// Interpret a frame as a command
///
/// Errors here concern a single request; the frame has already been
/// consumed, so the stream is still in sync.
pub fn command_from_frame(frame: &Frame) -> Result<Command> {
    let Some(command_type) = CommandType::from_byte(frame.kind) else {
        return Err(LogKvError::Protocol(format!(
            "Unknown command type: 0x{:02x}",
            frame.kind
        )));
    };

    match command_type {
        CommandType::Query => Ok(Command::Query(parse_query(&json_body(frame)?)?)),
        CommandType::Find => Ok(Command::Find {
            key: parse_find(&json_body(frame)?)?,
        }),
        CommandType::Stop => Ok(Command::Stop),
        CommandType::Ping => {
            if !frame.body.is_empty() {
                return Err(LogKvError::Protocol(format!(
                    "PING command: unexpected payload of {} bytes",
                    frame.body.len()
                )));
            }
            Ok(Command::Ping)
        }
    }
}

fn json_body(frame: &Frame) -> Result<Value> {
    if frame.body.is_empty() {
        return Err(LogKvError::InvalidRequest("missing request body".to_string()));
    }
    serde_json::from_slice(&frame.body)
        .map_err(|e| LogKvError::InvalidRequest(format!("body is not valid JSON: {}", e)))
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response to bytes
///
/// Format: status (1) + payload_len (4) + payload
pub fn encode_response(response: &Response) -> Bytes {
    let payload = response.payload.as_deref().unwrap_or(&[]);
    encode_frame(response.status as u8, payload)
}

/// Decode a response from bytes
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    response_from_frame(decode_frame(bytes)?)
}

fn response_from_frame(frame: Frame) -> Result<Response> {
    let status = Status::from_byte(frame.kind).ok_or_else(|| {
        LogKvError::Protocol(format!("Unknown response status: 0x{:02x}", frame.kind))
    })?;

    let payload = if frame.body.is_empty() {
        None
    } else {
        Some(frame.body.to_vec())
    };

    Ok(Response { status, payload })
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read a complete command from a stream
pub fn read_command<R: Read>(reader: &mut R) -> Result<Command> {
    command_from_frame(&read_frame(reader)?)
}

/// Write a command to a stream
pub fn write_command<W: Write>(writer: &mut W, command: &Command) -> Result<()> {
    let bytes = encode_command(command)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read a complete response from a stream
pub fn read_response<R: Read>(reader: &mut R) -> Result<Response> {
    response_from_frame(read_frame(reader)?)
}

/// Write a response to a stream
pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    let bytes = encode_response(response);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}
