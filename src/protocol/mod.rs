//! Protocol Module
//!
//! Defines the wire protocol for client-server communication.
//!
//! ## Protocol Format
//!
//! ### Request Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Cmd (1)  │ Len (4)  │         JSON body           │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Commands
//! - 0x01: QUERY - Body: {key, type, payload}; `type = "add"` ingests
//! - 0x02: FIND  - Body: {key}
//! - 0x03: STOP  - Body: empty
//! - 0x04: PING  - Body: empty
//!
//! ### Response Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Status(1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Status Codes
//! - 0x00: OK (FIND: record JSON, PING: "PONG")
//! - 0x01: NOT_FOUND
//! - 0x02: ERROR (message text)

mod command;
mod response;
mod codec;

pub use command::{parse_find, parse_query, Command, CommandType, QueryKind, QueryRequest};
pub use response::{Response, Status};
pub use codec::{
    command_from_frame, decode_command, decode_frame, decode_response, encode_command,
    encode_frame, encode_response, read_command, read_frame, read_response, write_command,
    write_response, Frame, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
