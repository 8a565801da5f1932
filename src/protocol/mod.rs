//! Protocol module - wire format and frame types.
//!
//! This module implements the BTP framing:
//! - 5-byte header encoding/decoding
//! - Frame struct and payload normalization
//! - Status codes and reserved ids

mod frame;
mod wire_format;

pub use frame::{encode, Frame, IntoPayload};
pub use wire_format::{
    decode_header, decode_payload, Header, Status, EVENT_OPCODE_MIN, HEADER_SIZE, INDEX_NONE,
    MAX_PAYLOAD_SIZE, OP_ERROR, SERVICE_ID_CORE,
};
