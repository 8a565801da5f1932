//! Frame struct and payload normalization.
//!
//! Represents a complete BTP frame with header and payload.
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use btp_harness::protocol::{encode, Frame, INDEX_NONE};
//!
//! let frame = Frame::new(0x00, 0x03, INDEX_NONE, 0x01u8).unwrap();
//! assert_eq!(frame.payload(), &[0x01]);
//!
//! let bytes = encode(0, 3, 0, 0x01u8).unwrap();
//! assert_eq!(bytes, vec![0x00, 0x03, 0x00, 0x01, 0x00, 0x01]);
//! ```

use bytes::Bytes;

use super::wire_format::{Header, HEADER_SIZE};
use crate::error::{BtpError, Result};

/// Anything that can be sent as a BTP payload.
///
/// Raw bytes pass through unchanged, strings are sent as their UTF-8
/// bytes and a single integer becomes its 1-byte representation.
pub trait IntoPayload {
    /// Convert into payload bytes.
    fn into_payload(self) -> Bytes;
}

impl IntoPayload for Bytes {
    fn into_payload(self) -> Bytes {
        self
    }
}

impl IntoPayload for Vec<u8> {
    fn into_payload(self) -> Bytes {
        Bytes::from(self)
    }
}

impl IntoPayload for &[u8] {
    fn into_payload(self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl<const N: usize> IntoPayload for &[u8; N] {
    fn into_payload(self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl IntoPayload for &str {
    fn into_payload(self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl IntoPayload for String {
    fn into_payload(self) -> Bytes {
        Bytes::from(self.into_bytes())
    }
}

impl IntoPayload for u8 {
    fn into_payload(self) -> Bytes {
        Bytes::copy_from_slice(&[self])
    }
}

impl IntoPayload for () {
    fn into_payload(self) -> Bytes {
        Bytes::new()
    }
}

/// A complete BTP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Build a frame, deriving `data_len` from the payload.
    pub fn new(
        service_id: u8,
        opcode: u8,
        controller_index: u8,
        payload: impl IntoPayload,
    ) -> Result<Self> {
        let payload = payload.into_payload();
        let data_len =
            u16::try_from(payload.len()).map_err(|_| BtpError::PayloadTooLarge(payload.len()))?;
        Ok(Self {
            header: Header::new(service_id, opcode, controller_index, data_len),
            payload,
        })
    }

    /// Pair an already decoded header with its payload.
    pub fn from_parts(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[inline]
    pub fn service_id(&self) -> u8 {
        self.header.service_id
    }

    #[inline]
    pub fn opcode(&self) -> u8 {
        self.header.opcode
    }

    #[inline]
    pub fn controller_index(&self) -> u8 {
        self.header.controller_index
    }

    /// Check if this frame is an unsolicited event.
    #[inline]
    pub fn is_event(&self) -> bool {
        self.header.is_event()
    }

    /// Encode header and payload into one contiguous buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.payload);
        buf
    }
}

/// Encode a complete frame as a single byte vector.
pub fn encode(
    service_id: u8,
    opcode: u8,
    controller_index: u8,
    payload: impl IntoPayload,
) -> Result<Vec<u8>> {
    Ok(Frame::new(service_id, opcode, controller_index, payload)?.to_bytes())
}

#[cfg(test)]
mod tests {
    use super::super::wire_format::{decode_header, decode_payload, INDEX_NONE};
    use super::*;

    #[test]
    fn test_encode_single_byte_command() {
        let bytes = encode(0, 3, 0, 0x01u8).unwrap();
        assert_eq!(bytes, vec![0x00, 0x03, 0x00, 0x01, 0x00, 0x01]);
    }

    #[test]
    fn test_empty_payload() {
        let bytes = encode(0x01, 0x02, INDEX_NONE, ()).unwrap();
        assert_eq!(bytes, vec![0x01, 0x02, 0xff, 0x00, 0x00]);
    }

    #[test]
    fn test_string_payload_is_utf8() {
        let frame = Frame::new(0x02, 0x10, 0, "héllo").unwrap();
        assert_eq!(frame.payload(), "héllo".as_bytes());
        assert_eq!(frame.header.data_len, 6);
    }

    #[test]
    fn test_payload_limit() {
        let max = vec![0xA5u8; u16::MAX as usize];
        let bytes = encode(0x07, 0x01, 0, max.clone()).unwrap();
        let header = decode_header(&bytes[..HEADER_SIZE]).unwrap();
        assert_eq!(header.data_len, u16::MAX);
        assert_eq!(
            decode_payload(&bytes[HEADER_SIZE..], header.data_len as usize).unwrap(),
            &max[..]
        );

        let too_big = vec![0u8; u16::MAX as usize + 1];
        assert!(matches!(
            Frame::new(0, 0, 0, too_big),
            Err(BtpError::PayloadTooLarge(65536))
        ));
    }

    #[test]
    fn test_header_recovered_from_encoded_frame() {
        for len in [0usize, 1, 255, 256, 4096] {
            let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let bytes = encode(0x1b, 0x05, 0x02, payload.clone()).unwrap();

            let header = decode_header(&bytes[..HEADER_SIZE]).unwrap();
            assert_eq!(header.service_id, 0x1b);
            assert_eq!(header.opcode, 0x05);
            assert_eq!(header.controller_index, 0x02);
            assert_eq!(header.data_len as usize, len);
            assert_eq!(
                decode_payload(&bytes[HEADER_SIZE..], len).unwrap(),
                &payload[..]
            );
        }
    }

    #[test]
    fn test_frame_accessors() {
        let frame = Frame::new(0x04, 0x81, 0x00, &[1u8, 2, 3]).unwrap();
        assert_eq!(frame.service_id(), 0x04);
        assert_eq!(frame.opcode(), 0x81);
        assert_eq!(frame.controller_index(), 0x00);
        assert!(frame.is_event());
        assert_eq!(frame.to_bytes().len(), HEADER_SIZE + 3);
    }
}
