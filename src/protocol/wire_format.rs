//! Wire format encoding and decoding.
//!
//! Implements the 5-byte BTP header:
//! ```text
//! ┌────────────┬────────┬──────────────────┬──────────────┐
//! │ Service ID │ Opcode │ Controller index │ Data length  │
//! │ 1 byte     │ 1 byte │ 1 byte           │ 2 bytes      │
//! │            │        │                  │ uint16 LE    │
//! └────────────┴────────┴──────────────────┴──────────────┘
//! ```
//!
//! The header is followed by exactly `data_len` payload bytes. There is no
//! checksum and no version field.

use crate::error::{BtpError, Result};

/// Header size in bytes (fixed, exactly 5).
pub const HEADER_SIZE: usize = 5;

/// Largest payload a header can announce.
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Controller index meaning "no specific controller".
pub const INDEX_NONE: u8 = 0xff;

/// Core service, always available on the IUT.
pub const SERVICE_ID_CORE: u8 = 0x00;

/// Generic error status opcode, valid on every service.
pub const OP_ERROR: u8 = 0x00;

/// Opcodes at or above this value are unsolicited events.
pub const EVENT_OPCODE_MIN: u8 = 0x80;

/// Status carried in the payload of an [`OP_ERROR`] response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Fail,
    UnknownCommand,
    NotReady,
    InvalidIndex,
    /// Status byte outside the defined range.
    Other(u8),
}

impl From<u8> for Status {
    fn from(code: u8) -> Self {
        match code {
            0x00 => Status::Success,
            0x01 => Status::Fail,
            0x02 => Status::UnknownCommand,
            0x03 => Status::NotReady,
            0x04 => Status::InvalidIndex,
            other => Status::Other(other),
        }
    }
}

impl From<Status> for u8 {
    fn from(status: Status) -> Self {
        match status {
            Status::Success => 0x00,
            Status::Fail => 0x01,
            Status::UnknownCommand => 0x02,
            Status::NotReady => 0x03,
            Status::InvalidIndex => 0x04,
            Status::Other(code) => code,
        }
    }
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Service identifier.
    pub service_id: u8,
    /// Command, response or event opcode.
    pub opcode: u8,
    /// Controller index ([`INDEX_NONE`] = none).
    pub controller_index: u8,
    /// Payload length in bytes.
    pub data_len: u16,
}

impl Header {
    /// Create a new header.
    pub fn new(service_id: u8, opcode: u8, controller_index: u8, data_len: u16) -> Self {
        Self {
            service_id,
            opcode,
            controller_index,
            data_len,
        }
    }

    /// Encode header to bytes (length is little endian).
    ///
    /// # Example
    ///
    /// ```
    /// use btp_harness::protocol::Header;
    ///
    /// let bytes = Header::new(0, 3, 0, 1).encode();
    /// assert_eq!(bytes, [0x00, 0x03, 0x00, 0x01, 0x00]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (5 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0] = self.service_id;
        buf[1] = self.opcode;
        buf[2] = self.controller_index;
        buf[3..5].copy_from_slice(&self.data_len.to_le_bytes());
    }

    /// Decode header from bytes.
    ///
    /// Fails with [`BtpError::MalformedHeader`] if fewer than 5 bytes are
    /// supplied. Extra bytes are ignored.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(BtpError::MalformedHeader {
                expected: HEADER_SIZE,
                actual: buf.len(),
            });
        }
        Ok(Self {
            service_id: buf[0],
            opcode: buf[1],
            controller_index: buf[2],
            data_len: u16::from_le_bytes([buf[3], buf[4]]),
        })
    }

    /// Check if this header carries an unsolicited event.
    #[inline]
    pub fn is_event(&self) -> bool {
        self.opcode >= EVENT_OPCODE_MIN
    }

    /// Check if this header carries the generic error status.
    #[inline]
    pub fn is_error(&self) -> bool {
        self.opcode == OP_ERROR
    }
}

/// Decode a header from bytes (standalone function).
#[inline]
pub fn decode_header(buf: &[u8]) -> Result<Header> {
    Header::decode(buf)
}

/// Take exactly `len` payload bytes from `buf`, unchanged.
pub fn decode_payload(buf: &[u8], len: usize) -> Result<&[u8]> {
    buf.get(..len).ok_or(BtpError::Truncated {
        expected: len,
        actual: buf.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_length_is_little_endian() {
        let bytes = Header::new(0x01, 0x02, 0x03, 0x0A0B).encode();

        assert_eq!(bytes[0], 0x01);
        assert_eq!(bytes[1], 0x02);
        assert_eq!(bytes[2], 0x03);
        assert_eq!(bytes[3], 0x0B);
        assert_eq!(bytes[4], 0x0A);
    }

    #[test]
    fn test_header_size_is_exactly_5() {
        assert_eq!(HEADER_SIZE, 5);
        assert_eq!(Header::new(0, 0, INDEX_NONE, 0).encode().len(), 5);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        let err = Header::decode(&[0u8; 4]).unwrap_err();
        assert!(matches!(
            err,
            BtpError::MalformedHeader {
                expected: 5,
                actual: 4
            }
        ));
        assert!(decode_header(&[]).is_err());
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let header = decode_header(&[0x02, 0x81, 0x00, 0x02, 0x00, 0xAA, 0xBB]).unwrap();
        assert_eq!(header, Header::new(0x02, 0x81, 0x00, 2));
    }

    #[test]
    fn test_header_field_extremes() {
        for (service_id, opcode, index, len) in [
            (0u8, 0u8, 0u8, 0u16),
            (0xff, 0xff, INDEX_NONE, u16::MAX),
            (0x1b, 0x80, 0x01, 0x0100),
        ] {
            let header = Header::new(service_id, opcode, index, len);
            assert_eq!(Header::decode(&header.encode()).unwrap(), header);
        }
    }

    #[test]
    fn test_decode_payload_exact_length() {
        let buf = [1u8, 2, 3, 4];
        assert_eq!(decode_payload(&buf, 3).unwrap(), &[1, 2, 3]);
        assert_eq!(decode_payload(&buf, 0).unwrap(), &[] as &[u8]);
        assert!(matches!(
            decode_payload(&buf, 5),
            Err(BtpError::Truncated {
                expected: 5,
                actual: 4
            })
        ));
    }

    #[test]
    fn test_event_and_error_classification() {
        assert!(Header::new(0, 0x80, 0, 0).is_event());
        assert!(!Header::new(0, 0x7f, 0, 0).is_event());
        assert!(Header::new(3, OP_ERROR, 0, 1).is_error());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Status::from(0x03), Status::NotReady);
        assert_eq!(Status::from(0x42), Status::Other(0x42));
        assert_eq!(u8::from(Status::InvalidIndex), 0x04);
        assert_eq!(u8::from(Status::Other(0x42)), 0x42);
    }
}
