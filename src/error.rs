//! Error types for btp-harness.

use std::time::Duration;

use thiserror::Error;

use crate::protocol::Status;

/// Main error type for all BTP and test case operations.
#[derive(Debug, Error)]
pub enum BtpError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Fewer than 5 header bytes were supplied.
    #[error("Malformed header: need {expected} bytes, got {actual}")]
    MalformedHeader { expected: usize, actual: usize },

    /// Payload shorter than the length announced in the header.
    #[error("Truncated payload: need {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// Payload does not fit the 16-bit length field.
    #[error("Payload of {0} bytes exceeds the 16-bit length field")]
    PayloadTooLarge(usize),

    /// No complete frame arrived before the deadline.
    #[error("Timed out after {0:?} waiting for BTP frame")]
    Timeout(Duration),

    /// Peer closed the socket.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A command was sent while the previous one still awaits its reply.
    #[error("Exchange pending: svc=0x{service_id:02x} op=0x{opcode:02x} has not been answered")]
    ExchangePending { service_id: u8, opcode: u8 },

    /// Response came back on a different service than the command.
    #[error("Service mismatch: sent 0x{sent:02x}, received 0x{received:02x}")]
    ServiceMismatch { sent: u8, received: u8 },

    /// Response opcode differs from the one the caller expected.
    #[error("Unexpected opcode: expected 0x{expected:02x}, received 0x{received:02x}")]
    UnexpectedOpcode { expected: u8, received: u8 },

    /// IUT answered with the generic error status opcode.
    #[error("IUT returned error status {0:?}")]
    RemoteError(Status),

    /// A post-wid action failed on the deferred worker.
    #[error("Deferred action queued at wid {wid} failed: {source}")]
    DeferredAction {
        wid: u32,
        #[source]
        source: Box<BtpError>,
    },

    /// An action could not be run.
    #[error("Action '{name}' failed: {reason}")]
    ActionFailed { name: String, reason: String },

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No test case is active in the session.
    #[error("No active test case")]
    NoActiveTestCase,

    /// Verdict engine passed a style code outside the known set.
    #[error("Unknown MMI style 0x{0:x}")]
    UnknownStyle(u32),
}

impl BtpError {
    /// Convenience constructor for [`BtpError::ActionFailed`].
    pub fn action(name: impl Into<String>, reason: impl ToString) -> Self {
        BtpError::ActionFailed {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias using BtpError.
pub type Result<T> = std::result::Result<T, BtpError>;
