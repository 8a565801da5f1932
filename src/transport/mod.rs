//! Transport module - the single BTP socket.
//!
//! Provides:
//! - [`BtpListener`] - binds the rendezvous socket and accepts the IUT
//! - [`Transport`] - blocking-style framed send/read with optional timeout

mod pipe;

pub use pipe::{generate_socket_path, BtpListener, Transport};
