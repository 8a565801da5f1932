//! # btp-harness
//!
//! BTP transport and MMI test case engine for Bluetooth qualification
//! automation.
//!
//! The crate connects a Bluetooth stack under test (the IUT) to a test
//! verdict engine:
//!
//! - **BTP** (Unix socket): 5-byte framed commands, responses and events
//!   exchanged with the IUT, strictly half-duplex
//! - **MMI**: interactive prompts from the verdict engine, answered by a
//!   [`TestCase`] that drives the IUT while it answers
//!
//! ## Architecture
//!
//! - [`protocol`]: frame codec
//! - [`transport`]: listener and framed socket
//! - [`correlator`]: command/response pairing, shared [`BtpHandle`]
//! - [`dispatch`]: routing of unsolicited events to service state
//! - [`testcase`]: prompt arbitration, actions and status
//! - [`session`]: one IUT connection and its active test case
//!
//! ## Example
//!
//! ```ignore
//! use btp_harness::{Action, Session, TestCase};
//!
//! #[tokio::main]
//! async fn main() -> btp_harness::Result<()> {
//!     let mut session = Session::builder().open().await?;
//!     session.wait_iut_ready().await?;
//!
//!     let case = TestCase::new("GAP", "GAP/CONN/NCON/BV-01-C")
//!         .no_wid(5)
//!         .edit1_wid(10, "000000")
//!         .action(Action::process("btmon", ["-w", "/tmp/trace.log"]));
//!     session.start_test_case(case).await?;
//!     // Verdict engine drives session.answer() and session.log() here.
//!     let status = session.finish_test_case().await?;
//!     println!("{}", status);
//!     session.close().await
//! }
//! ```

pub mod core_service;
pub mod correlator;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod session;
pub mod testcase;
pub mod transport;
pub mod wait;

pub use correlator::BtpHandle;
pub use error::{BtpError, Result};
pub use session::{Session, SessionBuilder, SessionConfig};
pub use testcase::{
    Action, ActionArg, ActionContext, MmiPrompt, MmiStyle, TestCase, TestCaseStatus, WidReply,
    WidValue,
};
pub use wait::PendingResponse;
