//! MMI test case engine.
//!
//! - [`mmi`]: prompt type, style codes, argument extraction
//! - [`response`]: per-wid table values and reply encoding
//! - [`action`]: work bound to prompts (processes and invocations)
//! - [`status`]: verdict engine log types and test case status
//! - [`case`]: [`TestCase`], which answers prompts

pub mod action;
pub mod case;
pub mod mmi;
pub mod response;
pub mod status;

pub use action::{Action, ActionArg, ActionContext, ActionKind, BoxFuture, InvokeFn};
pub use case::{TestCase, TestCaseReport, WidHandler, DEFAULT_RESPONSE_POLL, DEFAULT_RESPONSE_WAIT};
pub use mmi::{parse_mmi_args, MmiPrompt, MmiStyle};
pub use response::{encode_reply, DescriptionArgsFn, DescriptionFn, WidReply, WidValue};
pub use status::{LogType, TestCaseStatus};
