//! Dispatch module - routing of unsolicited BTP events.
//!
//! Provides:
//! - [`EventRouter`] - maps service ids to per-opcode handlers
//! - [`ServiceRoutes`] - one service's handlers and its state object
//!
//! There is no event pump: whoever reads a frame it knows to be an event
//! hands it to [`EventRouter::dispatch`] on its own task.

mod registry;

pub use registry::{EventHandler, EventRouter, ServiceEvents, ServiceRoutes};
