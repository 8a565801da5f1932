//! Event routing table.
//!
//! The router maps a service id to the handlers registered for that
//! service's event opcodes, plus the mutable state object those handlers
//! update. Profile modules populate it once at startup.
//!
//! # Example
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use btp_harness::dispatch::{EventRouter, ServiceRoutes};
//! use btp_harness::protocol::Header;
//!
//! #[derive(Default)]
//! struct GapState {
//!     connected: bool,
//! }
//!
//! let state = Arc::new(Mutex::new(GapState::default()));
//! let mut router = EventRouter::new();
//! router.register(
//!     ServiceRoutes::new(0x01)
//!         .with_state(state.clone())
//!         .on(0x82, |s: &mut GapState, _data, _len| s.connected = true),
//! );
//!
//! assert!(router.dispatch(&Header::new(0x01, 0x82, 0, 0), &[]));
//! assert!(state.lock().unwrap().connected);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::protocol::Header;

/// Event handler signature: `(state, payload, data_len)`.
pub type EventHandler<S> = Box<dyn Fn(&mut S, &[u8], u16) + Send + Sync + 'static>;

/// Type-erased per-service routing entry.
pub trait ServiceEvents: Send + Sync + 'static {
    /// Service id this entry routes.
    fn service_id(&self) -> u8;

    /// Route one event. Returns `false` when nothing handled it.
    fn handle(&self, opcode: u8, payload: &[u8], data_len: u16) -> bool;
}

/// Handlers and state for one service.
pub struct ServiceRoutes<S> {
    service_id: u8,
    state: Option<Arc<Mutex<S>>>,
    handlers: HashMap<u8, EventHandler<S>>,
}

impl<S: Send + 'static> ServiceRoutes<S> {
    /// Create an empty entry without a state object.
    pub fn new(service_id: u8) -> Self {
        Self {
            service_id,
            state: None,
            handlers: HashMap::new(),
        }
    }

    /// Attach the state object handlers mutate.
    pub fn with_state(mut self, state: Arc<Mutex<S>>) -> Self {
        self.state = Some(state);
        self
    }

    /// Register a handler for an event opcode.
    pub fn on<F>(mut self, opcode: u8, handler: F) -> Self
    where
        F: Fn(&mut S, &[u8], u16) + Send + Sync + 'static,
    {
        self.handlers.insert(opcode, Box::new(handler));
        self
    }
}

impl<S: Send + 'static> ServiceEvents for ServiceRoutes<S> {
    fn service_id(&self) -> u8 {
        self.service_id
    }

    fn handle(&self, opcode: u8, payload: &[u8], data_len: u16) -> bool {
        let (Some(handler), Some(state)) = (self.handlers.get(&opcode), self.state.as_ref()) else {
            return false;
        };

        // A handler that panicked leaves usable state behind; keep routing.
        let mut guard = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        handler(&mut *guard, payload, data_len);
        true
    }
}

/// Routing table from service id to its event handlers.
#[derive(Default)]
pub struct EventRouter {
    services: HashMap<u8, Box<dyn ServiceEvents>>,
}

impl EventRouter {
    /// Create a new empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the routes for one service.
    pub fn register<T: ServiceEvents>(&mut self, routes: T) {
        let service_id = routes.service_id();
        if self.services.insert(service_id, Box::new(routes)).is_some() {
            tracing::debug!("Replaced event routes for service 0x{:02x}", service_id);
        }
    }

    /// Check whether any routes exist for a service.
    pub fn has_service(&self, service_id: u8) -> bool {
        self.services.contains_key(&service_id)
    }

    /// Route an event frame to its handler.
    ///
    /// Returns `true` if a handler ran. Unroutable events are logged and
    /// dropped; they are never an error.
    pub fn dispatch(&self, header: &Header, payload: &[u8]) -> bool {
        let handled = self
            .services
            .get(&header.service_id)
            .map(|routes| routes.handle(header.opcode, payload, header.data_len))
            .unwrap_or(false);

        if !handled {
            tracing::warn!(
                "Unhandled event: svc=0x{:02x} op=0x{:02x} len={}",
                header.service_id,
                header.opcode,
                header.data_len
            );
        }
        handled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        hits: u32,
        last: Vec<u8>,
        last_len: u16,
    }

    fn counter_routes(state: Arc<Mutex<Counter>>) -> ServiceRoutes<Counter> {
        ServiceRoutes::new(0x02)
            .with_state(state)
            .on(0x80, |s: &mut Counter, data, len| {
                s.hits += 1;
                s.last = data.to_vec();
                s.last_len = len;
            })
    }

    #[test]
    fn test_dispatch_invokes_handler_with_state() {
        let state = Arc::new(Mutex::new(Counter::default()));
        let mut router = EventRouter::new();
        router.register(counter_routes(state.clone()));

        assert!(router.dispatch(&Header::new(0x02, 0x80, 0, 2), &[7, 8]));

        let s = state.lock().unwrap();
        assert_eq!(s.hits, 1);
        assert_eq!(s.last, vec![7, 8]);
        assert_eq!(s.last_len, 2);
    }

    #[test]
    fn test_unknown_service_is_unhandled() {
        let router = EventRouter::new();
        assert!(!router.dispatch(&Header::new(0x09, 0x80, 0, 0), &[]));
    }

    #[test]
    fn test_unknown_opcode_is_unhandled() {
        let state = Arc::new(Mutex::new(Counter::default()));
        let mut router = EventRouter::new();
        router.register(counter_routes(state.clone()));

        assert!(!router.dispatch(&Header::new(0x02, 0x81, 0, 0), &[]));
        assert_eq!(state.lock().unwrap().hits, 0);
    }

    #[test]
    fn test_missing_state_is_unhandled() {
        let mut router = EventRouter::new();
        router.register(ServiceRoutes::<Counter>::new(0x03).on(0x80, |s, _, _| s.hits += 1));

        assert!(router.has_service(0x03));
        assert!(!router.dispatch(&Header::new(0x03, 0x80, 0, 0), &[]));
    }

    #[test]
    fn test_register_replaces_service() {
        let first = Arc::new(Mutex::new(Counter::default()));
        let second = Arc::new(Mutex::new(Counter::default()));
        let mut router = EventRouter::new();
        router.register(counter_routes(first.clone()));
        router.register(counter_routes(second.clone()));

        router.dispatch(&Header::new(0x02, 0x80, 0, 0), &[]);
        assert_eq!(first.lock().unwrap().hits, 0);
        assert_eq!(second.lock().unwrap().hits, 1);
    }
}
