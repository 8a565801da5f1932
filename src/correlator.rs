//! Command/response correlation over the BTP transport.
//!
//! BTP is strictly half-duplex: a command is written, then the very next
//! frame read is its response. [`Correlator`] enforces that with a single
//! [`PendingExchange`] slot and validates the response header against it.
//! [`BtpHandle`] is the cloneable, lock-protected front end every
//! collaborator (profile wrappers, test case actions) talks through.
//!
//! # Example
//!
//! ```ignore
//! use btp_harness::protocol::{INDEX_NONE, SERVICE_ID_CORE};
//!
//! // read supported services
//! let rsp = btp.send_wait_rsp(SERVICE_ID_CORE, 0x02, INDEX_NONE, (), Some(0x02)).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Mutex;

use crate::dispatch::EventRouter;
use crate::error::{BtpError, Result};
use crate::protocol::{Frame, IntoPayload, Status, EVENT_OPCODE_MIN};
use crate::transport::Transport;

/// The command most recently sent, awaiting its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingExchange {
    pub service_id: u8,
    pub opcode: u8,
    pub controller_index: u8,
}

/// Pairs each outbound command with the next inbound frame.
pub struct Correlator {
    transport: Transport,
    pending: Option<PendingExchange>,
}

impl Correlator {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            pending: None,
        }
    }

    /// The exchange awaiting a response, if any.
    pub fn pending(&self) -> Option<PendingExchange> {
        self.pending
    }

    /// Send a command without reading the response.
    ///
    /// Fails with [`BtpError::ExchangePending`] if the previous command has
    /// not been answered yet.
    pub async fn send(
        &mut self,
        service_id: u8,
        opcode: u8,
        controller_index: u8,
        data: impl IntoPayload,
    ) -> Result<()> {
        if let Some(pending) = self.pending {
            return Err(BtpError::ExchangePending {
                service_id: pending.service_id,
                opcode: pending.opcode,
            });
        }

        let frame = Frame::new(service_id, opcode, controller_index, data)?;
        self.transport.send(&frame).await?;
        self.pending = Some(PendingExchange {
            service_id,
            opcode,
            controller_index,
        });
        Ok(())
    }

    /// Read the response to the pending command and validate it.
    ///
    /// The pending exchange is cleared whatever the outcome.
    pub async fn read_rsp(
        &mut self,
        expected_opcode: Option<u8>,
        timeout: Option<Duration>,
    ) -> Result<Bytes> {
        let pending = self.pending.take();
        let frame = self.transport.read(timeout).await?;
        let header = frame.header;

        if let Some(pending) = pending {
            if header.service_id != pending.service_id {
                return Err(BtpError::ServiceMismatch {
                    sent: pending.service_id,
                    received: header.service_id,
                });
            }
        }

        if header.is_error() {
            let status = frame
                .payload()
                .first()
                .copied()
                .map(Status::from)
                .unwrap_or(Status::Fail);
            tracing::warn!(
                "IUT error status {:?} for svc=0x{:02x}",
                status,
                header.service_id
            );
            return Err(BtpError::RemoteError(status));
        }

        if let Some(expected) = expected_opcode {
            if header.opcode != expected {
                return Err(BtpError::UnexpectedOpcode {
                    expected,
                    received: header.opcode,
                });
            }
        }

        Ok(frame.payload)
    }

    /// Send a command and return the payload of its validated response.
    pub async fn send_wait_rsp(
        &mut self,
        service_id: u8,
        opcode: u8,
        controller_index: u8,
        data: impl IntoPayload,
        expected_opcode: Option<u8>,
        timeout: Option<Duration>,
    ) -> Result<Bytes> {
        self.send(service_id, opcode, controller_index, data).await?;
        self.read_rsp(expected_opcode, timeout).await
    }

    /// Read the next frame, which the caller knows to be an event.
    pub async fn read_event(&mut self, timeout: Option<Duration>) -> Result<Frame> {
        if let Some(pending) = self.pending {
            return Err(BtpError::ExchangePending {
                service_id: pending.service_id,
                opcode: pending.opcode,
            });
        }

        let frame = self.transport.read(timeout).await?;
        if !frame.is_event() {
            return Err(BtpError::UnexpectedOpcode {
                expected: EVENT_OPCODE_MIN,
                received: frame.opcode(),
            });
        }
        Ok(frame)
    }

    /// Shut down the underlying transport.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.transport.shutdown().await
    }
}

/// Shared handle to the session's correlator and event router.
///
/// Holding the lock for a whole exchange is what keeps the foreground
/// caller and deferred test case actions from interleaving frames.
#[derive(Clone)]
pub struct BtpHandle {
    correlator: Arc<Mutex<Correlator>>,
    router: Arc<EventRouter>,
    rsp_timeout: Option<Duration>,
}

impl BtpHandle {
    pub fn new(transport: Transport, router: EventRouter, rsp_timeout: Option<Duration>) -> Self {
        Self {
            correlator: Arc::new(Mutex::new(Correlator::new(transport))),
            router: Arc::new(router),
            rsp_timeout,
        }
    }

    /// Event routing table shared by this handle.
    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Default response timeout.
    pub fn rsp_timeout(&self) -> Option<Duration> {
        self.rsp_timeout
    }

    /// Send a command without waiting for its response.
    pub async fn send(
        &self,
        service_id: u8,
        opcode: u8,
        controller_index: u8,
        data: impl IntoPayload,
    ) -> Result<()> {
        self.correlator
            .lock()
            .await
            .send(service_id, opcode, controller_index, data)
            .await
    }

    /// Read the response to a command sent with [`BtpHandle::send`].
    pub async fn read_rsp(&self, expected_opcode: Option<u8>) -> Result<Bytes> {
        self.correlator
            .lock()
            .await
            .read_rsp(expected_opcode, self.rsp_timeout)
            .await
    }

    /// Send a command and wait for its response using the default timeout.
    pub async fn send_wait_rsp(
        &self,
        service_id: u8,
        opcode: u8,
        controller_index: u8,
        data: impl IntoPayload,
        expected_opcode: Option<u8>,
    ) -> Result<Bytes> {
        self.send_wait_rsp_timeout(
            service_id,
            opcode,
            controller_index,
            data,
            expected_opcode,
            self.rsp_timeout,
        )
        .await
    }

    /// Send a command and wait for its response with an explicit timeout.
    pub async fn send_wait_rsp_timeout(
        &self,
        service_id: u8,
        opcode: u8,
        controller_index: u8,
        data: impl IntoPayload,
        expected_opcode: Option<u8>,
        timeout: Option<Duration>,
    ) -> Result<Bytes> {
        let mut correlator = self.correlator.lock().await;
        correlator
            .send_wait_rsp(
                service_id,
                opcode,
                controller_index,
                data,
                expected_opcode,
                timeout,
            )
            .await
    }

    /// Send a command whose response echoes the command opcode.
    pub async fn command(
        &self,
        service_id: u8,
        opcode: u8,
        controller_index: u8,
        data: impl IntoPayload,
    ) -> Result<Bytes> {
        self.send_wait_rsp(service_id, opcode, controller_index, data, Some(opcode))
            .await
    }

    /// Read one event frame and route it through the event router.
    pub async fn wait_event(&self, timeout: Option<Duration>) -> Result<Frame> {
        let frame = self.correlator.lock().await.read_event(timeout).await?;
        self.router.dispatch(&frame.header, frame.payload());
        Ok(frame)
    }

    /// Read one event, route it and check it is the one expected.
    pub async fn expect_event(
        &self,
        service_id: u8,
        opcode: u8,
        timeout: Option<Duration>,
    ) -> Result<Frame> {
        let frame = self.wait_event(timeout).await?;
        if frame.service_id() != service_id {
            return Err(BtpError::ServiceMismatch {
                sent: service_id,
                received: frame.service_id(),
            });
        }
        if frame.opcode() != opcode {
            return Err(BtpError::UnexpectedOpcode {
                expected: opcode,
                received: frame.opcode(),
            });
        }
        Ok(frame)
    }

    /// Shut down the transport.
    pub async fn shutdown(&self) -> Result<()> {
        self.correlator.lock().await.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::dispatch::ServiceRoutes;
    use crate::protocol::{Header, HEADER_SIZE, INDEX_NONE, OP_ERROR};
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

    fn correlator() -> (Correlator, DuplexStream) {
        let (client, server) = duplex(1024);
        (Correlator::new(Transport::from_stream(client)), server)
    }

    async fn read_command(iut: &mut DuplexStream) -> (Header, Vec<u8>) {
        let mut raw = [0u8; HEADER_SIZE];
        iut.read_exact(&mut raw).await.unwrap();
        let header = Header::decode(&raw).unwrap();
        let mut payload = vec![0u8; header.data_len as usize];
        iut.read_exact(&mut payload).await.unwrap();
        (header, payload)
    }

    async fn reply(iut: &mut DuplexStream, svc: u8, op: u8, payload: &[u8]) {
        let bytes = crate::protocol::encode(svc, op, INDEX_NONE, payload).unwrap();
        iut.write_all(&bytes).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_wait_rsp_returns_payload() {
        let (mut correlator, mut iut) = correlator();

        let iut_task = tokio::spawn(async move {
            let (header, payload) = read_command(&mut iut).await;
            assert_eq!(header, Header::new(0x00, 0x03, INDEX_NONE, 1));
            assert_eq!(payload, vec![0x04]);
            reply(&mut iut, 0x00, 0x03, &[]).await;
            iut
        });

        let rsp = correlator
            .send_wait_rsp(0x00, 0x03, INDEX_NONE, 0x04u8, Some(0x03), None)
            .await
            .unwrap();
        assert!(rsp.is_empty());
        assert!(correlator.pending().is_none());
        iut_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_service_mismatch_for_every_pair() {
        let services = [0x00u8, 0x01, 0x02, 0x1b];
        for &sent in &services {
            for &received in services.iter().filter(|&&s| s != sent) {
                let (mut correlator, mut iut) = correlator();
                let iut_task = tokio::spawn(async move {
                    read_command(&mut iut).await;
                    reply(&mut iut, received, 0x01, &[]).await;
                    iut
                });

                let err = correlator
                    .send_wait_rsp(sent, 0x01, 0, (), None, None)
                    .await
                    .unwrap_err();
                assert!(
                    matches!(err, BtpError::ServiceMismatch { sent: s, received: r } if s == sent && r == received)
                );
                iut_task.await.unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_error_opcode_is_remote_error() {
        let (mut correlator, mut iut) = correlator();
        let iut_task = tokio::spawn(async move {
            read_command(&mut iut).await;
            reply(&mut iut, 0x02, OP_ERROR, &[0x03]).await;
            iut
        });

        let err = correlator
            .send_wait_rsp(0x02, 0x05, 0, (), Some(0x05), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BtpError::RemoteError(Status::NotReady)));
        assert!(correlator.pending().is_none());
        iut_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_unexpected_opcode() {
        let (mut correlator, mut iut) = correlator();
        let iut_task = tokio::spawn(async move {
            read_command(&mut iut).await;
            reply(&mut iut, 0x02, 0x06, &[]).await;
            iut
        });

        let err = correlator
            .send_wait_rsp(0x02, 0x05, 0, (), Some(0x05), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BtpError::UnexpectedOpcode {
                expected: 0x05,
                received: 0x06
            }
        ));
        iut_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_no_pipelining() {
        let (mut correlator, _iut) = correlator();

        correlator.send(0x01, 0x02, 0, ()).await.unwrap();
        assert_eq!(
            correlator.pending(),
            Some(PendingExchange {
                service_id: 0x01,
                opcode: 0x02,
                controller_index: 0
            })
        );

        let err = correlator.send(0x01, 0x03, 0, ()).await.unwrap_err();
        assert!(matches!(
            err,
            BtpError::ExchangePending {
                service_id: 0x01,
                opcode: 0x02
            }
        ));
    }

    #[tokio::test]
    async fn test_timeout_clears_pending() {
        let (mut correlator, _iut) = correlator();

        let err = correlator
            .send_wait_rsp(0x01, 0x02, 0, (), None, Some(Duration::from_millis(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, BtpError::Timeout(_)));
        assert!(correlator.pending().is_none());
    }

    #[tokio::test]
    async fn test_handle_routes_events() {
        let (client, mut iut) = duplex(1024);
        let seen = Arc::new(StdMutex::new(Vec::<u8>::new()));

        let mut router = EventRouter::new();
        router.register(
            ServiceRoutes::new(0x01)
                .with_state(seen.clone())
                .on(0x81, |s: &mut Vec<u8>, data, _| s.extend_from_slice(data)),
        );
        let btp = BtpHandle::new(Transport::from_stream(client), router, None);

        reply(&mut iut, 0x01, 0x81, &[0xAB]).await;
        let frame = btp.expect_event(0x01, 0x81, None).await.unwrap();
        assert_eq!(frame.payload(), &[0xAB]);
        assert_eq!(*seen.lock().unwrap(), vec![0xAB]);

        // Unrouted events are returned but not fatal.
        reply(&mut iut, 0x05, 0x80, &[]).await;
        let frame = btp.wait_event(None).await.unwrap();
        assert_eq!(frame.service_id(), 0x05);

        // A response where an event was expected is rejected.
        reply(&mut iut, 0x01, 0x01, &[]).await;
        assert!(matches!(
            btp.wait_event(None).await,
            Err(BtpError::UnexpectedOpcode { .. })
        ));
    }
}
