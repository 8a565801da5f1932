//! Core service (service id 0) commands.
//!
//! Every IUT exposes the core service: it announces readiness with an
//! event and lets the tester enable or disable the other services.

use std::time::Duration;

use bytes::Bytes;

use crate::correlator::BtpHandle;
use crate::error::Result;
use crate::protocol::{INDEX_NONE, SERVICE_ID_CORE};

/// Read the bitmask of services the IUT implements.
pub const OP_READ_SUPPORTED_SERVICES: u8 = 0x02;
/// Enable a service.
pub const OP_REGISTER_SERVICE: u8 = 0x03;
/// Disable a service.
pub const OP_UNREGISTER_SERVICE: u8 = 0x04;
/// Event sent once the IUT accepts commands.
pub const EV_IUT_READY: u8 = 0x80;

/// Wait for the IUT-ready event.
pub async fn wait_iut_ready(btp: &BtpHandle, timeout: Duration) -> Result<()> {
    tracing::info!("Waiting up to {:?} for IUT ready", timeout);
    btp.expect_event(SERVICE_ID_CORE, EV_IUT_READY, Some(timeout))
        .await?;
    tracing::info!("IUT ready");
    Ok(())
}

/// Bitmask of supported service ids, bit `n` of the vector for service `n`.
pub async fn read_supported_services(btp: &BtpHandle) -> Result<Bytes> {
    btp.command(SERVICE_ID_CORE, OP_READ_SUPPORTED_SERVICES, INDEX_NONE, ())
        .await
}

/// True if `mask` (as returned by [`read_supported_services`]) has
/// `service_id` set.
pub fn service_supported(mask: &[u8], service_id: u8) -> bool {
    mask.get(usize::from(service_id / 8))
        .map(|byte| byte & (1 << (service_id % 8)) != 0)
        .unwrap_or(false)
}

pub async fn register_service(btp: &BtpHandle, service_id: u8) -> Result<()> {
    tracing::debug!("Registering service 0x{:02x}", service_id);
    btp.command(SERVICE_ID_CORE, OP_REGISTER_SERVICE, INDEX_NONE, service_id)
        .await?;
    Ok(())
}

pub async fn unregister_service(btp: &BtpHandle, service_id: u8) -> Result<()> {
    tracing::debug!("Unregistering service 0x{:02x}", service_id);
    btp.command(SERVICE_ID_CORE, OP_UNREGISTER_SERVICE, INDEX_NONE, service_id)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::EventRouter;
    use crate::error::BtpError;
    use crate::protocol::{encode, Header, Status, HEADER_SIZE, OP_ERROR};
    use crate::transport::Transport;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

    fn handle() -> (BtpHandle, DuplexStream) {
        let (client, iut) = duplex(1024);
        let btp = BtpHandle::new(
            Transport::from_stream(client),
            EventRouter::new(),
            Some(Duration::from_secs(1)),
        );
        (btp, iut)
    }

    async fn read_command(iut: &mut DuplexStream) -> (Header, Vec<u8>) {
        let mut raw = [0u8; HEADER_SIZE];
        iut.read_exact(&mut raw).await.unwrap();
        let header = Header::decode(&raw).unwrap();
        let mut payload = vec![0u8; header.data_len as usize];
        iut.read_exact(&mut payload).await.unwrap();
        (header, payload)
    }

    #[tokio::test]
    async fn test_wait_iut_ready() {
        let (btp, mut iut) = handle();
        iut.write_all(&encode(SERVICE_ID_CORE, EV_IUT_READY, INDEX_NONE, ()).unwrap())
            .await
            .unwrap();

        wait_iut_ready(&btp, Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_iut_ready_times_out() {
        let (btp, _iut) = handle();
        let err = wait_iut_ready(&btp, Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, BtpError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_register_service_frame() {
        let (btp, mut iut) = handle();
        let iut_task = tokio::spawn(async move {
            let (header, payload) = read_command(&mut iut).await;
            assert_eq!(header, Header::new(SERVICE_ID_CORE, OP_REGISTER_SERVICE, INDEX_NONE, 1));
            assert_eq!(payload, vec![0x01]);
            iut.write_all(&encode(SERVICE_ID_CORE, OP_REGISTER_SERVICE, INDEX_NONE, ()).unwrap())
                .await
                .unwrap();
            iut
        });

        register_service(&btp, 0x01).await.unwrap();
        iut_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_unregister_service_remote_error() {
        let (btp, mut iut) = handle();
        let iut_task = tokio::spawn(async move {
            let (header, _) = read_command(&mut iut).await;
            assert_eq!(header.opcode, OP_UNREGISTER_SERVICE);
            iut.write_all(&encode(SERVICE_ID_CORE, OP_ERROR, INDEX_NONE, &[0x01]).unwrap())
                .await
                .unwrap();
            iut
        });

        let err = unregister_service(&btp, 0x02).await.unwrap_err();
        assert!(matches!(err, BtpError::RemoteError(Status::Fail)));
        iut_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_read_supported_services() {
        let (btp, mut iut) = handle();
        let iut_task = tokio::spawn(async move {
            let (header, payload) = read_command(&mut iut).await;
            assert_eq!(header.opcode, OP_READ_SUPPORTED_SERVICES);
            assert!(payload.is_empty());
            iut.write_all(
                &encode(SERVICE_ID_CORE, OP_READ_SUPPORTED_SERVICES, INDEX_NONE, &[0x07, 0x01]).unwrap(),
            )
            .await
            .unwrap();
            iut
        });

        let mask = read_supported_services(&btp).await.unwrap();
        assert_eq!(&mask[..], &[0x07, 0x01]);
        assert!(service_supported(&mask, 0));
        assert!(service_supported(&mask, 2));
        assert!(!service_supported(&mask, 3));
        assert!(service_supported(&mask, 8));
        assert!(!service_supported(&mask, 16));
        iut_task.await.unwrap();
    }
}
