//! Session: one IUT connection and the test case running against it.
//!
//! The verdict engine talks to a session through two calls:
//! [`Session::answer`] for MMI prompts and [`Session::log`] for log
//! records. Everything else (profile wrappers, actions, generic handlers)
//! reaches the IUT through the cloneable [`BtpHandle`].
//!
//! # Example
//!
//! ```ignore
//! use btp_harness::{Session, TestCase};
//!
//! let mut session = Session::builder()
//!     .socket_path("/tmp/bt-stack-tester")
//!     .open()
//!     .await?;
//! session.wait_iut_ready().await?;
//!
//! session
//!     .start_test_case(TestCase::new("GAP", "GAP/DISC/GENM/BV-01-C"))
//!     .await?;
//! // ... verdict engine calls session.answer() / session.log() ...
//! let status = session.finish_test_case().await?;
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::core_service;
use crate::correlator::BtpHandle;
use crate::dispatch::{EventRouter, ServiceEvents};
use crate::error::{BtpError, Result};
use crate::testcase::{
    ActionContext, LogType, MmiPrompt, MmiStyle, TestCase, TestCaseReport, TestCaseStatus,
};
use crate::transport::{BtpListener, Transport};
use crate::wait::PendingResponse;

/// Default rendezvous socket.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/bt-stack-tester";

/// Session settings. Durations are in milliseconds on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Unix socket the IUT connects to.
    pub socket_path: PathBuf,
    /// Default command response timeout; 0 waits forever.
    pub rsp_timeout_ms: u64,
    /// Timeout for the IUT-ready event.
    pub iut_ready_timeout_ms: u64,
    /// How long a `Wait` reply polls the pending response.
    pub response_wait_ms: u64,
    /// Poll interval of a `Wait` reply.
    pub response_poll_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            rsp_timeout_ms: 10_000,
            iut_ready_timeout_ms: 30_000,
            response_wait_ms: 90_000,
            response_poll_ms: 1_000,
        }
    }
}

impl SessionConfig {
    /// Parse from JSON; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.socket_path.as_os_str().is_empty() {
            return Err(BtpError::Config("socket_path is empty".into()));
        }
        if self.iut_ready_timeout_ms == 0 {
            return Err(BtpError::Config("iut_ready_timeout_ms must be > 0".into()));
        }
        if self.response_poll_ms == 0 {
            return Err(BtpError::Config("response_poll_ms must be > 0".into()));
        }
        if self.response_poll_ms > self.response_wait_ms {
            return Err(BtpError::Config(format!(
                "response_poll_ms ({}) exceeds response_wait_ms ({})",
                self.response_poll_ms, self.response_wait_ms
            )));
        }
        Ok(())
    }

    pub fn rsp_timeout(&self) -> Option<Duration> {
        match self.rsp_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn iut_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.iut_ready_timeout_ms)
    }

    pub fn response_wait(&self) -> Duration {
        Duration::from_millis(self.response_wait_ms)
    }

    pub fn response_poll(&self) -> Duration {
        Duration::from_millis(self.response_poll_ms)
    }
}

/// Builder for a [`Session`].
pub struct SessionBuilder {
    config: SessionConfig,
    router: EventRouter,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            config,
            router: EventRouter::new(),
        }
    }

    pub fn socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.socket_path = path.into();
        self
    }

    /// Default response timeout; `None` waits forever.
    pub fn rsp_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.rsp_timeout_ms = timeout.map(|t| t.as_millis() as u64).unwrap_or(0);
        self
    }

    pub fn iut_ready_timeout(mut self, timeout: Duration) -> Self {
        self.config.iut_ready_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Wait timeout and poll interval for `Wait` replies.
    pub fn response_wait(mut self, timeout: Duration, poll: Duration) -> Self {
        self.config.response_wait_ms = timeout.as_millis() as u64;
        self.config.response_poll_ms = poll.as_millis() as u64;
        self
    }

    /// Register a service's event handlers.
    pub fn routes<T: ServiceEvents>(mut self, routes: T) -> Self {
        self.router.register(routes);
        self
    }

    /// Bind the socket and wait for the IUT to connect.
    pub async fn open(self) -> Result<Session> {
        self.config.validate()?;
        let listener = BtpListener::bind(&self.config.socket_path)?;
        tracing::info!("Waiting for IUT on {}", listener.path().display());
        let transport = listener.accept().await?;
        Ok(Session::new(self.config, self.router, transport, Some(listener)))
    }

    /// Use an already-connected stream instead of the socket.
    pub fn connect_stream<S>(self, stream: S) -> Result<Session>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.config.validate()?;
        let transport = Transport::from_stream(stream);
        Ok(Session::new(self.config, self.router, transport, None))
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A connected IUT plus the active test case.
pub struct Session {
    config: SessionConfig,
    btp: BtpHandle,
    pending: PendingResponse,
    test_case: Option<TestCase>,
    last_report: Option<TestCaseReport>,
    _listener: Option<BtpListener>,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Bind, accept the IUT and return the session.
    pub async fn open(config: SessionConfig) -> Result<Self> {
        SessionBuilder::with_config(config).open().await
    }

    /// Session over an already-connected stream, with no event routes.
    pub fn from_stream<S>(stream: S, config: SessionConfig) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        SessionBuilder::with_config(config).connect_stream(stream)
    }

    fn new(
        config: SessionConfig,
        router: EventRouter,
        transport: Transport,
        listener: Option<BtpListener>,
    ) -> Self {
        let btp = BtpHandle::new(transport, router, config.rsp_timeout());
        Self {
            config,
            btp,
            pending: PendingResponse::new(),
            test_case: None,
            last_report: None,
            _listener: listener,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn btp(&self) -> &BtpHandle {
        &self.btp
    }

    /// Answer slot for `Wait` replies.
    pub fn pending(&self) -> &PendingResponse {
        &self.pending
    }

    /// Context handed to actions and handlers.
    pub fn context(&self) -> ActionContext {
        ActionContext::new(self.btp.clone(), self.pending.clone())
    }

    pub fn test_case(&self) -> Option<&TestCase> {
        self.test_case.as_ref()
    }

    /// Report of the most recently finished test case, kept even when its
    /// post-run failed.
    pub fn last_report(&self) -> Option<&TestCaseReport> {
        self.last_report.as_ref()
    }

    /// Wait for the IUT-ready event using the configured timeout.
    pub async fn wait_iut_ready(&self) -> Result<()> {
        core_service::wait_iut_ready(&self.btp, self.config.iut_ready_timeout()).await
    }

    /// Make `test_case` the active case and run its pre-run actions.
    ///
    /// A case still active is finished first.
    pub async fn start_test_case(&mut self, mut test_case: TestCase) -> Result<()> {
        if let Some(previous) = self.test_case.as_ref() {
            tracing::warn!(
                "Starting {} while {} is still active; finishing it",
                test_case.name(),
                previous.name()
            );
            self.finish_test_case().await?;
        }

        tracing::info!("Starting test case {}/{}", test_case.project(), test_case.name());
        test_case.set_response_wait(self.config.response_wait(), self.config.response_poll());
        test_case.reset().await?;

        let ctx = self.context();
        let result = test_case.pre_run(&ctx).await;
        self.test_case = Some(test_case);
        result
    }

    /// Answer an MMI prompt for the active test case.
    pub async fn answer(
        &mut self,
        project: &str,
        wid: u32,
        test_case: &str,
        description: &str,
        style_code: u32,
    ) -> Result<String> {
        let style = MmiStyle::try_from(style_code)?;
        let prompt = MmiPrompt::new(project, wid, test_case, description, style);
        let ctx = self.context();
        let active = self.test_case.as_mut().ok_or(BtpError::NoActiveTestCase)?;
        active.answer(&prompt, &ctx).await
    }

    /// Forward a verdict engine log record to the active test case.
    pub fn log(&mut self, log_type: u32, type_string: &str, time: &str, message: &str) {
        tracing::debug!("[{}] {} ({}): {}", time, type_string, log_type, message.trim());
        match self.test_case.as_mut() {
            Some(active) => active.on_log(LogType::from(log_type), message),
            None => tracing::debug!("Log record with no active test case"),
        }
    }

    /// Record a verdict engine error code on the active test case.
    pub fn record_engine_error(&mut self, code: i32) -> Result<()> {
        let active = self.test_case.as_mut().ok_or(BtpError::NoActiveTestCase)?;
        active.record_engine_error(code);
        Ok(())
    }

    /// Run post-run for the active case, clear it and return its status.
    pub async fn finish_test_case(&mut self) -> Result<TestCaseStatus> {
        let report = self.finish_with_report().await?;
        Ok(report.status)
    }

    /// Like [`Session::finish_test_case`] but with the full report.
    pub async fn finish_with_report(&mut self) -> Result<TestCaseReport> {
        let mut active = self.test_case.take().ok_or(BtpError::NoActiveTestCase)?;
        let ctx = self.context();
        let result = active.post_run(&ctx).await;
        let report = active.report();
        self.last_report = Some(report.clone());
        match result {
            Ok(()) => {
                tracing::info!("Finished {}/{}: {}", report.project, report.name, report.status);
                Ok(report)
            }
            Err(e) => {
                tracing::error!(
                    "Finished {}/{} with status {} but post-run failed: {}",
                    report.project,
                    report.name,
                    report.status,
                    e
                );
                Err(e)
            }
        }
    }

    /// Finish any active case and shut the transport.
    pub async fn close(mut self) -> Result<()> {
        if self.test_case.is_some() {
            if let Err(e) = self.finish_test_case().await {
                tracing::error!("Finishing test case on close failed: {}", e);
            }
        }
        self.btp.shutdown().await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(active) = &self.test_case {
            tracing::warn!(
                "Session dropped with test case {} still active ({})",
                active.name(),
                active.status()
            );
        }
    }
}
