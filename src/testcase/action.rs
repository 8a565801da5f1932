//! Actions a test case performs on the IUT side of a prompt.
//!
//! An action fires when a prompt with its `start_wid` arrives, is stopped
//! by `stop_wid`, or is queued for the deferred worker by `post_wid`.
//!
//! # Example
//!
//! ```ignore
//! use btp_harness::testcase::{Action, ActionArg};
//!
//! let write = Action::invoke("gatt_write", |ctx, args| async move {
//!     let handle = u16::from_str_radix(args[0].trim_start_matches("0x"), 16)
//!         .map_err(|e| BtpError::action("gatt_write", e))?;
//!     ctx.btp().command(0x04, 0x11, 0, handle.to_le_bytes().to_vec()).await?;
//!     Ok(())
//! })
//! .args([ActionArg::Mmi(0)])
//! .start_wid(69);
//! ```

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::correlator::BtpHandle;
use crate::error::{BtpError, Result};
use crate::wait::PendingResponse;

/// Boxed future for action results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Deferred call signature: context plus resolved string arguments.
pub type InvokeFn =
    Arc<dyn Fn(ActionContext, Vec<String>) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// What actions and handlers get to work with.
#[derive(Clone)]
pub struct ActionContext {
    btp: BtpHandle,
    pending: PendingResponse,
}

impl ActionContext {
    pub fn new(btp: BtpHandle, pending: PendingResponse) -> Self {
        Self { btp, pending }
    }

    /// Handle to the session's BTP channel.
    pub fn btp(&self) -> &BtpHandle {
        &self.btp
    }

    /// Answer slot for prompts waiting on an external response.
    pub fn pending(&self) -> &PendingResponse {
        &self.pending
    }
}

/// Argument of an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionArg {
    Value(String),
    /// Placeholder for the n-th token extracted from the prompt text.
    Mmi(usize),
}

impl From<&str> for ActionArg {
    fn from(value: &str) -> Self {
        ActionArg::Value(value.to_string())
    }
}

impl From<String> for ActionArg {
    fn from(value: String) -> Self {
        ActionArg::Value(value)
    }
}

pub enum ActionKind {
    /// External program started and killed around the prompts.
    Process {
        program: String,
        args: Vec<String>,
        child: Mutex<Option<Child>>,
    },
    /// Deferred call.
    Invocation { func: InvokeFn, args: Vec<ActionArg> },
}

/// One unit of work attached to a test case.
pub struct Action {
    name: String,
    kind: ActionKind,
    start_wid: Option<u32>,
    stop_wid: Option<u32>,
    post_wid: Option<u32>,
    skip_calls: HashSet<u32>,
    calls: AtomicU32,
    cleanup: bool,
}

impl Action {
    fn with_kind(name: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            name: name.into(),
            kind,
            start_wid: None,
            stop_wid: None,
            post_wid: None,
            skip_calls: HashSet::new(),
            calls: AtomicU32::new(0),
            cleanup: false,
        }
    }

    /// An invocation of an async function.
    pub fn invoke<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(ActionContext, Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let wrapped: InvokeFn = Arc::new(move |ctx, args| -> BoxFuture<'static, Result<()>> {
            Box::pin(func(ctx, args))
        });
        Self::with_kind(
            name,
            ActionKind::Invocation {
                func: wrapped,
                args: Vec::new(),
            },
        )
    }

    /// An external process.
    pub fn process<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let program = program.into();
        Self::with_kind(
            program.clone(),
            ActionKind::Process {
                program,
                args: args.into_iter().map(Into::into).collect(),
                child: Mutex::new(None),
            },
        )
    }

    /// Arguments passed to an invocation. Ignored for processes.
    pub fn args<I, A>(mut self, new_args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<ActionArg>,
    {
        if let ActionKind::Invocation { args, .. } = &mut self.kind {
            *args = new_args.into_iter().map(Into::into).collect();
        }
        self
    }

    pub fn start_wid(mut self, wid: u32) -> Self {
        self.start_wid = Some(wid);
        self
    }

    pub fn stop_wid(mut self, wid: u32) -> Self {
        self.stop_wid = Some(wid);
        self
    }

    pub fn post_wid(mut self, wid: u32) -> Self {
        self.post_wid = Some(wid);
        self
    }

    /// Call numbers (1-based) on which the action does nothing.
    pub fn skip_calls<I: IntoIterator<Item = u32>>(mut self, calls: I) -> Self {
        self.skip_calls = calls.into_iter().collect();
        self
    }

    /// Run once when the test case finishes instead of on a wid.
    pub fn cleanup(mut self) -> Self {
        self.cleanup = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    pub fn start_wid_value(&self) -> Option<u32> {
        self.start_wid
    }

    pub fn stop_wid_value(&self) -> Option<u32> {
        self.stop_wid
    }

    pub fn post_wid_value(&self) -> Option<u32> {
        self.post_wid
    }

    pub fn is_cleanup(&self) -> bool {
        self.cleanup
    }

    /// Times the action has been triggered.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::Acquire)
    }

    /// True if the action is bound to no wid at all.
    pub fn is_unbound(&self) -> bool {
        self.start_wid.is_none() && self.stop_wid.is_none() && self.post_wid.is_none()
    }

    /// True if any argument must be taken from the prompt text.
    pub fn has_placeholders(&self) -> bool {
        match &self.kind {
            ActionKind::Invocation { args, .. } => {
                args.iter().any(|arg| matches!(arg, ActionArg::Mmi(_)))
            }
            ActionKind::Process { .. } => false,
        }
    }

    pub(crate) fn reset_calls(&self) {
        self.calls.store(0, Ordering::Release);
    }

    /// Trigger the action.
    ///
    /// `mmi_args` are the tokens extracted from the current prompt, used to
    /// fill [`ActionArg::Mmi`] placeholders.
    pub async fn start(&self, ctx: &ActionContext, mmi_args: &[String]) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::AcqRel) + 1;
        if self.skip_calls.contains(&call) {
            tracing::debug!("Skipping '{}' on call {}", self.name, call);
            return Ok(());
        }

        match &self.kind {
            ActionKind::Invocation { func, args } => {
                let resolved = self.resolve_args(args, mmi_args)?;
                tracing::debug!("Invoking '{}' with {:?}", self.name, resolved);
                func(ctx.clone(), resolved).await
            }
            ActionKind::Process {
                program,
                args,
                child,
            } => {
                let mut slot = child.lock().await;
                if let Some(mut running) = slot.take() {
                    match running.try_wait() {
                        Ok(Some(status)) => {
                            tracing::debug!("'{}' exited earlier ({}), starting again", self.name, status)
                        }
                        _ => {
                            tracing::warn!("'{}' already running, restarting", self.name);
                            if let Err(e) = running.kill().await {
                                tracing::warn!("Killing '{}' before restart failed: {}", self.name, e);
                            }
                        }
                    }
                }
                let spawned = Command::new(program)
                    .args(args)
                    .kill_on_drop(true)
                    .spawn()
                    .map_err(|e| BtpError::action(&self.name, e))?;
                tracing::info!("Started '{}' (pid {:?})", self.name, spawned.id());
                *slot = Some(spawned);
                Ok(())
            }
        }
    }

    /// Stop the action. A no-op for invocations and idle processes.
    pub async fn stop(&self) -> Result<()> {
        if let ActionKind::Process { child, .. } = &self.kind {
            if let Some(mut running) = child.lock().await.take() {
                if running.try_wait()?.is_none() {
                    running.kill().await?;
                }
                tracing::info!("Stopped '{}'", self.name);
            }
        }
        Ok(())
    }

    /// True while a started process has not been stopped.
    pub async fn is_running(&self) -> bool {
        match &self.kind {
            ActionKind::Process { child, .. } => child.lock().await.is_some(),
            ActionKind::Invocation { .. } => false,
        }
    }

    fn resolve_args(&self, args: &[ActionArg], mmi_args: &[String]) -> Result<Vec<String>> {
        args.iter()
            .map(|arg| match arg {
                ActionArg::Value(value) => Ok(value.clone()),
                ActionArg::Mmi(index) => mmi_args.get(*index).cloned().ok_or_else(|| {
                    BtpError::action(
                        &self.name,
                        format!(
                            "prompt has {} argument(s), placeholder wants #{}",
                            mmi_args.len(),
                            index
                        ),
                    )
                }),
            })
            .collect()
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("start_wid", &self.start_wid)
            .field("stop_wid", &self.stop_wid)
            .field("post_wid", &self.post_wid)
            .field("skip_calls", &self.skip_calls)
            .field("calls", &self.call_count())
            .field("cleanup", &self.cleanup)
            .finish()
    }
}
