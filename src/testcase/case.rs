//! The test case engine: answers MMI prompts while driving the IUT.
//!
//! The verdict engine calls [`TestCase::answer`] for every prompt and waits
//! for the returned string. Work that must happen *after* the answer is
//! delivered (a `post_wid` action) runs on a single deferred task; that task
//! is awaited at the start of the next prompt, and a failure it recorded is
//! returned from that next call. A deferred failure is therefore reported
//! one prompt late, but never lost.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tokio::task::{JoinError, JoinHandle};

use super::action::{Action, ActionContext, BoxFuture};
use super::mmi::{parse_mmi_args, MmiPrompt, MmiStyle};
use super::response::{encode_reply, WidReply, WidValue};
use super::status::{LogType, TestCaseStatus};
use crate::error::{BtpError, Result};

/// How long a `Wait` reply polls the pending response source.
pub const DEFAULT_RESPONSE_WAIT: Duration = Duration::from_secs(90);

/// Poll interval of a `Wait` reply.
pub const DEFAULT_RESPONSE_POLL: Duration = Duration::from_secs(1);

/// Answer given when a `Wait` reply times out.
const WAIT_TIMEOUT_ANSWER: &str = "Cancel";

/// Handler consulted for every prompt of a test case, before the tables.
pub trait WidHandler: Send + Sync + 'static {
    fn handle(&self, prompt: &MmiPrompt, ctx: &ActionContext) -> BoxFuture<'static, Result<WidReply>>;
}

impl<F, Fut> WidHandler for F
where
    F: Fn(MmiPrompt, ActionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<WidReply>> + Send + 'static,
{
    fn handle(&self, prompt: &MmiPrompt, ctx: &ActionContext) -> BoxFuture<'static, Result<WidReply>> {
        Box::pin(self(prompt.clone(), ctx.clone()))
    }
}

/// Deferred worker started by a prompt.
struct DeferredWork {
    wid: u32,
    handle: JoinHandle<Result<()>>,
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct TestCaseReport {
    pub project: String,
    pub name: String,
    #[serde(flatten)]
    pub status: TestCaseStatus,
}

/// One qualification test case: its actions, answer tables and status.
pub struct TestCase {
    project: String,
    name: String,
    actions: Vec<Arc<Action>>,
    status: TestCaseStatus,
    no_wid: Option<u32>,
    edit1_wids: HashMap<u32, WidValue>,
    verify_wids: HashMap<u32, WidValue>,
    ok_cancel_wids: HashMap<u32, WidValue>,
    generic_handler: Option<Arc<dyn WidHandler>>,
    deferred: Option<DeferredWork>,
    response_wait: Duration,
    response_poll: Duration,
}

impl TestCase {
    pub fn new(project: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            name: name.into(),
            actions: Vec::new(),
            status: TestCaseStatus::Init,
            no_wid: None,
            edit1_wids: HashMap::new(),
            verify_wids: HashMap::new(),
            ok_cancel_wids: HashMap::new(),
            generic_handler: None,
            deferred: None,
            response_wait: DEFAULT_RESPONSE_WAIT,
            response_poll: DEFAULT_RESPONSE_POLL,
        }
    }

    /// Append an action; registration order is execution order.
    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(Arc::new(action));
        self
    }

    /// Wid answered `No` for a `Yes_No1` prompt.
    pub fn no_wid(mut self, wid: u32) -> Self {
        self.no_wid = Some(wid);
        self
    }

    pub fn edit1_wid(mut self, wid: u32, value: impl Into<WidValue>) -> Self {
        self.edit1_wids.insert(wid, value.into());
        self
    }

    pub fn verify_wid(mut self, wid: u32, value: impl Into<WidValue>) -> Self {
        self.verify_wids.insert(wid, value.into());
        self
    }

    pub fn ok_cancel_wid(mut self, wid: u32, value: impl Into<WidValue>) -> Self {
        self.ok_cancel_wids.insert(wid, value.into());
        self
    }

    pub fn generic_handler<H: WidHandler>(mut self, handler: H) -> Self {
        self.generic_handler = Some(Arc::new(handler));
        self
    }

    /// How long, and how often, a `Wait` reply polls for an answer.
    pub fn response_wait(mut self, timeout: Duration, poll: Duration) -> Self {
        self.response_wait = timeout;
        self.response_poll = poll;
        self
    }

    pub(crate) fn set_response_wait(&mut self, timeout: Duration, poll: Duration) {
        self.response_wait = timeout;
        self.response_poll = poll;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn status(&self) -> &TestCaseStatus {
        &self.status
    }

    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter().map(|a| a.as_ref())
    }

    /// True while a deferred worker has not been awaited.
    pub fn has_deferred_work(&self) -> bool {
        self.deferred.is_some()
    }

    pub fn report(&self) -> TestCaseReport {
        TestCaseReport {
            project: self.project.clone(),
            name: self.name.clone(),
            status: self.status.clone(),
        }
    }

    /// Answer one prompt.
    ///
    /// Errors from the previous prompt's deferred work, from synchronous
    /// actions and from the generic handler are returned to the caller.
    /// Verification mismatches are not errors; they answer `No`.
    pub async fn answer(&mut self, prompt: &MmiPrompt, ctx: &ActionContext) -> Result<String> {
        let wid = prompt.wid;
        tracing::info!(
            "MMI {} wid={} style={}: {}",
            prompt.test_case,
            wid,
            prompt.style,
            prompt.description.trim()
        );

        self.reap_deferred().await?;

        let needs_args = self.actions.iter().any(|a| {
            (a.start_wid_value() == Some(wid) || a.post_wid_value() == Some(wid))
                && a.has_placeholders()
        });
        let mmi_args = if needs_args {
            parse_mmi_args(&prompt.description)
        } else {
            Vec::new()
        };

        for action in self.actions.iter().filter(|a| a.start_wid_value() == Some(wid)) {
            action.start(ctx, &mmi_args).await?;
        }
        for action in self.actions.iter().filter(|a| a.stop_wid_value() == Some(wid)) {
            action.stop().await?;
        }

        let response = self.compute_response(prompt, ctx).await?;

        self.schedule_deferred(wid, ctx, mmi_args);

        tracing::info!("MMI wid={} answered '{}'", wid, response);
        Ok(response)
    }

    async fn compute_response(&self, prompt: &MmiPrompt, ctx: &ActionContext) -> Result<String> {
        if let Some(handler) = &self.generic_handler {
            let reply = handler.handle(prompt, ctx).await?;
            return Ok(match reply {
                WidReply::Wait => self.wait_for_response(ctx).await,
                other => encode_reply(prompt.style, &other),
            });
        }

        let wid = prompt.wid;
        let description = prompt.description.as_str();

        let response = match prompt.style {
            MmiStyle::YesNo1 => {
                if self.no_wid == Some(wid) {
                    "No".to_string()
                } else if let Some(value) = self.verify_wids.get(&wid) {
                    let verified = value.verify(description);
                    if !verified {
                        tracing::warn!("wid {} verification failed: {:?}", wid, value);
                    }
                    encode_reply(MmiStyle::YesNo1, &WidReply::Bool(verified))
                } else {
                    let lower = description.to_lowercase();
                    if lower.contains("confirm") || lower.contains("verify") {
                        tracing::warn!(
                            "wid {} asks to confirm/verify but has no verification, answering Yes",
                            wid
                        );
                    }
                    "Yes".to_string()
                }
            }
            MmiStyle::Edit1 | MmiStyle::Edit2 => match self.edit1_wids.get(&wid) {
                Some(value) => self.table_answer(prompt, value, ctx).await,
                None => String::new(),
            },
            MmiStyle::OkCancel1 | MmiStyle::OkCancel2 => match self.ok_cancel_wids.get(&wid) {
                Some(value) => self.table_answer(prompt, value, ctx).await,
                None => "OK".to_string(),
            },
            MmiStyle::Ok1 => "Ok".to_string(),
            MmiStyle::YesNoCancel1 => "Yes".to_string(),
            MmiStyle::AbortRetry1 => "Retry".to_string(),
        };
        Ok(response)
    }

    /// Table entries answer text verbatim; other replies are style-encoded.
    async fn table_answer(&self, prompt: &MmiPrompt, value: &WidValue, ctx: &ActionContext) -> String {
        match value.resolve(&prompt.description) {
            WidReply::Text(text) => text,
            WidReply::Wait => self.wait_for_response(ctx).await,
            other => encode_reply(prompt.style, &other),
        }
    }

    async fn wait_for_response(&self, ctx: &ActionContext) -> String {
        tracing::info!(
            "Waiting up to {:?} for a pending response",
            self.response_wait
        );
        match ctx.pending().wait(self.response_wait, self.response_poll).await {
            Some(response) => response,
            None => {
                tracing::warn!("No pending response arrived, answering {}", WAIT_TIMEOUT_ANSWER);
                WAIT_TIMEOUT_ANSWER.to_string()
            }
        }
    }

    fn schedule_deferred(&mut self, wid: u32, ctx: &ActionContext, mmi_args: Vec<String>) {
        let queue: Vec<Arc<Action>> = self
            .actions
            .iter()
            .filter(|a| a.post_wid_value() == Some(wid))
            .cloned()
            .collect();
        if queue.is_empty() {
            return;
        }

        tracing::debug!("wid {}: deferring {} action(s)", wid, queue.len());
        let ctx = ctx.clone();
        let handle = tokio::spawn(async move {
            for action in queue {
                if let Err(e) = action.start(&ctx, &mmi_args).await {
                    tracing::error!("Deferred action '{}' failed: {}", action.name(), e);
                    return Err(e);
                }
            }
            Ok(())
        });
        self.deferred = Some(DeferredWork { wid, handle });
    }

    /// Await the previous prompt's deferred worker and surface its failure.
    async fn reap_deferred(&mut self) -> Result<()> {
        let Some(work) = self.deferred.take() else {
            return Ok(());
        };
        let joined = work.handle.await;
        deferred_outcome(work.wid, joined)
    }

    /// Reap the deferred worker only if it has already finished.
    ///
    /// Returns its failure like the next [`TestCase::answer`] would; a
    /// worker still running is left in place.
    pub fn poll_deferred(&mut self) -> Result<()> {
        let Some(mut work) = self.deferred.take() else {
            return Ok(());
        };
        match (&mut work.handle).now_or_never() {
            Some(joined) => deferred_outcome(work.wid, joined),
            None => {
                self.deferred = Some(work);
                Ok(())
            }
        }
    }

    /// Start every action not bound to any wid.
    pub async fn pre_run(&mut self, ctx: &ActionContext) -> Result<()> {
        tracing::info!("Pre-run {}", self.name);
        for action in self.actions.iter().filter(|a| a.is_unbound() && !a.is_cleanup()) {
            action.start(ctx, &[]).await?;
        }
        Ok(())
    }

    /// Finish the run: await deferred work, stop all actions, run cleanup
    /// actions.
    ///
    /// Every step runs even if an earlier one failed; the first error is
    /// returned.
    pub async fn post_run(&mut self, ctx: &ActionContext) -> Result<()> {
        tracing::info!("Post-run {} ({})", self.name, self.status);
        let mut first_error = self.reap_deferred().await.err();

        for action in &self.actions {
            if let Err(e) = action.stop().await {
                tracing::error!("Stopping '{}' failed: {}", action.name(), e);
                first_error.get_or_insert(e);
            }
        }

        for action in self.actions.iter().filter(|a| a.is_cleanup()) {
            if let Err(e) = action.start(ctx, &[]).await {
                tracing::error!("Cleanup '{}' failed: {}", action.name(), e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Apply a log record from the verdict engine.
    pub fn on_log(&mut self, log_type: LogType, message: &str) {
        let next = match log_type {
            LogType::StartTest if self.status == TestCaseStatus::Init => TestCaseStatus::Started,
            LogType::FinalVerdict if !self.status.is_terminal() => {
                TestCaseStatus::from_verdict(message)
            }
            LogType::StartTest | LogType::FinalVerdict => {
                tracing::debug!(
                    "{}: ignoring {:?} in state {}",
                    self.name,
                    log_type,
                    self.status
                );
                return;
            }
            _ => return,
        };
        tracing::info!("{}: {} -> {}", self.name, self.status, next);
        self.status = next;
    }

    /// Record an error code returned by the verdict engine; overrides any
    /// status.
    pub fn record_engine_error(&mut self, code: i32) {
        tracing::error!("{}: verdict engine error {}", self.name, code);
        self.status = TestCaseStatus::EngineError(code);
    }

    /// Prepare for another run: await deferred work, reset status and call
    /// counters.
    pub async fn reset(&mut self) -> Result<()> {
        let deferred = self.reap_deferred().await;
        self.status = TestCaseStatus::Init;
        for action in &self.actions {
            action.reset_calls();
        }
        deferred
    }
}

fn deferred_outcome(
    wid: u32,
    joined: std::result::Result<Result<()>, JoinError>,
) -> Result<()> {
    let source = match joined {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(e)) => e,
        Err(join_error) => BtpError::action("deferred worker", join_error),
    };
    Err(BtpError::DeferredAction {
        wid,
        source: Box::new(source),
    })
}

impl Drop for TestCase {
    fn drop(&mut self) {
        let finished = match &self.deferred {
            Some(work) => work.handle.is_finished(),
            None => return,
        };

        if finished {
            if let Err(e) = self.poll_deferred() {
                tracing::error!("{} dropped with an unreported failure: {}", self.name, e);
            }
        }
        if let Some(work) = self.deferred.take() {
            tracing::warn!(
                "{} dropped with deferred work from wid {} still running; aborting it",
                self.name,
                work.wid
            );
            work.handle.abort();
        }
    }
}
