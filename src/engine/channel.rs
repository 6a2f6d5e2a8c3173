use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::Sender;

use tokio::sync::oneshot;

use crate::error::{Result, SqlOffloadError};

pub(crate) type Work<T> = Box<dyn FnOnce() -> Result<T> + Send>;
pub(crate) type Callback<T> = Box<dyn FnOnce(Result<T>) + Send>;
pub(crate) type CompletionSender = Sender<Box<dyn Completion>>;

/// Where a baton's outcome goes once the worker phase is over.
pub(crate) enum Reply<T> {
    /// Queued for the caller context; the callback runs during dispatch.
    Callback(Callback<T>),
    /// Handed straight to a caller blocked in a synchronous call.
    Blocking(oneshot::Sender<Result<T>>),
    /// Internal fire-and-forget work; failures are only logged.
    Detached,
}

/// Worker-side half of a unit of work.
pub(crate) trait Task: Send {
    /// Run the blocking body, then route the outcome.
    fn run(self: Box<Self>, completions: &CompletionSender);

    /// Route `err` as the outcome without running the body.
    fn reject(self: Box<Self>, err: SqlOffloadError, completions: &CompletionSender);
}

/// Caller-side half of a unit of work.
pub(crate) trait Completion: Send {
    fn complete(self: Box<Self>);
}

/// Self-contained work descriptor: inputs live inside `work`, the outcome slot is filled exactly
/// once by the worker, and `reply` decides how the outcome reaches the caller.
pub(crate) struct Baton<T> {
    label: &'static str,
    work: Option<Work<T>>,
    outcome: Option<Result<T>>,
    reply: Reply<T>,
}

impl<T: Send + 'static> Baton<T> {
    pub(crate) fn new(label: &'static str, work: Work<T>, reply: Reply<T>) -> Self {
        Self {
            label,
            work: Some(work),
            outcome: None,
            reply,
        }
    }

    pub(crate) fn label(&self) -> &'static str {
        self.label
    }

    pub(crate) fn is_callback(&self) -> bool {
        matches!(self.reply, Reply::Callback(_))
    }

    fn route(mut self: Box<Self>, completions: &CompletionSender) {
        match std::mem::replace(&mut self.reply, Reply::Detached) {
            Reply::Callback(callback) => {
                self.reply = Reply::Callback(callback);
                let label = self.label;
                if completions.send(self).is_err() {
                    tracing::warn!(task = label, "completion queue closed; outcome discarded");
                }
            }
            Reply::Blocking(respond_to) => {
                let outcome = self.take_outcome();
                let _ = respond_to.send(outcome);
            }
            Reply::Detached => {
                if let Some(Err(err)) = &self.outcome {
                    tracing::warn!(task = self.label, error = %err, "detached task failed");
                }
            }
        }
    }

    fn take_outcome(&mut self) -> Result<T> {
        self.outcome
            .take()
            .unwrap_or_else(|| Err(SqlOffloadError::WorkerPanic(self.label.to_owned())))
    }
}

/// Run a work closure, turning a panic into an error so the outcome is never lost.
pub(crate) fn run_work<T>(label: &'static str, work: Work<T>) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(work))
        .unwrap_or_else(|_| Err(SqlOffloadError::WorkerPanic(label.to_owned())))
}

impl<T: Send + 'static> Task for Baton<T> {
    fn run(mut self: Box<Self>, completions: &CompletionSender) {
        if let Some(work) = self.work.take() {
            tracing::trace!(task = self.label, "running task");
            self.outcome = Some(run_work(self.label, work));
        }
        self.route(completions);
    }

    fn reject(mut self: Box<Self>, err: SqlOffloadError, completions: &CompletionSender) {
        self.work = None;
        self.outcome = Some(Err(err));
        self.route(completions);
    }
}

impl<T: Send + 'static> Completion for Baton<T> {
    fn complete(mut self: Box<Self>) {
        let outcome = self.take_outcome();
        if let Reply::Callback(callback) = std::mem::replace(&mut self.reply, Reply::Detached) {
            callback(outcome);
        }
    }
}
