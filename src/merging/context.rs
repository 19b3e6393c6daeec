/*!
 * Execution context threaded through every merge call.
 *
 * Cancellation is cooperative: the worker polls the flag between units of work
 * (files, stream fetches, writes) and running tool processes are killed when the
 * flag is raised. Progress is pushed to the foreground over a channel; the worker
 * never touches display state directly.
 */

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Notify;

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    canceled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake everything waiting on [`CancelFlag::canceled`]
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Clear a previous request so the next stage can run
    pub fn reset(&self) {
        self.canceled.store(false, Ordering::SeqCst);
    }

    /// Resolves once cancellation has been requested
    pub async fn canceled(&self) {
        loop {
            // Register before checking so a concurrent cancel() is not missed
            let notified = self.notify.notified();
            if self.is_canceled() {
                return;
            }
            notified.await;
        }
    }
}

/// Stage of a merge run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStage {
    Prepare,
    Commit,
}

impl std::fmt::Display for MergeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Prepare => write!(f, "Preparing"),
            Self::Commit => write!(f, "Writing"),
        }
    }
}

/// Progress update sent from the worker to the foreground
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub stage: MergeStage,
    /// 0-based index of the current file
    pub file_index: usize,
    pub total_files: usize,
    /// What is happening right now
    pub message: String,
    /// Completed fraction of the stage, `None` when indeterminate
    pub fraction: Option<f32>,
}

/// Context value passed to every orchestrator call
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub cancel: CancelFlag,
    progress: Option<UnboundedSender<ProgressEvent>>,
}

impl RunContext {
    pub fn new(cancel: CancelFlag) -> Self {
        Self {
            cancel,
            progress: None,
        }
    }

    /// Attach a progress channel
    pub fn with_progress(mut self, sender: UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_canceled()
    }

    /// Send a progress update; a closed receiver is ignored
    pub fn report(&self, event: ProgressEvent) {
        if let Some(sender) = &self.progress {
            let _ = sender.send(event);
        }
    }
}
