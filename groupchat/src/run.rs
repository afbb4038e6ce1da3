//! Run results and streaming handles

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

use crate::error::RunFailure;
use crate::transcript::{Transcript, TurnRecord};

/// Lifecycle of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    /// The termination strategy judged the work complete
    Terminated,
    /// A structural error stopped the run
    Failed(RunFailure),
}

impl RunStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

/// Final result of a run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub status: RunStatus,
    /// Every turn in order, including recovered failures
    pub turns: Vec<TurnRecord>,
    /// Authoritative transcript at the end of the run
    pub transcript: Transcript,
}

impl RunOutcome {
    /// Fatal cause, if the run failed
    pub fn failure(&self) -> Option<&RunFailure> {
        match &self.status {
            RunStatus::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    /// Number of turns that ended in a recovered capability failure
    pub fn failed_turns(&self) -> usize {
        self.turns.iter().filter(|t| t.is_error).count()
    }
}

// ============================================================================
// Turn Sink
// ============================================================================

/// Forwards turn records to a streaming consumer, if any
#[derive(Clone, Default)]
pub(crate) struct TurnSink {
    sender: Option<mpsc::UnboundedSender<TurnRecord>>,
}

impl TurnSink {
    pub(crate) fn new(sender: mpsc::UnboundedSender<TurnRecord>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Sink that discards records
    pub(crate) fn none() -> Self {
        Self { sender: None }
    }

    pub(crate) fn send(&self, record: TurnRecord) {
        if let Some(ref sender) = self.sender {
            // Ignore send errors - the consumer may have stopped listening
            let _ = sender.send(record);
        }
    }
}

// ============================================================================
// Run Handle
// ============================================================================

/// Handle to a spawned run
///
/// Yields turn records as they are produced (forward-only, single consumer).
/// Dropping the handle cancels the run.
pub struct RunHandle {
    run_id: Uuid,
    turns: mpsc::UnboundedReceiver<TurnRecord>,
    task: JoinHandle<RunOutcome>,
    cancel: CancellationToken,
    guard: DropGuard,
}

impl RunHandle {
    pub(crate) fn new(
        run_id: Uuid,
        turns: mpsc::UnboundedReceiver<TurnRecord>,
        task: JoinHandle<RunOutcome>,
        cancel: CancellationToken,
    ) -> Self {
        let guard = cancel.clone().drop_guard();
        Self {
            run_id,
            turns,
            task,
            cancel,
            guard,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Wait for the next turn; `None` once the run has finished
    pub async fn next_turn(&mut self) -> Option<TurnRecord> {
        self.turns.recv().await
    }

    /// Request cancellation
    ///
    /// Honored between turns or by abandoning an in-flight call; a reply is
    /// either fully appended or not at all.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this run when triggered
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the run to end and return its outcome
    pub async fn finish(self) -> Result<RunOutcome, JoinError> {
        let RunHandle { task, guard, .. } = self;
        let outcome = task.await;
        guard.disarm();
        outcome
    }
}

impl Stream for RunHandle {
    type Item = TurnRecord;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<TurnRecord>> {
        self.turns.poll_recv(cx)
    }
}
