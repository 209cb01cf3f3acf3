//! Background API calls.
//!
//! Each network call runs on its own tokio task and reports back through a
//! oneshot channel. [`super::App::tick`] drains whatever has finished; a task
//! that dies without reporting resolves to its `lost` fallback so no screen
//! is left waiting forever.

use std::future::Future;

use tokio::sync::oneshot::{self, error::TryRecvError};

use evote_core::{SignInError, SubmitTicket};
use evote_types::{ApiError, CachedUser, EventDetail, EventId, EventResults};

#[derive(Debug)]
pub(crate) enum TaskOutput {
    SignedIn(Result<Option<CachedUser>, SignInError>),
    EventLoaded {
        event_id: EventId,
        result: Result<EventDetail, ApiError>,
    },
    VoteSubmitted {
        ticket: SubmitTicket,
        result: Result<(), ApiError>,
    },
    ResultsLoaded {
        event_id: EventId,
        result: Result<EventResults, ApiError>,
    },
}

const TASK_LOST: &str = "request ended unexpectedly";

impl TaskOutput {
    pub(crate) fn lost_sign_in() -> Self {
        Self::SignedIn(Err(SignInError::Api(ApiError::Network(TASK_LOST.into()))))
    }

    pub(crate) fn lost_event(event_id: EventId) -> Self {
        Self::EventLoaded {
            event_id,
            result: Err(ApiError::Network(TASK_LOST.into())),
        }
    }

    pub(crate) fn lost_vote(ticket: SubmitTicket) -> Self {
        Self::VoteSubmitted {
            ticket,
            result: Err(ApiError::Network(TASK_LOST.into())),
        }
    }

    pub(crate) fn lost_results(event_id: EventId) -> Self {
        Self::ResultsLoaded {
            event_id,
            result: Err(ApiError::Network(TASK_LOST.into())),
        }
    }
}

#[derive(Debug)]
struct PendingTask {
    rx: oneshot::Receiver<TaskOutput>,
    lost: Option<TaskOutput>,
}

#[derive(Debug, Default)]
pub(crate) struct TaskSet {
    pending: Vec<PendingTask>,
}

impl TaskSet {
    pub(crate) fn spawn<F>(&mut self, work: F, lost: TaskOutput)
    where
        F: Future<Output = TaskOutput> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            // Receiver gone means the app shut down; nothing to report to.
            let _ = tx.send(work.await);
        });
        self.pending.push(PendingTask {
            rx,
            lost: Some(lost),
        });
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    /// Completed outputs, in spawn order.
    pub(crate) fn drain_finished(&mut self) -> Vec<TaskOutput> {
        let mut done = Vec::new();
        self.pending.retain_mut(|task| match task.rx.try_recv() {
            Ok(output) => {
                done.push(output);
                false
            }
            Err(TryRecvError::Empty) => true,
            Err(TryRecvError::Closed) => {
                tracing::error!("Background task ended without a result");
                done.extend(task.lost.take());
                false
            }
        });
        done
    }
}
