//! Per-route screen state owned by the app.

use evote_core::SecureVotingSession;
use evote_types::{EventId, EventResults};

/// Vote screen for one event.
#[derive(Debug)]
pub enum VoteScreen {
    Loading { event_id: EventId },
    Ready(SecureVotingSession),
    /// Fetch failed; `reload` retries.
    Failed { event_id: EventId, message: String },
}

impl VoteScreen {
    #[must_use]
    pub fn event_id(&self) -> &EventId {
        match self {
            Self::Loading { event_id } | Self::Failed { event_id, .. } => event_id,
            Self::Ready(session) => session.event_id(),
        }
    }

    #[must_use]
    pub fn session(&self) -> Option<&SecureVotingSession> {
        match self {
            Self::Ready(session) => Some(session),
            _ => None,
        }
    }

    pub(crate) fn session_mut(&mut self) -> Option<&mut SecureVotingSession> {
        match self {
            Self::Ready(session) => Some(session),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum ResultsScreen {
    Loading {
        event_id: EventId,
    },
    Ready {
        event_id: EventId,
        results: EventResults,
    },
    Failed {
        event_id: EventId,
        message: String,
    },
}

impl ResultsScreen {
    #[must_use]
    pub fn event_id(&self) -> &EventId {
        match self {
            Self::Loading { event_id }
            | Self::Ready { event_id, .. }
            | Self::Failed { event_id, .. } => event_id,
        }
    }
}
