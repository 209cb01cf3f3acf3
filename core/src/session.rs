//! Secure voting mode for one event.
//!
//! ```text
//!                request_entry      confirm_entry
//!   PreEntry ───► [ConfirmEntry] ─────────────────► SelectingOption ◄──┐ select
//!      ▲                                              │    ▲   └───────┘
//!      │                                 begin_submit │    │ failure (selection kept)
//!      │                                              ▼    │
//!      │                                           Submitting ──► Confirmed
//!      │                                              │    └────► AlreadyVoted
//!      │   background / inactive / confirmed back     │
//!      └──────────────── (Interrupted) ◄──────────────┘ (any locked state)
//! ```
//!
//! `Interrupted` is never observable: the lock is released, the user is
//! notified and the session lands in `PreEntry` within the same call.
//!
//! Every submit carries the session epoch. Interrupting bumps the epoch, so a
//! result that arrives for an abandoned attempt is discarded instead of
//! flipping the screen to `Confirmed`.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use evote_config::PlatformProfile;
use evote_types::{ApiError, AppLifecycle, EventDetail, EventId, OptionId, VoteOption};

use crate::platform::{PlatformError, PlatformHooks};

/// Observable phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    PreEntry,
    SelectingOption,
    Submitting,
    Confirmed,
    AlreadyVoted,
}

impl Phase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PreEntry => "pre-entry",
            Self::SelectingOption => "selecting",
            Self::Submitting => "submitting",
            Self::Confirmed => "confirmed",
            Self::AlreadyVoted => "already-voted",
        }
    }

    /// No further vote can be cast from this phase.
    #[must_use]
    pub const fn is_final(self) -> bool {
        matches!(self, Self::Confirmed | Self::AlreadyVoted)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Modal confirmation the UI must show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    /// "Device interaction will be restricted while you vote."
    ConfirmEntry,
    /// "Leave secure voting? Your selection will be discarded."
    ConfirmExit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptReason {
    AppInactive,
    AppBackground,
    BackConfirmed,
}

impl InterruptReason {
    fn from_lifecycle(state: AppLifecycle) -> Option<Self> {
        match state {
            AppLifecycle::Active => None,
            AppLifecycle::Inactive => Some(Self::AppInactive),
            AppLifecycle::Background => Some(Self::AppBackground),
        }
    }
}

/// User-facing message queued by the session and drained by the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    VoteConfirmed { option_name: String },
    AlreadyVoted,
    SubmitFailed { message: String, retryable: bool },
    AttemptDiscarded { reason: InterruptReason },
}

impl Notice {
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::VoteConfirmed { option_name } => {
                format!("Your vote for {option_name} has been recorded.")
            }
            Self::AlreadyVoted => "You have already voted in this event.".to_string(),
            Self::SubmitFailed { message, retryable } => {
                if *retryable {
                    format!("{message} Please try again.")
                } else {
                    message.clone()
                }
            }
            Self::AttemptDiscarded { reason } => match reason {
                InterruptReason::AppInactive | InterruptReason::AppBackground => {
                    "Voting was interrupted because the app left the foreground. \
                     Your selection was discarded."
                        .to_string()
                }
                InterruptReason::BackConfirmed => {
                    "You left secure voting. Your selection was discarded.".to_string()
                }
            },
        }
    }
}

#[derive(Debug, Default)]
struct NoticeQueue {
    pending: Vec<Notice>,
}

impl NoticeQueue {
    fn push(&mut self, notice: Notice) {
        self.pending.push(notice);
    }

    fn take(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("cannot {action} while {phase}")]
    InvalidTransition { action: &'static str, phase: Phase },
    #[error("select an option before submitting")]
    NoSelection,
    #[error("option {0:?} is not offered by this event")]
    UnknownOption(String),
    #[error("your vote for this event has already been recorded")]
    VoteRecorded,
}

/// Proof that a submit was started, handed back with its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitTicket {
    event_id: EventId,
    option_id: OptionId,
    option_name: String,
    epoch: u64,
}

impl SubmitTicket {
    #[must_use]
    pub fn event_id(&self) -> &EventId {
        &self.event_id
    }

    #[must_use]
    pub fn option_name(&self) -> &str {
        &self.option_name
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// What a submit result did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitResolution {
    Confirmed { option_name: String },
    AlreadyVoted,
    /// Back to `SelectingOption` with the selection intact.
    Failed(ApiError),
    /// Lock released, back to `PreEntry`. The caller owes the guard a report.
    AuthRejected(ApiError),
    /// Result belonged to an abandoned attempt and was ignored.
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackAction {
    /// The session handled it (an exit prompt is showing).
    Consumed,
    /// Not locked: the host should navigate back as usual.
    PassThrough,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionState {
    PreEntry,
    Selecting { selected: Option<OptionId> },
    Submitting { selected: OptionId },
    Confirmed { option_name: String },
    AlreadyVoted,
}

impl SessionState {
    fn phase(&self) -> Phase {
        match self {
            Self::PreEntry => Phase::PreEntry,
            Self::Selecting { .. } => Phase::SelectingOption,
            Self::Submitting { .. } => Phase::Submitting,
            Self::Confirmed { .. } => Phase::Confirmed,
            Self::AlreadyVoted => Phase::AlreadyVoted,
        }
    }
}

pub struct SecureVotingSession {
    event_id: EventId,
    title: Option<String>,
    options: Vec<VoteOption>,
    state: SessionState,
    prompt: Option<Prompt>,
    locked: bool,
    epoch: u64,
    /// Set once the server confirmed a vote; the session never re-enters.
    voted: bool,
    profile: PlatformProfile,
    platform: Arc<dyn PlatformHooks>,
    notices: NoticeQueue,
}

impl fmt::Debug for SecureVotingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureVotingSession")
            .field("event_id", &self.event_id)
            .field("state", &self.state)
            .field("prompt", &self.prompt)
            .field("locked", &self.locked)
            .field("epoch", &self.epoch)
            .field("voted", &self.voted)
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

impl SecureVotingSession {
    /// Session for a loaded event. Starts in `AlreadyVoted` when the server
    /// says this user has voted.
    #[must_use]
    pub fn new(
        event: EventDetail,
        profile: PlatformProfile,
        platform: Arc<dyn PlatformHooks>,
    ) -> Self {
        let already_voted = event.has_voted;
        let mut session = Self {
            event_id: event.id,
            title: Some(event.title),
            options: event.options,
            state: SessionState::PreEntry,
            prompt: None,
            locked: false,
            epoch: 0,
            voted: false,
            profile,
            platform,
            notices: NoticeQueue::default(),
        };
        if already_voted {
            session.state = SessionState::AlreadyVoted;
            session.notices.push(Notice::AlreadyVoted);
        }
        session
    }

    /// Session for an event whose fetch was refused because a vote exists.
    #[must_use]
    pub fn already_voted(
        event_id: EventId,
        profile: PlatformProfile,
        platform: Arc<dyn PlatformHooks>,
    ) -> Self {
        let mut notices = NoticeQueue::default();
        notices.push(Notice::AlreadyVoted);
        Self {
            event_id,
            title: None,
            options: Vec::new(),
            state: SessionState::AlreadyVoted,
            prompt: None,
            locked: false,
            epoch: 0,
            voted: false,
            profile,
            platform,
            notices,
        }
    }

    /// Build from the outcome of `GET /event/{id}`. Only the already-voted
    /// failure yields a session; other failures are returned to the caller.
    pub fn from_fetch(
        event_id: EventId,
        fetched: Result<EventDetail, ApiError>,
        profile: PlatformProfile,
        platform: Arc<dyn PlatformHooks>,
    ) -> Result<Self, ApiError> {
        match fetched {
            Ok(event) => Ok(Self::new(event, profile, platform)),
            Err(ApiError::AlreadyVoted) => Ok(Self::already_voted(event_id, profile, platform)),
            Err(e) => Err(e),
        }
    }

    #[must_use]
    pub fn event_id(&self) -> &EventId {
        &self.event_id
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    #[must_use]
    pub fn options(&self) -> &[VoteOption] {
        &self.options
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    #[must_use]
    pub fn prompt(&self) -> Option<Prompt> {
        self.prompt
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    #[must_use]
    pub fn profile(&self) -> PlatformProfile {
        self.profile
    }

    /// A vote was confirmed during this session.
    #[must_use]
    pub fn has_voted(&self) -> bool {
        self.voted
    }

    /// Current selection, including the one being submitted.
    #[must_use]
    pub fn selected(&self) -> Option<&OptionId> {
        match &self.state {
            SessionState::Selecting { selected } => selected.as_ref(),
            SessionState::Submitting { selected } => Some(selected),
            _ => None,
        }
    }

    #[must_use]
    pub fn selected_option(&self) -> Option<&VoteOption> {
        let id = self.selected()?;
        self.options.iter().find(|option| option.id() == *id)
    }

    /// The submit trigger is enabled.
    #[must_use]
    pub fn can_submit(&self) -> bool {
        matches!(self.state, SessionState::Selecting { selected: Some(_) })
    }

    /// Look an option up by id or case-insensitive name.
    #[must_use]
    pub fn resolve_option(&self, needle: &str) -> Option<&VoteOption> {
        let needle = needle.trim();
        self.options
            .iter()
            .find(|option| option.id().as_str() == needle)
            .or_else(|| {
                self.options
                    .iter()
                    .find(|option| option.name.trim().eq_ignore_ascii_case(needle))
            })
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        self.notices.take()
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            action,
            phase: self.phase(),
        }
    }

    /// Ask to enter secure voting mode. Shows [`Prompt::ConfirmEntry`].
    pub fn request_entry(&mut self) -> Result<(), SessionError> {
        if self.voted {
            return Err(SessionError::VoteRecorded);
        }
        if self.state != SessionState::PreEntry {
            return Err(self.invalid("enter secure voting"));
        }
        self.prompt = Some(Prompt::ConfirmEntry);
        Ok(())
    }

    /// The user accepted the restrictions: lock and start selecting.
    pub fn confirm_entry(&mut self) -> Result<(), SessionError> {
        if self.voted {
            return Err(SessionError::VoteRecorded);
        }
        if self.state != SessionState::PreEntry || self.prompt != Some(Prompt::ConfirmEntry) {
            return Err(self.invalid("confirm entry"));
        }
        self.prompt = None;
        self.engage_lock();
        self.state = SessionState::Selecting { selected: None };
        tracing::info!(event_id = %self.event_id, epoch = self.epoch, "Entered secure voting");
        Ok(())
    }

    /// Close whichever prompt is showing without acting on it.
    pub fn dismiss_prompt(&mut self) -> Option<Prompt> {
        self.prompt.take()
    }

    /// Select (or reselect) an option. Last write wins.
    pub fn select(&mut self, option_id: &OptionId) -> Result<(), SessionError> {
        let SessionState::Selecting { selected } = &mut self.state else {
            return Err(SessionError::InvalidTransition {
                action: "select an option",
                phase: self.state.phase(),
            });
        };
        if !self.options.iter().any(|option| option.id() == *option_id) {
            return Err(SessionError::UnknownOption(option_id.as_str().to_string()));
        }
        *selected = Some(option_id.clone());
        Ok(())
    }

    /// Move to `Submitting`. Nothing is sent without a selection.
    pub fn begin_submit(&mut self) -> Result<SubmitTicket, SessionError> {
        let selected = match &self.state {
            SessionState::Selecting {
                selected: Some(selected),
            } => selected.clone(),
            SessionState::Selecting { selected: None } => return Err(SessionError::NoSelection),
            _ => return Err(self.invalid("submit")),
        };
        let option_name = self
            .options
            .iter()
            .find(|option| option.id() == selected)
            .map(|option| option.name.as_str().to_string())
            .ok_or_else(|| SessionError::UnknownOption(selected.as_str().to_string()))?;

        self.state = SessionState::Submitting {
            selected: selected.clone(),
        };
        tracing::info!(event_id = %self.event_id, epoch = self.epoch, "Submitting vote");
        Ok(SubmitTicket {
            event_id: self.event_id.clone(),
            option_id: selected,
            option_name,
            epoch: self.epoch,
        })
    }

    /// Apply the result of the submit started with `ticket`.
    pub fn complete_submit(
        &mut self,
        ticket: SubmitTicket,
        result: Result<(), ApiError>,
    ) -> SubmitResolution {
        let current = matches!(self.state, SessionState::Submitting { .. })
            && ticket.epoch == self.epoch
            && ticket.event_id == self.event_id;
        if !current {
            tracing::info!(
                event_id = %ticket.event_id,
                epoch = ticket.epoch,
                current_epoch = self.epoch,
                phase = %self.phase(),
                ok = result.is_ok(),
                "Discarding result of abandoned submit"
            );
            return SubmitResolution::Discarded;
        }

        match result {
            Ok(()) => {
                self.release_lock();
                self.voted = true;
                self.state = SessionState::Confirmed {
                    option_name: ticket.option_name.clone(),
                };
                self.notices.push(Notice::VoteConfirmed {
                    option_name: ticket.option_name.clone(),
                });
                tracing::info!(event_id = %self.event_id, "Vote confirmed");
                SubmitResolution::Confirmed {
                    option_name: ticket.option_name,
                }
            }
            Err(ApiError::AlreadyVoted) => {
                self.release_lock();
                self.state = SessionState::AlreadyVoted;
                self.notices.push(Notice::AlreadyVoted);
                tracing::info!(event_id = %self.event_id, "Server reports vote already cast");
                SubmitResolution::AlreadyVoted
            }
            Err(error) if error.is_auth_failure() => {
                self.release_lock();
                self.prompt = None;
                self.state = SessionState::PreEntry;
                self.notices.push(Notice::SubmitFailed {
                    message: error.to_string(),
                    retryable: false,
                });
                tracing::warn!(event_id = %self.event_id, "Submit rejected: {error}");
                SubmitResolution::AuthRejected(error)
            }
            Err(error) => {
                self.state = SessionState::Selecting {
                    selected: Some(ticket.option_id),
                };
                self.notices.push(Notice::SubmitFailed {
                    message: error.to_string(),
                    retryable: error.is_retryable(),
                });
                tracing::warn!(event_id = %self.event_id, "Submit failed: {error}");
                SubmitResolution::Failed(error)
            }
        }
    }

    /// Lifecycle transition from the host. Returns true if it interrupted.
    pub fn on_lifecycle(&mut self, state: AppLifecycle) -> bool {
        if !self.locked || self.profile == PlatformProfile::Degraded {
            return false;
        }
        match InterruptReason::from_lifecycle(state) {
            Some(reason) => {
                self.interrupt(reason);
                true
            }
            None => false,
        }
    }

    /// Hardware back. While locked this asks for confirmation instead of
    /// leaving.
    pub fn on_back_pressed(&mut self) -> BackAction {
        if !self.locked || self.profile == PlatformProfile::Degraded {
            return BackAction::PassThrough;
        }
        self.prompt = Some(Prompt::ConfirmExit);
        BackAction::Consumed
    }

    /// The user confirmed leaving secure voting.
    pub fn confirm_exit(&mut self) -> Result<(), SessionError> {
        if self.prompt != Some(Prompt::ConfirmExit) || !self.locked {
            return Err(self.invalid("confirm exit"));
        }
        self.interrupt(InterruptReason::BackConfirmed);
        Ok(())
    }

    /// Close the confirmation. The session goes back to `PreEntry` but
    /// refuses another entry.
    pub fn acknowledge_confirmation(&mut self) -> Result<(), SessionError> {
        if !matches!(self.state, SessionState::Confirmed { .. }) {
            return Err(self.invalid("acknowledge confirmation"));
        }
        self.state = SessionState::PreEntry;
        self.prompt = None;
        Ok(())
    }

    fn interrupt(&mut self, reason: InterruptReason) {
        let from = self.phase();
        self.release_lock();
        self.prompt = None;
        self.state = SessionState::PreEntry;
        self.notices.push(Notice::AttemptDiscarded { reason });
        tracing::info!(
            event_id = %self.event_id,
            from = %from,
            reason = ?reason,
            epoch = self.epoch,
            "Secure voting interrupted"
        );
    }

    fn engage_lock(&mut self) {
        self.locked = true;
        if self.profile == PlatformProfile::Degraded {
            return;
        }
        best_effort("lock orientation", self.platform.lock_portrait());
        best_effort("watch lifecycle", self.platform.watch_lifecycle(true));
        best_effort("intercept back", self.platform.intercept_back(true));
    }

    /// Leaving the locked mode invalidates any in-flight submit.
    fn release_lock(&mut self) {
        if !self.locked {
            return;
        }
        self.locked = false;
        self.epoch += 1;
        if self.profile == PlatformProfile::Degraded {
            return;
        }
        best_effort("release back", self.platform.intercept_back(false));
        best_effort("unwatch lifecycle", self.platform.watch_lifecycle(false));
        best_effort("unlock orientation", self.platform.unlock_orientation());
    }
}

impl Drop for SecureVotingSession {
    fn drop(&mut self) {
        self.release_lock();
    }
}

fn best_effort(what: &str, result: Result<(), PlatformError>) {
    if let Err(e) = result {
        tracing::debug!("Platform hook '{what}' unavailable: {e}");
    }
}
