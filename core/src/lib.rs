//! Authentication gate and secure voting session for evote.
//!
//! - [`SessionGuard`] decides whether a route may render and owns sign-in,
//!   sign-out and the reaction to a rejected token.
//! - [`SecureVotingSession`] is the per-event state machine behind the vote
//!   screen.
//!
//! Both are plain state machines. Everything they touch outside the process
//! goes through a trait ([`CredentialStore`], [`Navigator`],
//! [`PlatformHooks`], [`VoteApi`]) so hosts and tests can swap it.

mod guard;
mod navigation;
mod platform;
mod session;
mod store;
mod vote_api;

pub use guard::{GuardDecision, GuardState, SessionGuard, SignInError};
pub use navigation::{NavigationError, Navigator, RouteEntry, RouteStack};
pub use platform::{NoopPlatform, PlatformCall, PlatformError, PlatformHooks, RecordingPlatform};
pub use session::{
    BackAction, InterruptReason, Notice, Phase, Prompt, SecureVotingSession, SessionError,
    SubmitResolution, SubmitTicket,
};
pub use store::{
    CredentialStore, FileCredentialStore, MemoryCredentialStore, StoreError, StoreFut,
};
pub use vote_api::{ApiFut, VoteApi};

pub use evote_config::PlatformProfile;
