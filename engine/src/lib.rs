//! App orchestration for evote.
//!
//! This crate contains the [`App`] state machine without any terminal
//! dependencies: it routes, consults the session guard, owns the vote and
//! results screens and runs API calls in the background.

mod app;

pub use app::{App, EngineError, ResultsScreen, VoteScreen};

// Re-export from crates for the binary's convenience
pub use evote_config::{PlatformProfile, Settings};
pub use evote_core::{
    BackAction, CredentialStore, FileCredentialStore, GuardDecision, GuardState,
    MemoryCredentialStore, NoopPlatform, Phase, PlatformHooks, Prompt, SecureVotingSession,
    VoteApi,
};
pub use evote_types::{AppLifecycle, EventId, Route, RouteParams};
