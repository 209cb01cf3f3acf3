//! The app: one guard, one route stack, the active screens and the
//! background tasks feeding them.
//!
//! Input methods (`navigate`, `select`, `submit`, ...) change state
//! immediately and may spawn API calls. [`App::tick`] applies finished calls.
//! Hosts call `tick` on a short interval.

mod screens;
mod tasks;


use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use evote_api::{ClientBuildError, RetryConfig, VoteClient};
use evote_config::{PlatformProfile, Settings};
use evote_core::{
    BackAction, CredentialStore, GuardDecision, GuardState, NavigationError, Navigator, Notice,
    PlatformHooks, Prompt, RouteEntry, RouteStack, SecureVotingSession, SessionError,
    SessionGuard, SignInError, SubmitResolution, VoteApi,
};
use evote_types::{
    ApiError, AppLifecycle, CachedUser, EventId, Route, RouteParams, VoteOption,
};

pub use screens::{ResultsScreen, VoteScreen};
use tasks::{TaskOutput, TaskSet};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no vote is open")]
    NoVoteScreen,
    #[error("the event is still loading")]
    NotLoaded,
    #[error("nothing to confirm")]
    NoPrompt,
    #[error("finish or leave secure voting first")]
    SecureModeActive,
    #[error("a sign-in request is already in progress")]
    SignInInProgress,
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Navigation(#[from] NavigationError),
}

pub struct App {
    guard: Arc<SessionGuard>,
    api: Arc<dyn VoteApi>,
    navigator: Arc<RouteStack>,
    platform: Arc<dyn PlatformHooks>,
    profile: PlatformProfile,
    vote: Option<VoteScreen>,
    results: Option<ResultsScreen>,
    tasks: TaskSet,
    signing_in: bool,
    notifications: Vec<String>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("route", &self.navigator.current())
            .field("guard", &self.guard)
            .field("vote", &self.vote)
            .field("profile", &self.profile)
            .field("pending_tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl App {
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        api: Arc<dyn VoteApi>,
        platform: Arc<dyn PlatformHooks>,
        profile: PlatformProfile,
    ) -> Self {
        let navigator = Arc::new(RouteStack::default());
        let guard = Arc::new(SessionGuard::new(store, navigator.clone()));
        Self {
            guard,
            api,
            navigator,
            platform,
            profile,
            vote: None,
            results: None,
            tasks: TaskSet::default(),
            signing_in: false,
            notifications: Vec::new(),
        }
    }

    /// Wire an app to the HTTP API described by `settings`.
    pub fn from_settings(
        settings: &Settings,
        store: Arc<dyn CredentialStore>,
        platform: Arc<dyn PlatformHooks>,
    ) -> Result<Self, ClientBuildError> {
        let retry = RetryConfig::default().with_max_retries(settings.max_retries);
        let client = VoteClient::new(&settings.api_base_url, settings.request_timeout, retry)?;
        Ok(Self::new(store, Arc::new(client), platform, settings.platform))
    }

    /// First guard evaluation, then a check of the root route.
    pub async fn start(&mut self) -> GuardState {
        let state = self.guard.init().await;
        let root = self.navigator.current().route;
        self.guard.check_access(root).await;
        state
    }

    // ------------------------------------------------------------------
    // Read-only views
    // ------------------------------------------------------------------

    #[must_use]
    pub fn current(&self) -> RouteEntry {
        self.navigator.current()
    }

    #[must_use]
    pub fn guard_state(&self) -> GuardState {
        self.guard.state()
    }

    #[must_use]
    pub fn profile(&self) -> PlatformProfile {
        self.profile
    }

    #[must_use]
    pub fn vote_screen(&self) -> Option<&VoteScreen> {
        self.vote.as_ref()
    }

    #[must_use]
    pub fn results_screen(&self) -> Option<&ResultsScreen> {
        self.results.as_ref()
    }

    /// Something is in flight; the UI shows a spinner.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        !self.tasks.is_empty()
    }

    #[must_use]
    pub fn pending_prompt(&self) -> Option<Prompt> {
        self.vote
            .as_ref()
            .and_then(VoteScreen::session)
            .and_then(|session| session.prompt())
    }

    pub fn take_notifications(&mut self) -> Vec<String> {
        self.absorb_notices();
        std::mem::take(&mut self.notifications)
    }

    pub async fn cached_user(&self) -> Option<CachedUser> {
        self.guard.cached_user().await
    }

    fn push_notification(&mut self, message: impl Into<String>) {
        self.notifications.push(message.into());
    }

    fn absorb_notices(&mut self) {
        if let Some(session) = self.vote.as_mut().and_then(VoteScreen::session_mut) {
            self.notifications
                .extend(session.take_notices().iter().map(Notice::message));
        }
    }

    fn session_mut(&mut self) -> Result<&mut SecureVotingSession, EngineError> {
        match self.vote.as_mut() {
            Some(VoteScreen::Ready(session)) => Ok(session),
            Some(_) => Err(EngineError::NotLoaded),
            None => Err(EngineError::NoVoteScreen),
        }
    }

    fn secure_mode_active(&self) -> bool {
        self.vote
            .as_ref()
            .and_then(VoteScreen::session)
            .is_some_and(|session| session.is_locked())
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// Push `route` and mount it if the guard lets it render.
    pub async fn navigate(
        &mut self,
        route: Route,
        params: RouteParams,
    ) -> Result<GuardDecision, EngineError> {
        if self.secure_mode_active() {
            return Err(EngineError::SecureModeActive);
        }
        self.navigator.push(route, params.clone())?;
        let decision = self.guard.check_access(route).await;
        if decision.authenticated {
            self.sync_screens();
            self.mount(route, params);
        } else {
            self.land_on_sign_in().await;
        }
        Ok(decision)
    }

    /// After a refused check: make sure the sign-in screen is current and
    /// run its own check, which closes the guard's redirect window.
    async fn land_on_sign_in(&mut self) {
        if !self.navigator.current().route.is_public() {
            // The guard skipped the redirect for an earlier open window.
            if let Err(e) = self.navigator.replace(Route::SignIn, RouteParams::none()) {
                tracing::warn!("Could not redirect to sign-in: {e}");
            }
        }
        let current = self.navigator.current().route;
        self.guard.check_access(current).await;
        self.sync_screens();
    }

    pub async fn open_event(&mut self, event_id: EventId) -> Result<GuardDecision, EngineError> {
        self.navigate(Route::Vote, RouteParams::event(event_id)).await
    }

    pub async fn open_results(&mut self, event_id: EventId) -> Result<GuardDecision, EngineError> {
        self.navigate(Route::Results, RouteParams::event(event_id)).await
    }

    /// Hardware back. A locked session swallows it and asks to confirm.
    pub async fn back(&mut self) -> BackAction {
        if let Some(session) = self.vote.as_mut().and_then(VoteScreen::session_mut)
            && session.on_back_pressed() == BackAction::Consumed
        {
            return BackAction::Consumed;
        }
        if self.navigator.back() {
            self.sync_screens();
            let current = self.navigator.current();
            if self.guard.check_access(current.route).await.authenticated {
                self.mount_if_missing(current.route, current.params);
                self.sync_screens();
            } else {
                self.land_on_sign_in().await;
            }
        }
        BackAction::PassThrough
    }

    /// Drop screens whose route is no longer current. Dropping a locked
    /// session releases its platform hooks.
    fn sync_screens(&mut self) {
        let current = self.navigator.current();
        let on = |route: Route, id: &EventId| {
            current.route == route && current.params.event_id.as_ref() == Some(id)
        };
        if self
            .vote
            .as_ref()
            .is_some_and(|screen| !on(Route::Vote, screen.event_id()))
        {
            self.vote = None;
        }
        if self
            .results
            .as_ref()
            .is_some_and(|screen| !on(Route::Results, screen.event_id()))
        {
            self.results = None;
        }
    }

    fn mount(&mut self, route: Route, params: RouteParams) {
        let Some(event_id) = params.event_id else {
            return;
        };
        match route {
            Route::Vote => {
                self.vote = Some(VoteScreen::Loading {
                    event_id: event_id.clone(),
                });
                self.spawn_event_fetch(event_id);
            }
            Route::Results => {
                self.results = Some(ResultsScreen::Loading {
                    event_id: event_id.clone(),
                });
                self.spawn_results_fetch(event_id);
            }
            _ => {}
        }
    }

    fn mount_if_missing(&mut self, route: Route, params: RouteParams) {
        let missing = match route {
            Route::Vote => self.vote.is_none(),
            Route::Results => self.results.is_none(),
            _ => false,
        };
        if missing {
            self.mount(route, params);
        }
    }

    /// Retry a failed event or results fetch.
    pub fn reload(&mut self) {
        if let Some(VoteScreen::Failed { event_id, .. }) = &self.vote {
            let event_id = event_id.clone();
            self.vote = Some(VoteScreen::Loading {
                event_id: event_id.clone(),
            });
            self.spawn_event_fetch(event_id);
        }
        if let Some(ResultsScreen::Failed { event_id, .. }) = &self.results {
            let event_id = event_id.clone();
            self.results = Some(ResultsScreen::Loading {
                event_id: event_id.clone(),
            });
            self.spawn_results_fetch(event_id);
        }
    }

    // ------------------------------------------------------------------
    // Authentication
    // ------------------------------------------------------------------

    pub fn sign_in(&mut self, email: &str, password: &str) -> Result<(), EngineError> {
        if self.signing_in {
            return Err(EngineError::SignInInProgress);
        }
        self.signing_in = true;
        let guard = Arc::clone(&self.guard);
        let api = Arc::clone(&self.api);
        let (email, password) = (email.to_string(), password.to_string());
        self.tasks.spawn(
            async move { TaskOutput::SignedIn(guard.sign_in(api.as_ref(), &email, &password).await) },
            TaskOutput::lost_sign_in(),
        );
        Ok(())
    }

    pub fn register(
        &mut self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<(), EngineError> {
        if self.signing_in {
            return Err(EngineError::SignInInProgress);
        }
        self.signing_in = true;
        let guard = Arc::clone(&self.guard);
        let api = Arc::clone(&self.api);
        let (name, email, password) = (name.to_string(), email.to_string(), password.to_string());
        self.tasks.spawn(
            async move {
                TaskOutput::SignedIn(guard.register(api.as_ref(), &name, &email, &password).await)
            },
            TaskOutput::lost_sign_in(),
        );
        Ok(())
    }

    pub async fn sign_out(&mut self) {
        self.vote = None;
        self.results = None;
        self.guard.sign_out().await;
        self.land_on_sign_in().await;
    }

    /// The server refused our token somewhere: drop it and let the guard
    /// redirect from wherever we are.
    async fn handle_auth_failure(&mut self, error: &ApiError) {
        let message = error.to_string();
        if !self.notifications.contains(&message) {
            self.push_notification(message);
        }
        self.guard.report_auth_rejected().await;
        let current = self.navigator.current().route;
        if !self.guard.check_access(current).await.authenticated {
            self.land_on_sign_in().await;
        }
    }

    // ------------------------------------------------------------------
    // Secure voting
    // ------------------------------------------------------------------

    pub fn enter_secure_mode(&mut self) -> Result<(), EngineError> {
        self.session_mut()?.request_entry()?;
        Ok(())
    }

    /// Answer the prompt on screen: `accept` confirms, otherwise dismiss.
    pub fn answer_prompt(&mut self, accept: bool) -> Result<Prompt, EngineError> {
        let session = self.session_mut()?;
        let prompt = session.prompt().ok_or(EngineError::NoPrompt)?;
        match (prompt, accept) {
            (Prompt::ConfirmEntry, true) => session.confirm_entry()?,
            (Prompt::ConfirmExit, true) => session.confirm_exit()?,
            (_, false) => {
                session.dismiss_prompt();
            }
        }
        self.absorb_notices();
        Ok(prompt)
    }

    /// Select by option id or name.
    pub fn select(&mut self, option: &str) -> Result<(), EngineError> {
        let session = self.session_mut()?;
        let id = session
            .resolve_option(option)
            .map(VoteOption::id)
            .ok_or_else(|| SessionError::UnknownOption(option.trim().to_string()))?;
        session.select(&id)?;
        Ok(())
    }

    /// Start submitting the current selection.
    pub fn submit(&mut self) -> Result<(), EngineError> {
        let ticket = self.session_mut()?.begin_submit()?;
        let guard = Arc::clone(&self.guard);
        let api = Arc::clone(&self.api);
        let lost = TaskOutput::lost_vote(ticket.clone());
        self.tasks.spawn(
            async move {
                let result = match guard.bearer_token().await {
                    Ok(token) => {
                        api.cast_vote(&token, ticket.event_id(), ticket.option_name())
                            .await
                    }
                    Err(e) => Err(e),
                };
                TaskOutput::VoteSubmitted { ticket, result }
            },
            lost,
        );
        Ok(())
    }

    pub fn acknowledge_confirmation(&mut self) -> Result<(), EngineError> {
        self.session_mut()?.acknowledge_confirmation()?;
        Ok(())
    }

    /// Platform lifecycle event. Returns true if it interrupted voting.
    pub fn lifecycle(&mut self, state: AppLifecycle) -> bool {
        let interrupted = self
            .vote
            .as_mut()
            .and_then(VoteScreen::session_mut)
            .is_some_and(|session| session.on_lifecycle(state));
        if interrupted {
            self.absorb_notices();
        }
        interrupted
    }

    // ------------------------------------------------------------------
    // Background results
    // ------------------------------------------------------------------

    fn spawn_event_fetch(&mut self, event_id: EventId) {
        let guard = Arc::clone(&self.guard);
        let api = Arc::clone(&self.api);
        let lost = TaskOutput::lost_event(event_id.clone());
        self.tasks.spawn(
            async move {
                let result = match guard.bearer_token().await {
                    Ok(token) => api.get_event(&token, &event_id).await,
                    Err(e) => Err(e),
                };
                TaskOutput::EventLoaded { event_id, result }
            },
            lost,
        );
    }

    fn spawn_results_fetch(&mut self, event_id: EventId) {
        let guard = Arc::clone(&self.guard);
        let api = Arc::clone(&self.api);
        let lost = TaskOutput::lost_results(event_id.clone());
        self.tasks.spawn(
            async move {
                let result = match guard.bearer_token().await {
                    Ok(token) => api.get_results(&token, &event_id).await,
                    Err(e) => Err(e),
                };
                TaskOutput::ResultsLoaded { event_id, result }
            },
            lost,
        );
    }

    /// Apply every finished background call.
    pub async fn tick(&mut self) {
        for output in self.tasks.drain_finished() {
            self.apply(output).await;
        }
        self.absorb_notices();
    }

    /// Tick until nothing is in flight or `timeout` passes. Returns whether
    /// the app went idle.
    pub async fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            self.tick().await;
            if self.tasks.is_empty() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn apply(&mut self, output: TaskOutput) {
        match output {
            TaskOutput::SignedIn(result) => {
                self.signing_in = false;
                match result {
                    Ok(user) => {
                        let who = user
                            .as_ref()
                            .and_then(CachedUser::display_name)
                            .map(|name| format!(" as {name}"))
                            .unwrap_or_default();
                        self.push_notification(format!("Signed in{who}."));
                        self.sync_screens();
                    }
                    Err(SignInError::Api(ApiError::Unauthorized { .. })) => {
                        self.push_notification("Invalid email or password.");
                    }
                    Err(e) => self.push_notification(e.to_string()),
                }
            }
            TaskOutput::EventLoaded { event_id, result } => {
                let waiting = matches!(
                    &self.vote,
                    Some(VoteScreen::Loading { event_id: id }) if *id == event_id
                );
                if !waiting {
                    tracing::debug!(event_id = %event_id, "Dropping event fetch for closed screen");
                    return;
                }
                match SecureVotingSession::from_fetch(
                    event_id.clone(),
                    result,
                    self.profile,
                    Arc::clone(&self.platform),
                ) {
                    Ok(session) => self.vote = Some(VoteScreen::Ready(session)),
                    Err(error) if error.is_auth_failure() => {
                        self.handle_auth_failure(&error).await;
                    }
                    Err(error) => {
                        self.vote = Some(VoteScreen::Failed {
                            event_id,
                            message: error.to_string(),
                        });
                    }
                }
            }
            TaskOutput::VoteSubmitted { ticket, result } => {
                let Some(session) = self.vote.as_mut().and_then(VoteScreen::session_mut) else {
                    tracing::info!(
                        event_id = %ticket.event_id(),
                        ok = result.is_ok(),
                        "Vote result arrived after the screen closed"
                    );
                    return;
                };
                if let SubmitResolution::AuthRejected(error) = session.complete_submit(ticket, result)
                {
                    self.absorb_notices();
                    self.handle_auth_failure(&error).await;
                }
            }
            TaskOutput::ResultsLoaded { event_id, result } => {
                let waiting = matches!(
                    &self.results,
                    Some(ResultsScreen::Loading { event_id: id }) if *id == event_id
                );
                if !waiting {
                    return;
                }
                match result {
                    Ok(results) => {
                        self.results = Some(ResultsScreen::Ready { event_id, results });
                    }
                    Err(error) if error.is_auth_failure() => {
                        self.handle_auth_failure(&error).await;
                    }
                    Err(error) => {
                        self.results = Some(ResultsScreen::Failed {
                            event_id,
                            message: error.to_string(),
                        });
                    }
                }
            }
        }
    }
}
