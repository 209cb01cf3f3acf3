//! Process-wide authentication gate.
//!
//! ```text
//!            init / check_access
//!   Unknown ────────────────────┬──────────────► Authenticated
//!                               │                  │     ▲
//!                               ▼     sign_out /   │     │ sign_in /
//!                        Unauthenticated ◄─────────┘     │ token observed
//!                               └────────────────────────┘
//! ```
//!
//! A check on a gated route without a token redirects to sign-in with a
//! `replace`. Only the first such check in an *unauthenticated window*
//! redirects; the window closes when a check sees a token, when sign-in
//! succeeds, or when a check runs on a public route (the redirect landed).

use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

use evote_types::{ApiError, AuthToken, CachedUser, Credential, Route, RouteParams};

use crate::navigation::Navigator;
use crate::store::{CredentialStore, StoreError};
use crate::vote_api::VoteApi;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    /// No store read has resolved yet.
    Unknown,
    Authenticated,
    Unauthenticated,
}

/// Result of one access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardDecision {
    /// The view may render.
    pub authenticated: bool,
    /// This check issued the redirect to sign-in.
    pub redirected: bool,
}

impl GuardDecision {
    const ALLOW: Self = Self {
        authenticated: true,
        redirected: false,
    };
}

#[derive(Debug, Error)]
pub enum SignInError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("signed in, but the credential could not be saved: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug)]
struct GuardInner {
    state: GuardState,
    /// A redirect to sign-in was issued and has not landed yet.
    redirect_pending: bool,
}

pub struct SessionGuard {
    store: Arc<dyn CredentialStore>,
    navigator: Arc<dyn Navigator>,
    inner: Mutex<GuardInner>,
}

impl std::fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuard")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SessionGuard {
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            store,
            navigator,
            inner: Mutex::new(GuardInner {
                state: GuardState::Unknown,
                redirect_pending: false,
            }),
        }
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut GuardInner) -> R) -> R {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut inner)
    }

    #[must_use]
    pub fn state(&self) -> GuardState {
        self.with_inner(|inner| inner.state)
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Store read with failures folded into "no token".
    async fn read_token(&self) -> Option<AuthToken> {
        match self.store.get_token().await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!("Credential store read failed, treating as signed out: {e}");
                None
            }
        }
    }

    /// First evaluation at process start. Never redirects.
    pub async fn init(&self) -> GuardState {
        let token = self.read_token().await;
        self.with_inner(|inner| {
            inner.state = if token.is_some() {
                GuardState::Authenticated
            } else {
                GuardState::Unauthenticated
            };
            tracing::info!(state = ?inner.state, "Session guard initialised");
            inner.state
        })
    }

    /// Decide whether `route` may render.
    pub async fn check_access(&self, route: Route) -> GuardDecision {
        if route.is_public() {
            self.with_inner(|inner| inner.redirect_pending = false);
            return GuardDecision::ALLOW;
        }

        let token = self.read_token().await;
        let should_redirect = self.with_inner(|inner| {
            if token.is_some() {
                inner.state = GuardState::Authenticated;
                inner.redirect_pending = false;
                return false;
            }
            inner.state = GuardState::Unauthenticated;
            !std::mem::replace(&mut inner.redirect_pending, true)
        });

        if token.is_some() {
            return GuardDecision::ALLOW;
        }
        if should_redirect {
            tracing::info!(route = %route, "No credential for gated route, redirecting to sign-in");
            if let Err(e) = self.navigator.replace(Route::SignIn, RouteParams::none()) {
                tracing::warn!(route = %route, "Redirect to sign-in failed: {e}");
            }
        } else {
            tracing::debug!(route = %route, "Redirect to sign-in already in flight");
        }
        GuardDecision {
            authenticated: false,
            redirected: should_redirect,
        }
    }

    /// Token for an authenticated call, without touching the network.
    pub async fn bearer_token(&self) -> Result<AuthToken, ApiError> {
        if let Some(token) = self.read_token().await {
            return Ok(token);
        }
        self.with_inner(|inner| inner.state = GuardState::Unauthenticated);
        Err(ApiError::MissingToken)
    }

    pub async fn cached_user(&self) -> Option<CachedUser> {
        match self.store.get_cached_user().await {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!("Cached user read failed: {e}");
                None
            }
        }
    }

    /// Authenticate against the API, persist the credential and leave the
    /// sign-in screen.
    pub async fn sign_in(
        &self,
        api: &dyn VoteApi,
        email: &str,
        password: &str,
    ) -> Result<Option<CachedUser>, SignInError> {
        let credential = api.sign_in(email, password).await?;
        self.establish(credential).await
    }

    /// Create an account. The server signs the new user in.
    pub async fn register(
        &self,
        api: &dyn VoteApi,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<Option<CachedUser>, SignInError> {
        let credential = api.register(name, email, password).await?;
        self.establish(credential).await
    }

    async fn establish(&self, credential: Credential) -> Result<Option<CachedUser>, SignInError> {
        let user = credential.user.clone();
        if let Err(e) = self.store.save(credential).await {
            // A half-written credential must not authenticate later checks.
            if let Err(clear) = self.store.clear().await {
                tracing::warn!("Credential store cleanup failed: {clear}");
            }
            return Err(e.into());
        }
        self.with_inner(|inner| {
            inner.state = GuardState::Authenticated;
            inner.redirect_pending = false;
        });
        tracing::info!("Signed in");
        if let Err(e) = self.navigator.replace(Route::Tabs, RouteParams::none()) {
            tracing::warn!("Navigation after sign-in failed: {e}");
        }
        Ok(user)
    }

    /// Forget the credential and return to sign-in.
    pub async fn sign_out(&self) {
        self.drop_credential().await;
        let redirect = self.with_inner(|inner| {
            inner.state = GuardState::Unauthenticated;
            !std::mem::replace(&mut inner.redirect_pending, true)
        });
        tracing::info!("Signed out");
        if redirect && let Err(e) = self.navigator.replace(Route::SignIn, RouteParams::none()) {
            tracing::warn!("Redirect after sign-out failed: {e}");
        }
    }

    /// The server rejected the stored token. The credential is dropped; the
    /// next gated check redirects.
    pub async fn report_auth_rejected(&self) {
        tracing::warn!("Server rejected the stored credential, clearing it");
        self.drop_credential().await;
        self.with_inner(|inner| inner.state = GuardState::Unauthenticated);
    }

    async fn drop_credential(&self) {
        if let Err(e) = self.store.clear().await {
            tracing::error!("Failed to clear credential store: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use evote_types::{
        ApiError, AuthToken, CachedUser, Credential, EventDetail, EventId, EventResults, Route,
        RouteParams,
    };

    use super::{GuardDecision, GuardState, SessionGuard, SignInError};
    use crate::navigation::{NavigationError, Navigator, RouteStack};
    use crate::store::{CredentialStore, MemoryCredentialStore, StoreError, StoreFut};
    use crate::vote_api::{ApiFut, VoteApi};

    /// Counts replace calls so redirect multiplicity can be asserted.
    #[derive(Default)]
    struct CountingNavigator {
        stack: RouteStack,
        sign_in_redirects: AtomicUsize,
    }

    impl Navigator for CountingNavigator {
        fn replace(&self, route: Route, params: RouteParams) -> Result<(), NavigationError> {
            if route == Route::SignIn {
                self.sign_in_redirects.fetch_add(1, Ordering::SeqCst);
            }
            self.stack.replace(route, params)
        }

        fn push(&self, route: Route, params: RouteParams) -> Result<(), NavigationError> {
            self.stack.push(route, params)
        }

        fn back(&self) -> bool {
            self.stack.back()
        }
    }

    struct BrokenStore;

    impl CredentialStore for BrokenStore {
        fn get_token(&self) -> StoreFut<'_, Option<AuthToken>> {
            Box::pin(async { Err(StoreError::Unavailable("keychain locked".into())) })
        }
        fn get_cached_user(&self) -> StoreFut<'_, Option<CachedUser>> {
            Box::pin(async { Err(StoreError::Unavailable("keychain locked".into())) })
        }
        fn set_token(&self, _token: AuthToken) -> StoreFut<'_, ()> {
            Box::pin(async { Err(StoreError::Unavailable("keychain locked".into())) })
        }
        fn set_cached_user(&self, _user: Option<CachedUser>) -> StoreFut<'_, ()> {
            Box::pin(async { Err(StoreError::Unavailable("keychain locked".into())) })
        }
        fn clear(&self) -> StoreFut<'_, ()> {
            Box::pin(async { Err(StoreError::Unavailable("keychain locked".into())) })
        }
    }

    struct AuthOnlyApi {
        reject: bool,
    }

    impl VoteApi for AuthOnlyApi {
        fn sign_in<'a>(&'a self, email: &'a str, _password: &'a str) -> ApiFut<'a, Credential> {
            let reject = self.reject;
            Box::pin(async move {
                if reject {
                    return Err(ApiError::Unauthorized { status: 401 });
                }
                Ok(Credential {
                    token: AuthToken::new("fresh").unwrap(),
                    user: Some(CachedUser::new(json!({ "email": email }))),
                })
            })
        }
        fn register<'a>(
            &'a self,
            _name: &'a str,
            email: &'a str,
            password: &'a str,
        ) -> ApiFut<'a, Credential> {
            self.sign_in(email, password)
        }
        fn get_event<'a>(
            &'a self,
            _token: &'a AuthToken,
            _event_id: &'a EventId,
        ) -> ApiFut<'a, EventDetail> {
            Box::pin(async { Err(ApiError::Network("offline".into())) })
        }
        fn cast_vote<'a>(
            &'a self,
            _token: &'a AuthToken,
            _event_id: &'a EventId,
            _option_name: &'a str,
        ) -> ApiFut<'a, ()> {
            Box::pin(async { Err(ApiError::Network("offline".into())) })
        }
        fn get_results<'a>(
            &'a self,
            _token: &'a AuthToken,
            _event_id: &'a EventId,
        ) -> ApiFut<'a, EventResults> {
            Box::pin(async { Err(ApiError::Network("offline".into())) })
        }
    }

    fn signed_in_store() -> Arc<MemoryCredentialStore> {
        Arc::new(MemoryCredentialStore::with_credential(Credential {
            token: AuthToken::new("tok").unwrap(),
            user: None,
        }))
    }

    fn guard_with(store: Arc<dyn CredentialStore>) -> (SessionGuard, Arc<CountingNavigator>) {
        let navigator = Arc::new(CountingNavigator::default());
        (SessionGuard::new(store, navigator.clone()), navigator)
    }

    #[tokio::test]
    async fn starts_unknown_and_init_resolves() {
        let (guard, nav) = guard_with(signed_in_store());
        assert_eq!(guard.state(), GuardState::Unknown);
        assert_eq!(guard.init().await, GuardState::Authenticated);

        let (guard, _) = guard_with(Arc::new(MemoryCredentialStore::new()));
        assert_eq!(guard.init().await, GuardState::Unauthenticated);
        assert_eq!(nav.sign_in_redirects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn public_routes_are_never_gated() {
        let (guard, nav) = guard_with(Arc::new(MemoryCredentialStore::new()));
        for route in Route::PUBLIC {
            assert_eq!(guard.check_access(route).await, GuardDecision::ALLOW);
        }
        assert_eq!(nav.sign_in_redirects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn token_present_allows_gated_route() {
        let (guard, nav) = guard_with(signed_in_store());
        let decision = guard.check_access(Route::Vote).await;
        assert!(decision.authenticated);
        assert_eq!(guard.state(), GuardState::Authenticated);
        assert_eq!(nav.sign_in_redirects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn one_redirect_per_unauthenticated_window() {
        let (guard, nav) = guard_with(Arc::new(MemoryCredentialStore::new()));

        let first = guard.check_access(Route::Events).await;
        let second = guard.check_access(Route::Vote).await;
        assert!(!first.authenticated && first.redirected);
        assert!(!second.authenticated && !second.redirected);
        assert_eq!(nav.sign_in_redirects.load(Ordering::SeqCst), 1);
        assert_eq!(nav.stack.current().route, Route::SignIn);

        // Sign-in screen mounted: the window is over, a later gated visit
        // redirects again.
        guard.check_access(Route::SignIn).await;
        guard.check_access(Route::Profile).await;
        assert_eq!(nav.sign_in_redirects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_checks_converge_on_one_redirect() {
        let (guard, nav) = guard_with(Arc::new(MemoryCredentialStore::new()));
        let guard = Arc::new(guard);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = Arc::clone(&guard);
                tokio::spawn(async move { guard.check_access(Route::EventDetail).await })
            })
            .collect();
        let mut redirected = 0;
        for handle in handles {
            let decision = handle.await.unwrap();
            assert!(!decision.authenticated);
            redirected += usize::from(decision.redirected);
        }
        assert_eq!(redirected, 1);
        assert_eq!(nav.sign_in_redirects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn store_failure_fails_closed() {
        let (guard, nav) = guard_with(Arc::new(BrokenStore));
        let decision = guard.check_access(Route::Results).await;
        assert!(!decision.authenticated);
        assert!(decision.redirected);
        assert_eq!(guard.state(), GuardState::Unauthenticated);
        assert_eq!(nav.sign_in_redirects.load(Ordering::SeqCst), 1);
        assert_eq!(guard.bearer_token().await, Err(ApiError::MissingToken));
    }

    #[tokio::test]
    async fn auth_rejection_clears_store_and_next_check_redirects() {
        let store = signed_in_store();
        let (guard, nav) = guard_with(store.clone());
        assert!(guard.check_access(Route::Vote).await.authenticated);

        guard.report_auth_rejected().await;
        assert!(store.get_token().await.unwrap().is_none());
        assert_eq!(nav.sign_in_redirects.load(Ordering::SeqCst), 0);

        let decision = guard.check_access(Route::Vote).await;
        assert!(decision.redirected);
        assert_eq!(nav.sign_in_redirects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sign_in_persists_and_closes_window() {
        let store = Arc::new(MemoryCredentialStore::new());
        let (guard, nav) = guard_with(store.clone());
        guard.check_access(Route::Events).await;

        let user = guard
            .sign_in(&AuthOnlyApi { reject: false }, "ada@example.com", "pw")
            .await
            .unwrap();
        assert_eq!(user.unwrap().display_name(), Some("ada@example.com"));
        assert_eq!(guard.state(), GuardState::Authenticated);
        assert_eq!(guard.bearer_token().await.unwrap().expose_secret(), "fresh");
        assert_eq!(nav.stack.current().route, Route::Tabs);
        assert!(guard.check_access(Route::Events).await.authenticated);
    }

    #[tokio::test]
    async fn rejected_sign_in_stores_nothing() {
        let store = Arc::new(MemoryCredentialStore::new());
        let (guard, _) = guard_with(store.clone());
        let err = guard
            .sign_in(&AuthOnlyApi { reject: true }, "ada@example.com", "bad")
            .await
            .unwrap_err();
        assert!(matches!(err, SignInError::Api(ApiError::Unauthorized { .. })));
        assert!(store.get_token().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sign_out_redirects_once() {
        let (guard, nav) = guard_with(signed_in_store());
        guard.init().await;
        guard.sign_out().await;
        assert_eq!(guard.state(), GuardState::Unauthenticated);
        assert_eq!(nav.sign_in_redirects.load(Ordering::SeqCst), 1);

        // Still navigating away: a protected screen mounting now does not
        // redirect again.
        assert!(!guard.check_access(Route::Profile).await.redirected);
        assert_eq!(nav.sign_in_redirects.load(Ordering::SeqCst), 1);
    }
}
