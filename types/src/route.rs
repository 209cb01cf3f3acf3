//! Navigation routes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::EventId;

/// Every screen the client can navigate to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Route {
    SignIn,
    Register,
    /// The tab container that hosts the main screens.
    Tabs,
    Events,
    EventDetail,
    Vote,
    Results,
    Profile,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown route: {0}")]
pub struct UnknownRouteError(pub String);

impl Route {
    /// Routes that are never gated by authentication.
    pub const PUBLIC: [Route; 3] = [Route::SignIn, Route::Register, Route::Tabs];

    #[must_use]
    pub const fn is_public(self) -> bool {
        matches!(self, Route::SignIn | Route::Register | Route::Tabs)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Route::SignIn => "sign-in",
            Route::Register => "register",
            Route::Tabs => "tabs",
            Route::Events => "events",
            Route::EventDetail => "event-detail",
            Route::Vote => "vote",
            Route::Results => "results",
            Route::Profile => "profile",
        }
    }

    #[must_use]
    pub const fn all() -> &'static [Route] {
        &[
            Route::SignIn,
            Route::Register,
            Route::Tabs,
            Route::Events,
            Route::EventDetail,
            Route::Vote,
            Route::Results,
            Route::Profile,
        ]
    }
}

impl FromStr for Route {
    type Err = UnknownRouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Route::all()
            .iter()
            .copied()
            .find(|route| route.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| UnknownRouteError(needle.to_string()))
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters carried alongside a navigation request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParams {
    pub event_id: Option<EventId>,
}

impl RouteParams {
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn event(id: EventId) -> Self {
        Self { event_id: Some(id) }
    }
}
