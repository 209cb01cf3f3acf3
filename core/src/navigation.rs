//! Navigation contract and an in-process route stack.

use std::sync::{Mutex, PoisonError};

use thiserror::Error;

use evote_types::{Route, RouteParams};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavigationError {
    #[error("route {route} needs an event id")]
    MissingEventId { route: Route },
    #[error("navigation unavailable: {0}")]
    Unavailable(String),
}

/// Host navigation. Calls are fire-and-forget from the caller's view; the
/// guard logs failures and carries on.
pub trait Navigator: Send + Sync {
    /// Swap the current entry, so the old route is not reachable with back.
    fn replace(&self, route: Route, params: RouteParams) -> Result<(), NavigationError>;
    fn push(&self, route: Route, params: RouteParams) -> Result<(), NavigationError>;
    /// Pop one entry. Returns false at the root.
    fn back(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub route: Route,
    pub params: RouteParams,
}

/// History stack rooted at the tab container.
#[derive(Debug)]
pub struct RouteStack {
    entries: Mutex<Vec<RouteEntry>>,
}

impl Default for RouteStack {
    fn default() -> Self {
        Self::new(Route::Tabs)
    }
}

impl RouteStack {
    #[must_use]
    pub fn new(root: Route) -> Self {
        Self {
            entries: Mutex::new(vec![RouteEntry {
                route: root,
                params: RouteParams::none(),
            }]),
        }
    }

    fn with_entries<R>(&self, f: impl FnOnce(&mut Vec<RouteEntry>) -> R) -> R {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut entries)
    }

    #[must_use]
    pub fn current(&self) -> RouteEntry {
        self.with_entries(|entries| {
            entries.last().cloned().unwrap_or(RouteEntry {
                route: Route::Tabs,
                params: RouteParams::none(),
            })
        })
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.with_entries(|entries| entries.len())
    }

    /// Whether `route` is anywhere in the history.
    #[must_use]
    pub fn contains(&self, route: Route) -> bool {
        self.with_entries(|entries| entries.iter().any(|e| e.route == route))
    }
}

fn validate(route: Route, params: &RouteParams) -> Result<(), NavigationError> {
    let needs_event = matches!(route, Route::EventDetail | Route::Vote | Route::Results);
    if needs_event && params.event_id.is_none() {
        return Err(NavigationError::MissingEventId { route });
    }
    Ok(())
}

impl Navigator for RouteStack {
    fn replace(&self, route: Route, params: RouteParams) -> Result<(), NavigationError> {
        validate(route, &params)?;
        tracing::debug!(route = %route, "Navigation replace");
        self.with_entries(|entries| {
            let entry = RouteEntry { route, params };
            match entries.last_mut() {
                Some(last) => *last = entry,
                None => entries.push(entry),
            }
        });
        Ok(())
    }

    fn push(&self, route: Route, params: RouteParams) -> Result<(), NavigationError> {
        validate(route, &params)?;
        tracing::debug!(route = %route, "Navigation push");
        self.with_entries(|entries| entries.push(RouteEntry { route, params }));
        Ok(())
    }

    fn back(&self) -> bool {
        self.with_entries(|entries| {
            if entries.len() > 1 {
                entries.pop();
                true
            } else {
                false
            }
        })
    }
}
