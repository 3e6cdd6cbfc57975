//! Route guarding.
//!
//! [`resolve`] is a pure function of the session state and the requested
//! path; [`Router`] re-evaluates it on every navigation and every session
//! change.

use std::fmt::{Display, Formatter, Result as FmtResult};

use tokio::sync::watch;

use crate::session::SessionState;

/// Redirect chains are at most `unknown -> / -> /login` long.
const MAX_REDIRECTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    Home,
    Records,
    Users,
}

impl Route {
    pub fn path(self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::Home => "/",
            Route::Records => "/records",
            Route::Users => "/users",
        }
    }

    /// Match a requested path; query strings, fragments and a trailing slash are ignored.
    pub fn parse(path: &str) -> Option<Route> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let trimmed = path.trim_end_matches('/');
        match trimmed {
            "" => Some(Route::Home),
            "/login" => Some(Route::Login),
            "/records" => Some(Route::Records),
            "/users" => Some(Route::Users),
            _ => None,
        }
    }

    pub fn is_protected(self) -> bool {
        self != Route::Login
    }

    pub fn requires_admin(self) -> bool {
        self == Route::Users
    }
}

impl Display for Route {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.path())
    }
}

/// Outcome of a navigation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Allow(Route),
    Redirect(Route),
    /// Session or profile still resolving; render nothing yet.
    Wait,
}

/// One guard step for `path` under `state`.
pub fn resolve(state: &SessionState, path: &str) -> Navigation {
    if state.is_loading() {
        return Navigation::Wait;
    }

    let Some(route) = Route::parse(path) else {
        return Navigation::Redirect(Route::Home);
    };

    match state {
        SessionState::Loading => Navigation::Wait,
        SessionState::Anonymous if route.is_protected() => Navigation::Redirect(Route::Login),
        SessionState::Anonymous => Navigation::Allow(route),
        SessionState::Authenticated { .. } if route == Route::Login => {
            Navigation::Redirect(Route::Home)
        }
        SessionState::Authenticated {
            profile,
            profile_loading,
            ..
        } if route.requires_admin() => {
            if *profile_loading {
                Navigation::Wait
            } else if profile.as_ref().map(|p| p.is_admin()).unwrap_or(false) {
                Navigation::Allow(route)
            } else {
                Navigation::Redirect(Route::Home)
            }
        }
        SessionState::Authenticated { .. } => Navigation::Allow(route),
    }
}

/// Follow redirects until a route is allowed.
///
/// Returns `Allow` when the requested route itself is allowed, `Redirect`
/// with the final landing route otherwise.
pub fn settle(state: &SessionState, path: &str) -> Navigation {
    let requested = Route::parse(path);
    let mut current = path.to_string();

    for _ in 0..MAX_REDIRECTS {
        match resolve(state, &current) {
            Navigation::Wait => return Navigation::Wait,
            Navigation::Allow(route) if Some(route) == requested => {
                return Navigation::Allow(route)
            }
            Navigation::Allow(route) => return Navigation::Redirect(route),
            Navigation::Redirect(route) => current = route.path().to_string(),
        }
    }

    tracing::warn!(path = %path, "Redirect loop while resolving route");
    Navigation::Redirect(Route::Home)
}

/// Tracks the current location and re-runs the guard on session changes.
pub struct Router {
    state: watch::Receiver<SessionState>,
    location: String,
}

impl Router {
    pub fn new(state: watch::Receiver<SessionState>, location: &str) -> Self {
        Self {
            state,
            location: location.to_string(),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Request `path`; a redirect moves the location to its target.
    pub fn navigate(&mut self, path: &str) -> Navigation {
        self.location = path.to_string();
        self.evaluate()
    }

    /// Guard outcome for the current location under the current state.
    pub fn evaluate(&mut self) -> Navigation {
        let outcome = settle(&self.state.borrow_and_update(), &self.location);
        if let Navigation::Redirect(route) = outcome {
            tracing::debug!(from = %self.location, to = %route, "Redirecting");
            self.location = route.path().to_string();
        }
        outcome
    }

    /// Wait for the next session change and re-evaluate.
    ///
    /// Returns `None` once the session store is gone.
    pub async fn changed(&mut self) -> Option<Navigation> {
        self.state.changed().await.ok()?;
        Some(self.evaluate())
    }

    /// Wait until the guard gives a definite answer for the current location.
    pub async fn resolved(&mut self) -> Navigation {
        loop {
            match self.evaluate() {
                Navigation::Wait => {
                    if self.state.changed().await.is_err() {
                        return Navigation::Wait;
                    }
                }
                outcome => return outcome,
            }
        }
    }
}
