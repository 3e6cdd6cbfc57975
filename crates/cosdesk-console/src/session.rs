//! SessionStore: the single owner of the current session and profile.
//!
//! The store subscribes to auth changes, resolves the initial session and
//! looks up the profile row for the signed-in email. All state mutation
//! happens on the store's handler task; everything else observes it through
//! a `watch` channel.

use std::sync::{Arc, Mutex};

use cosdesk_client::{AuthBackend, ProfileSource};
use cosdesk_core::models::{AuthChange, AuthEvent, Session, UserProfile};
use cosdesk_core::AppResult;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Observable session state.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// Initial session not resolved yet
    Loading,
    Anonymous,
    Authenticated {
        session: Session,
        profile: Option<UserProfile>,
        profile_loading: bool,
    },
}

impl SessionState {
    pub fn is_loading(&self) -> bool {
        matches!(self, SessionState::Loading)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated { .. })
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::Authenticated { session, .. } => Some(session),
            _ => None,
        }
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        match self {
            SessionState::Authenticated { profile, .. } => profile.as_ref(),
            _ => None,
        }
    }

    pub fn email(&self) -> Option<&str> {
        self.session().and_then(Session::email)
    }

    pub fn is_admin(&self) -> bool {
        self.profile().map(UserProfile::is_admin).unwrap_or(false)
    }

    /// Neither the session nor the profile lookup is pending.
    pub fn is_settled(&self) -> bool {
        match self {
            SessionState::Loading => false,
            SessionState::Anonymous => true,
            SessionState::Authenticated {
                profile_loading, ..
            } => !profile_loading,
        }
    }
}

type ProfileOutcome = (u64, AppResult<Option<UserProfile>>);

pub struct SessionStore {
    auth: Arc<dyn AuthBackend>,
    profiles: Arc<dyn ProfileSource>,
    state: watch::Sender<SessionState>,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionStore {
    pub fn new(auth: Arc<dyn AuthBackend>, profiles: Arc<dyn ProfileSource>) -> Self {
        let (state, _) = watch::channel(SessionState::Loading);
        Self {
            auth,
            profiles,
            state,
            shutdown: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Subscribe to auth changes and resolve the initial session.
    ///
    /// Calling `start` on a running store does nothing.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_some() {
            return;
        }

        let handler = Handler {
            auth: Arc::clone(&self.auth),
            profiles: Arc::clone(&self.profiles),
            state: self.state.clone(),
            generation: 0,
            profile_token: None,
        };
        // Subscribe before reading the current session so no change is missed.
        let events = self.auth.subscribe();
        let shutdown = self.shutdown.clone();
        *task = Some(tokio::spawn(handler.run(events, shutdown)));
    }

    /// Stop the handler and cancel any in-flight profile lookup.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Session handler ended abnormally");
            }
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Wait until the session and profile are resolved.
    pub async fn settled(&self) -> SessionState {
        let mut rx = self.subscribe();
        let result = rx.wait_for(SessionState::is_settled).await.map(|s| s.clone());
        match result {
            Ok(state) => state,
            Err(_) => self.state(),
        }
    }

    pub fn auth(&self) -> &Arc<dyn AuthBackend> {
        &self.auth
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

struct Handler {
    auth: Arc<dyn AuthBackend>,
    profiles: Arc<dyn ProfileSource>,
    state: watch::Sender<SessionState>,
    generation: u64,
    profile_token: Option<CancellationToken>,
}

impl Handler {
    async fn run(mut self, mut events: broadcast::Receiver<AuthChange>, shutdown: CancellationToken) {
        let (results_tx, mut results) = mpsc::unbounded_channel::<ProfileOutcome>();

        let initial = tokio::select! {
            _ = shutdown.cancelled() => return,
            initial = self.auth.current_session() => initial,
        };
        match initial {
            Ok(session) => self.apply(AuthChange::new(AuthEvent::InitialSession, session), &results_tx),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to resolve initial session");
                self.apply(AuthChange::new(AuthEvent::InitialSession, None), &results_tx);
            }
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                change = events.recv() => match change {
                    Ok(change) => self.apply(change, &results_tx),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Missed auth changes, resynchronizing");
                        match self.auth.current_session().await {
                            Ok(session) => self.apply(AuthChange::new(AuthEvent::InitialSession, session), &results_tx),
                            Err(e) => tracing::warn!(error = %e, "Resynchronization failed"),
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                Some((generation, outcome)) = results.recv() => self.apply_profile(generation, outcome),
            }
        }

        self.cancel_profile();
        tracing::debug!("Session handler stopped");
    }

    fn apply(&mut self, change: AuthChange, results: &mpsc::UnboundedSender<ProfileOutcome>) {
        tracing::debug!(event = ?change.event, has_session = change.session.is_some(), "Auth change");
        match (change.event, change.session) {
            (AuthEvent::PasswordRecovery, _) => {}
            (AuthEvent::SignedOut, _) | (_, None) => self.sign_out(),
            (_, Some(session)) => self.authenticate(session, results),
        }
    }

    fn sign_out(&mut self) {
        self.cancel_profile();
        self.state.send_replace(SessionState::Anonymous);
    }

    fn authenticate(&mut self, session: Session, results: &mpsc::UnboundedSender<ProfileOutcome>) {
        let email = session.email().map(str::to_string);
        let previous = self.state.borrow().clone();

        // Same identity: refresh the session, keep the profile (or the pending lookup).
        if let SessionState::Authenticated {
            session: old,
            profile,
            profile_loading,
        } = previous
        {
            if old.email() == email.as_deref() {
                self.state.send_replace(SessionState::Authenticated {
                    session,
                    profile,
                    profile_loading,
                });
                return;
            }
        }

        self.cancel_profile();
        let Some(email) = email else {
            self.state.send_replace(SessionState::Authenticated {
                session,
                profile: None,
                profile_loading: false,
            });
            return;
        };

        tracing::info!(email = %email, "Session authenticated");
        self.state.send_replace(SessionState::Authenticated {
            session,
            profile: None,
            profile_loading: true,
        });

        let token = CancellationToken::new();
        self.profile_token = Some(token.clone());
        let generation = self.generation;
        let profiles = Arc::clone(&self.profiles);
        let results = results.clone();
        tokio::spawn(async move {
            let outcome = profiles.fetch_profile(&email, &token).await;
            // The handler may be gone at shutdown.
            let _ = results.send((generation, outcome));
        });
    }

    fn apply_profile(&mut self, generation: u64, outcome: AppResult<Option<UserProfile>>) {
        if generation != self.generation {
            tracing::debug!(generation, current = self.generation, "Dropping stale profile result");
            return;
        }
        self.profile_token = None;

        let profile = match outcome {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(error = %e, "Profile lookup failed");
                None
            }
        };
        if profile.is_none() {
            tracing::warn!("No profile row for the signed-in email");
        }

        self.state.send_modify(|state| {
            if let SessionState::Authenticated {
                profile: slot,
                profile_loading,
                ..
            } = state
            {
                *slot = profile;
                *profile_loading = false;
            }
        });
    }

    /// Cancel the pending lookup and invalidate any result still in flight.
    fn cancel_profile(&mut self) {
        if let Some(token) = self.profile_token.take() {
            token.cancel();
        }
        self.generation += 1;
    }
}
