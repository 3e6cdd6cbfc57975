//! Auth backend: password sign-in, sign-up, sign-out, password change and
//! recovery against `/auth/v1`, plus the session change subscription.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use cosdesk_core::models::{AuthChange, AuthEvent, Session, SignUpOutcome, UserProfile};
use cosdesk_core::{AppError, AppResult};
use reqwest::Response;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::{transport_error, ApiClient};

const EVENT_CAPACITY: usize = 16;

/// Session operations the console depends on.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> AppResult<Session>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> AppResult<SignUpOutcome>;

    async fn sign_out(&self) -> AppResult<()>;

    /// Re-authenticate with `current` before setting `new`.
    async fn update_password(&self, current: &str, new: &str) -> AppResult<()>;

    async fn reset_password_for_email(&self, email: &str) -> AppResult<()>;

    /// The live session, refreshed first when it has expired.
    async fn current_session(&self) -> AppResult<Option<Session>>;

    fn subscribe(&self) -> broadcast::Receiver<AuthChange>;
}

/// Lookup of the application profile row for a session email.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn fetch_profile(
        &self,
        email: &str,
        signal: &CancellationToken,
    ) -> AppResult<Option<UserProfile>>;
}

/// Error bodies of the auth API come in two generations.
#[derive(Debug, Default, Deserialize)]
struct AuthApiError {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl AuthApiError {
    fn into_message(self) -> Option<String> {
        self.msg
            .or(self.message)
            .or(self.error_description)
            .or(self.error)
    }
}

/// HTTP implementation of [`AuthBackend`].
pub struct AuthClient {
    client: ApiClient,
    session: RwLock<Option<Session>>,
    events: broadcast::Sender<AuthChange>,
}

impl AuthClient {
    pub fn new(client: ApiClient) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            client,
            session: RwLock::new(None),
            events,
        }
    }

    /// Seed a previously persisted session without emitting an event.
    pub fn restore(&self, session: Option<Session>) {
        self.client
            .set_access_token(session.as_ref().map(|s| s.access_token.clone()));
        *self.session.write().unwrap_or_else(|e| e.into_inner()) = session;
    }

    /// Locally held session, expired or not.
    pub fn session(&self) -> Option<Session> {
        self.session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn store(&self, event: AuthEvent, session: Option<Session>) {
        self.restore(session.clone());
        tracing::debug!(event = ?event, "Auth state changed");
        // No receivers is fine; the CLI never subscribes.
        let _ = self.events.send(AuthChange::new(event, session));
    }

    async fn error_message(response: Response) -> String {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        serde_json::from_str::<AuthApiError>(&body)
            .ok()
            .and_then(AuthApiError::into_message)
            .unwrap_or_else(|| format!("auth request failed with status {}", status))
    }

    async fn token_request(&self, grant_type: &str, body: Value) -> AppResult<Session> {
        let url = self.client.build_url("/auth/v1/token");
        let response = self
            .client
            .apply_api_key(self.client.http().post(url))
            .query(&[("grant_type", grant_type)])
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(AppError::Auth(Self::error_message(response).await));
        }

        let session: Session = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Invalid session payload: {}", e)))?;
        Ok(session.with_absolute_expiry(Utc::now()))
    }

    /// Exchange the refresh token for a new session.
    pub async fn refresh(&self) -> AppResult<Session> {
        let refresh_token = self
            .session()
            .and_then(|s| s.refresh_token)
            .ok_or_else(|| AppError::Auth("session expired".to_string()))?;

        let session = self
            .token_request("refresh_token", json!({ "refresh_token": refresh_token }))
            .await?;
        self.store(AuthEvent::TokenRefreshed, Some(session.clone()));
        Ok(session)
    }
}

#[async_trait]
impl AuthBackend for AuthClient {
    async fn sign_in(&self, email: &str, password: &str) -> AppResult<Session> {
        let session = self
            .token_request("password", json!({ "email": email, "password": password }))
            .await?;
        tracing::info!(email = %email, "Signed in");
        self.store(AuthEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> AppResult<SignUpOutcome> {
        let mut body = json!({ "email": email, "password": password });
        if let Some(name) = name {
            body["data"] = json!({ "name": name });
        }

        let url = self.client.build_url("/auth/v1/signup");
        let response = self
            .client
            .apply_api_key(self.client.http().post(url))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(AppError::Auth(Self::error_message(response).await));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Invalid sign-up payload: {}", e)))?;

        // Without email confirmation the backend answers with a full session,
        // otherwise with the bare user.
        if payload.get("access_token").is_some() {
            let session: Session = serde_json::from_value(payload)?;
            let session = session.with_absolute_expiry(Utc::now());
            self.store(AuthEvent::SignedIn, Some(session.clone()));
            Ok(SignUpOutcome {
                session: Some(session),
                needs_verification: false,
            })
        } else {
            tracing::info!(email = %email, "Sign-up pending email verification");
            Ok(SignUpOutcome {
                session: None,
                needs_verification: true,
            })
        }
    }

    async fn sign_out(&self) -> AppResult<()> {
        if self.session().is_none() {
            self.store(AuthEvent::SignedOut, None);
            return Ok(());
        }

        let url = self.client.build_url("/auth/v1/logout");
        let result = self
            .client
            .apply_auth(self.client.http().post(url))
            .send()
            .await;

        // The local session is dropped whatever the backend says.
        self.store(AuthEvent::SignedOut, None);

        match result {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => {
                let message = Self::error_message(response).await;
                tracing::warn!(error = %message, "Remote sign-out failed");
                Ok(())
            }
            Err(e) => Err(transport_error(e)),
        }
    }

    async fn update_password(&self, current: &str, new: &str) -> AppResult<()> {
        let email = self
            .session()
            .and_then(|s| s.user.email)
            .ok_or_else(|| AppError::Auth("not signed in".to_string()))?;

        let session = match self
            .token_request("password", json!({ "email": email, "password": current }))
            .await
        {
            Ok(session) => session,
            Err(AppError::Auth(_)) => {
                return Err(AppError::Auth("current password incorrect".to_string()))
            }
            Err(e) => return Err(e),
        };
        self.store(AuthEvent::SignedIn, Some(session.clone()));

        let url = self.client.build_url("/auth/v1/user");
        let response = self
            .client
            .apply_auth(self.client.http().put(url))
            .json(&json!({ "password": new }))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(AppError::Auth(Self::error_message(response).await));
        }

        tracing::info!(email = %email, "Password updated");
        self.store(AuthEvent::UserUpdated, Some(session));
        Ok(())
    }

    async fn reset_password_for_email(&self, email: &str) -> AppResult<()> {
        let url = self.client.build_url("/auth/v1/recover");
        let response = self
            .client
            .apply_api_key(self.client.http().post(url))
            .json(&json!({ "email": email }))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(AppError::Auth(Self::error_message(response).await));
        }
        tracing::info!(email = %email, "Password recovery email requested");
        Ok(())
    }

    async fn current_session(&self) -> AppResult<Option<Session>> {
        let Some(session) = self.session() else {
            return Ok(None);
        };
        if !session.is_expired() {
            return Ok(Some(session));
        }

        if session.refresh_token.is_some() {
            match self.refresh().await {
                Ok(refreshed) => return Ok(Some(refreshed)),
                Err(AppError::Transport(msg)) => return Err(AppError::Transport(msg)),
                Err(e) => tracing::warn!(error = %e, "Session refresh failed"),
            }
        }

        self.store(AuthEvent::SignedOut, None);
        Ok(None)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
        self.events.subscribe()
    }
}
