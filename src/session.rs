//! Identity session lifecycle.
//!
//! The manager owns the only copy of the session. Callers get clones of a
//! session that was either just refreshed or just issued by a full login.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::AuthError;
use crate::types::{Credentials, Session};

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Full username/password authentication.
    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, AuthError>;

    /// Exchanges the session's refresh token for new id/access tokens.
    async fn refresh(&self, session: &Session) -> Result<Session, AuthError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Refreshing,
    Authenticated(Session),
}

pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    credentials: Credentials,
    state: SessionState,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn IdentityProvider>, credentials: Credentials) -> Self {
        SessionManager {
            provider,
            credentials,
            state: SessionState::Unauthenticated,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, SessionState::Authenticated(_))
    }

    /// Drops any session so the next `ensure_valid` performs a full login.
    pub fn invalidate(&mut self) {
        if self.is_authenticated() {
            info!("Discarding identity session");
        }
        self.state = SessionState::Unauthenticated;
    }

    pub async fn login(&mut self) -> Result<Session, AuthError> {
        self.state = SessionState::Unauthenticated;
        let session = self.provider.authenticate(&self.credentials).await?;
        info!(
            username = %self.credentials.username,
            expires_at = ?session.expires_at,
            "Logged in to identity provider"
        );
        self.state = SessionState::Authenticated(session.clone());
        Ok(session)
    }

    /// Returns a usable session. An existing session is always refreshed
    /// first since expiry cannot be checked locally; if the refresh fails the
    /// session is dropped and a full login is attempted.
    pub async fn ensure_valid(&mut self) -> Result<Session, AuthError> {
        let current = match std::mem::replace(&mut self.state, SessionState::Refreshing) {
            SessionState::Authenticated(session) => session,
            SessionState::Unauthenticated | SessionState::Refreshing => return self.login().await,
        };

        match self.provider.refresh(&current).await {
            Ok(fresh) => {
                self.state = SessionState::Authenticated(fresh.clone());
                Ok(fresh)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, logging in again");
                self.state = SessionState::Unauthenticated;
                self.login().await.map_err(|source| AuthError::ReauthRequired {
                    source: Box::new(source),
                })
            }
        }
    }
}
