//! Login, per-request authentication, refresh rotation and logout.
//!
//! A token is only as good as the session record behind it: every access
//! token is rechecked against the store, so deleting the record revokes all
//! outstanding tokens for that subject at once.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::record::{SessionRecord, SessionSnapshot};
use super::store::{SessionStore, StoreError};
use crate::db::Identity;
use crate::jwt::{RefreshTokenResult, SignedToken, TokenCodec, TokenError};
use crate::password::verify_password_blocking;

/// What happens to older refresh tokens when a newer one is issued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum RotationPolicy {
    /// Every unexpired refresh token stays usable while the session exists.
    #[default]
    AllowConcurrent,
    /// Only the most recently issued refresh token is accepted.
    ///
    /// The check and the rotation are a read followed by a write, not one
    /// atomic step: two refreshes racing with the same current token can
    /// both succeed. Only sequential reuse of a superseded token is caught.
    RevokeOnRotate,
}

/// A freshly minted access/refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: SignedToken,
    pub refresh: RefreshTokenResult,
}

/// Tokens plus the snapshot they were issued for.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub tokens: TokenPair,
    pub user: SessionSnapshot,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("token has expired")]
    TokenExpired,
    #[error("token is malformed or was not issued by this server")]
    TokenMalformed,
    #[error("session is no longer active")]
    SessionRevoked,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to issue token: {0}")]
    Issue(#[source] TokenError),
    #[error("password verification task failed")]
    Task(#[from] tokio::task::JoinError),
}

impl From<TokenError> for SessionError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Expired => SessionError::TokenExpired,
            TokenError::Malformed | TokenError::InvalidSignature | TokenError::WrongPurpose => {
                SessionError::TokenMalformed
            }
            TokenError::Encoding(_) | TokenError::Clock => SessionError::Issue(e),
        }
    }
}

#[derive(Clone)]
pub struct SessionManager {
    codec: Arc<TokenCodec>,
    store: SessionStore,
    policy: RotationPolicy,
}

impl SessionManager {
    pub fn new(codec: Arc<TokenCodec>, store: SessionStore, policy: RotationPolicy) -> Self {
        Self {
            codec,
            store,
            policy,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Start a session for an already-verified identity.
    ///
    /// Tokens are returned only after the session record is written.
    pub async fn login(&self, identity: &Identity) -> Result<IssuedSession, SessionError> {
        let tokens = self.issue_pair(&identity.id)?;
        let user = SessionSnapshot::from(identity);

        let record = SessionRecord {
            user: user.clone(),
            refresh_jti: Some(tokens.refresh.jti.clone()),
        };
        self.store.put(&identity.id, &record).await?;

        info!(subject_id = %identity.id, "Session started");
        Ok(IssuedSession { tokens, user })
    }

    /// Check an email/password attempt and start a session on success.
    ///
    /// An unknown email and a wrong password fail identically and take the
    /// same Argon2 run to do so.
    pub async fn login_with_password(
        &self,
        identity: Option<Identity>,
        password: &str,
    ) -> Result<IssuedSession, SessionError> {
        if !verify_password_blocking(identity.as_ref(), password).await? {
            return Err(SessionError::InvalidCredentials);
        }
        match identity {
            Some(identity) => self.login(&identity).await,
            None => Err(SessionError::InvalidCredentials),
        }
    }

    /// Resolve an access token to the cached snapshot of its subject.
    pub async fn authenticate(&self, access_token: &str) -> Result<SessionSnapshot, SessionError> {
        let claims = self.codec.verify_access(access_token)?;

        match self.store.get(&claims.sub).await? {
            Some(record) => Ok(record.user),
            None => {
                debug!(subject_id = %claims.sub, "Access token for inactive session");
                Err(SessionError::SessionRevoked)
            }
        }
    }

    /// Exchange a refresh token for a new pair.
    pub async fn refresh(&self, refresh_token: &str) -> Result<IssuedSession, SessionError> {
        let claims = self.codec.verify_refresh(refresh_token)?;

        let Some(record) = self.store.get(&claims.sub).await? else {
            debug!(subject_id = %claims.sub, "Refresh token for inactive session");
            return Err(SessionError::SessionRevoked);
        };

        if self.policy == RotationPolicy::RevokeOnRotate
            && record.refresh_jti.as_deref() != Some(claims.jti.as_str())
        {
            warn!(subject_id = %claims.sub, "Superseded refresh token presented");
            return Err(SessionError::SessionRevoked);
        }

        let tokens = self.issue_pair(&claims.sub)?;
        let record = SessionRecord {
            user: record.user,
            refresh_jti: Some(tokens.refresh.jti.clone()),
        };
        self.store.put(&claims.sub, &record).await?;

        debug!(subject_id = %claims.sub, "Session refreshed");
        Ok(IssuedSession {
            tokens,
            user: record.user,
        })
    }

    /// End the session for a subject. Returns whether one existed.
    pub async fn logout(&self, subject_id: &str) -> Result<bool, SessionError> {
        let existed = self.store.delete(subject_id).await?;
        info!(subject_id = %subject_id, existed, "Session ended");
        Ok(existed)
    }

    /// Replace the cached snapshot after the identity changed.
    ///
    /// Does nothing if the subject has no session, so a concurrent logout is
    /// never undone. Returns whether a record was updated.
    pub async fn update_snapshot(&self, identity: &Identity) -> Result<bool, SessionError> {
        let Some(record) = self.store.get(&identity.id).await? else {
            return Ok(false);
        };

        let record = SessionRecord {
            user: SessionSnapshot::from(identity),
            refresh_jti: record.refresh_jti,
        };
        self.store.put(&identity.id, &record).await?;
        Ok(true)
    }

    fn issue_pair(&self, subject_id: &str) -> Result<TokenPair, SessionError> {
        let access = self
            .codec
            .issue_access(subject_id)
            .map_err(SessionError::Issue)?;
        let refresh = self
            .codec
            .issue_refresh(subject_id)
            .map_err(SessionError::Issue)?;
        Ok(TokenPair { access, refresh })
    }
}
