//! Email/password sign-up through an activation envelope, and social sign-in.
//!
//! Registration never touches the identity table: the pending account travels
//! inside a signed, short-lived activation token together with a 4-digit code
//! that is mailed to the user. Only a matching code creates the identity.

use std::sync::Arc;

use rand::Rng;
use serde_json::json;
use tracing::{info, warn};

use crate::db::{Avatar, Identity, IdentityStore};
use crate::jwt::{PendingRegistration, SignedToken, TokenCodec, TokenError};
use crate::mail::{ACTIVATION_TEMPLATE, MailError, Mailer};
use crate::password::{HashError, MIN_PASSWORD_LENGTH, hash_password};

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("{0}")]
    InvalidInput(&'static str),
    #[error("email is already registered")]
    DuplicateIdentity,
    #[error("activation code does not match")]
    ActivationCodeMismatch,
    #[error("activation token has expired")]
    ActivationExpired,
    #[error("activation token is invalid")]
    ActivationInvalid,
    #[error(transparent)]
    Mail(#[from] MailError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Hash(#[from] HashError),
    #[error("failed to issue activation token: {0}")]
    Token(#[source] TokenError),
    #[error("password hashing task failed")]
    Task(#[from] tokio::task::JoinError),
}

/// Basic shape check: one `@`, a non-empty local part, a dotted domain, no spaces.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

pub fn validate_name(name: &str) -> Result<(), RegistrationError> {
    if name.trim().is_empty() {
        return Err(RegistrationError::InvalidInput("Please enter your name"));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), RegistrationError> {
    if !is_valid_email(email) {
        return Err(RegistrationError::InvalidInput(
            "Please enter a valid email",
        ));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), RegistrationError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(RegistrationError::InvalidInput(
            "Password must be at least 6 characters",
        ));
    }
    Ok(())
}

/// Hash off the async executor; Argon2 is deliberately slow.
pub async fn hash_password_blocking(password: &str) -> Result<String, RegistrationError> {
    let password = password.to_string();
    let hash = tokio::task::spawn_blocking(move || hash_password(&password)).await??;
    Ok(hash)
}

fn activation_code() -> String {
    rand::rng().random_range(1000..10000).to_string()
}

#[derive(Clone)]
pub struct Registrar {
    codec: Arc<TokenCodec>,
    identities: IdentityStore,
    mailer: Arc<dyn Mailer>,
}

impl Registrar {
    pub fn new(codec: Arc<TokenCodec>, identities: IdentityStore, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            codec,
            identities,
            mailer,
        }
    }

    /// Validate, mail an activation code and return the activation token.
    ///
    /// Nothing is persisted. If the mail cannot be sent the token is not
    /// returned either.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<SignedToken, RegistrationError> {
        validate_name(name)?;
        validate_email(email)?;
        validate_password(password)?;

        if self.identities.find_by_email(email).await?.is_some() {
            return Err(RegistrationError::DuplicateIdentity);
        }

        let pending = PendingRegistration {
            name: name.trim().to_string(),
            email: email.to_string(),
            password_hash: hash_password_blocking(password).await?,
        };
        let code = activation_code();
        let token = self
            .codec
            .issue_activation(&pending, &code)
            .map_err(RegistrationError::Token)?;

        let data = json!({
            "user": { "name": pending.name },
            "activationCode": code,
        });
        self.mailer.send(email, ACTIVATION_TEMPLATE, data).await?;

        info!(email = %email, "Activation code sent");
        Ok(token)
    }

    /// Create the identity carried by an activation token.
    ///
    /// A replayed token finds the email taken and fails with
    /// `DuplicateIdentity`, so at most one identity is ever created.
    pub async fn activate(
        &self,
        activation_token: &str,
        activation_code: &str,
    ) -> Result<Identity, RegistrationError> {
        let claims = self
            .codec
            .verify_activation(activation_token)
            .map_err(|e| match e {
                TokenError::Expired => RegistrationError::ActivationExpired,
                _ => RegistrationError::ActivationInvalid,
            })?;

        if claims.activation_code != activation_code {
            return Err(RegistrationError::ActivationCodeMismatch);
        }

        let pending = claims.user;
        let mut identity = Identity::new(&pending.name, &pending.email, Some(pending.password_hash));
        identity.is_verified = true;

        if !self.identities.insert(&identity).await? {
            warn!(email = %identity.email, "Activation for an email that is already registered");
            return Err(RegistrationError::DuplicateIdentity);
        }

        info!(subject_id = %identity.id, "Identity activated");
        Ok(identity)
    }

    /// Find or create the identity for a social sign-in.
    ///
    /// Existing identities are returned unchanged; new ones have no password.
    pub async fn social_identity(
        &self,
        email: &str,
        name: &str,
        avatar: Option<Avatar>,
    ) -> Result<Identity, RegistrationError> {
        validate_email(email)?;

        if let Some(existing) = self.identities.find_by_email(email).await? {
            return Ok(existing);
        }

        validate_name(name)?;
        let mut identity = Identity::new(name.trim(), email, None);
        identity.is_verified = true;
        identity.avatar = avatar;

        if self.identities.insert(&identity).await? {
            info!(subject_id = %identity.id, "Identity created from social sign-in");
            return Ok(identity);
        }

        // Lost a race with a concurrent sign-in for the same email.
        self.identities
            .find_by_email(email)
            .await?
            .ok_or(RegistrationError::DuplicateIdentity)
    }
}
