//! Purpose-bound JWT generation and validation.
//!
//! Three token purposes share one codec but never one secret:
//! - Activation tokens: wrap a pending registration (5 minutes)
//! - Access tokens: short-lived (5 minutes), rechecked against the session store
//! - Refresh tokens: long-lived (3 days), exchanged for a new token pair
//!
//! The purpose is also written into the `typ` claim, so a token signed with
//! the right key but for the wrong purpose is still rejected.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::{SystemTime, UNIX_EPOCH};

/// Token purpose, bound into both the signing key and the claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Activation,
    Access,
    Refresh,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::Activation => "activation",
            TokenPurpose::Access => "access",
            TokenPurpose::Refresh => "refresh",
        }
    }

    /// Lifetime of a token issued for this purpose, in seconds.
    pub fn ttl_secs(&self) -> u64 {
        match self {
            TokenPurpose::Activation => ACTIVATION_TOKEN_DURATION_SECS,
            TokenPurpose::Access => ACCESS_TOKEN_DURATION_SECS,
            TokenPurpose::Refresh => REFRESH_TOKEN_DURATION_SECS,
        }
    }
}

/// Access token duration: 5 minutes
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 5 * 60;

/// Refresh token duration: 3 days
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 3 * 24 * 60 * 60;

/// Activation token duration: 5 minutes
pub const ACTIVATION_TOKEN_DURATION_SECS: u64 = 5 * 60;

/// Minimum accepted length of each signing secret.
pub const MIN_SECRET_LENGTH: usize = 32;

/// JWT claims for access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (identity id)
    pub sub: String,
    /// Token purpose
    #[serde(rename = "typ")]
    pub purpose: TokenPurpose,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// JWT claims for refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// JWT ID, compared against the session record under revoke-on-rotate
    pub jti: String,
    /// Subject (identity id)
    pub sub: String,
    /// Token purpose
    #[serde(rename = "typ")]
    pub purpose: TokenPurpose,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Registration data carried inside an activation token until the code is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRegistration {
    pub name: String,
    pub email: String,
    /// Argon2 PHC string; the plaintext password never enters a token.
    pub password_hash: String,
}

/// JWT claims for activation tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationClaims {
    pub user: PendingRegistration,
    pub activation_code: String,
    #[serde(rename = "typ")]
    pub purpose: TokenPurpose,
    pub iat: u64,
    pub exp: u64,
}

trait PurposeBound {
    fn purpose(&self) -> TokenPurpose;
}

impl PurposeBound for AccessClaims {
    fn purpose(&self) -> TokenPurpose {
        self.purpose
    }
}

impl PurposeBound for RefreshClaims {
    fn purpose(&self) -> TokenPurpose {
        self.purpose
    }
}

impl PurposeBound for ActivationClaims {
    fn purpose(&self) -> TokenPurpose {
        self.purpose
    }
}

/// One independently configured secret per token purpose.
#[derive(Clone)]
pub struct TokenSecrets {
    pub activation: Vec<u8>,
    pub access: Vec<u8>,
    pub refresh: Vec<u8>,
}

impl TokenSecrets {
    /// Reject short secrets and secrets shared between purposes.
    pub fn validate(&self) -> Result<(), SecretError> {
        for (purpose, secret) in [
            (TokenPurpose::Activation, &self.activation),
            (TokenPurpose::Access, &self.access),
            (TokenPurpose::Refresh, &self.refresh),
        ] {
            if secret.len() < MIN_SECRET_LENGTH {
                return Err(SecretError::TooShort(purpose.as_str()));
            }
        }

        if self.activation == self.access
            || self.activation == self.refresh
            || self.access == self.refresh
        {
            return Err(SecretError::Shared);
        }

        Ok(())
    }
}

impl std::fmt::Debug for TokenSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenSecrets { .. }")
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SecretError {
    #[error("{0} secret is shorter than {MIN_SECRET_LENGTH} bytes")]
    TooShort(&'static str),
    #[error("each token purpose needs its own secret")]
    Shared,
}

#[derive(Clone)]
struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// Signs and verifies tokens for all three purposes.
#[derive(Clone)]
pub struct TokenCodec {
    activation: SigningKeys,
    access: SigningKeys,
    refresh: SigningKeys,
}

/// Result of signing an access or activation token.
#[derive(Debug, Clone)]
pub struct SignedToken {
    /// The JWT token string
    pub token: String,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

/// Result of generating a refresh token (with JTI for rotation tracking).
#[derive(Debug, Clone)]
pub struct RefreshTokenResult {
    /// The JWT token string
    pub token: String,
    /// JWT ID
    pub jti: String,
    /// Issued at timestamp (Unix seconds)
    pub issued_at: u64,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

impl TokenCodec {
    pub fn new(secrets: &TokenSecrets) -> Self {
        Self {
            activation: SigningKeys::new(&secrets.activation),
            access: SigningKeys::new(&secrets.access),
            refresh: SigningKeys::new(&secrets.refresh),
        }
    }

    fn keys(&self, purpose: TokenPurpose) -> &SigningKeys {
        match purpose {
            TokenPurpose::Activation => &self.activation,
            TokenPurpose::Access => &self.access,
            TokenPurpose::Refresh => &self.refresh,
        }
    }

    /// Generate an access token for a subject.
    pub fn issue_access(&self, subject_id: &str) -> Result<SignedToken, TokenError> {
        self.issue_access_at(subject_id, unix_now()?)
    }

    /// Generate an access token as if issued at `now` (Unix seconds).
    pub fn issue_access_at(&self, subject_id: &str, now: u64) -> Result<SignedToken, TokenError> {
        let purpose = TokenPurpose::Access;
        let claims = AccessClaims {
            sub: subject_id.to_string(),
            purpose,
            iat: now,
            exp: now + purpose.ttl_secs(),
        };
        let token = self.sign(purpose, &claims)?;

        Ok(SignedToken {
            token,
            expires_at: claims.exp,
            duration: purpose.ttl_secs(),
        })
    }

    /// Generate a refresh token with a fresh JTI.
    pub fn issue_refresh(&self, subject_id: &str) -> Result<RefreshTokenResult, TokenError> {
        self.issue_refresh_at(subject_id, unix_now()?)
    }

    pub fn issue_refresh_at(
        &self,
        subject_id: &str,
        now: u64,
    ) -> Result<RefreshTokenResult, TokenError> {
        let purpose = TokenPurpose::Refresh;
        let jti = uuid::Uuid::new_v4().to_string();
        let claims = RefreshClaims {
            jti: jti.clone(),
            sub: subject_id.to_string(),
            purpose,
            iat: now,
            exp: now + purpose.ttl_secs(),
        };
        let token = self.sign(purpose, &claims)?;

        Ok(RefreshTokenResult {
            token,
            jti,
            issued_at: now,
            expires_at: claims.exp,
            duration: purpose.ttl_secs(),
        })
    }

    /// Wrap a pending registration and its activation code in a signed envelope.
    pub fn issue_activation(
        &self,
        pending: &PendingRegistration,
        activation_code: &str,
    ) -> Result<SignedToken, TokenError> {
        self.issue_activation_at(pending, activation_code, unix_now()?)
    }

    pub fn issue_activation_at(
        &self,
        pending: &PendingRegistration,
        activation_code: &str,
        now: u64,
    ) -> Result<SignedToken, TokenError> {
        let purpose = TokenPurpose::Activation;
        let claims = ActivationClaims {
            user: pending.clone(),
            activation_code: activation_code.to_string(),
            purpose,
            iat: now,
            exp: now + purpose.ttl_secs(),
        };
        let token = self.sign(purpose, &claims)?;

        Ok(SignedToken {
            token,
            expires_at: claims.exp,
            duration: purpose.ttl_secs(),
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.verify(token, TokenPurpose::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        self.verify(token, TokenPurpose::Refresh)
    }

    pub fn verify_activation(&self, token: &str) -> Result<ActivationClaims, TokenError> {
        self.verify(token, TokenPurpose::Activation)
    }

    fn sign<C: Serialize>(&self, purpose: TokenPurpose, claims: &C) -> Result<String, TokenError> {
        jsonwebtoken::encode(&Header::default(), claims, &self.keys(purpose).encoding)
            .map_err(TokenError::Encoding)
    }

    fn verify<C>(&self, token: &str, purpose: TokenPurpose) -> Result<C, TokenError>
    where
        C: DeserializeOwned + PurposeBound,
    {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let token_data =
            jsonwebtoken::decode::<C>(token, &self.keys(purpose).decoding, &validation).map_err(
                |e| match e.kind() {
                    ErrorKind::ExpiredSignature => TokenError::Expired,
                    ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                    _ => TokenError::Malformed,
                },
            )?;

        if token_data.claims.purpose() != purpose {
            return Err(TokenError::WrongPurpose);
        }

        Ok(token_data.claims)
    }
}

/// Current Unix time in seconds.
pub fn unix_now() -> Result<u64, TokenError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| TokenError::Clock)
}

/// Errors that can occur during token operations.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token could not be decoded")]
    Malformed,
    #[error("token signature does not match")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("token was issued for a different purpose")]
    WrongPurpose,
    #[error("failed to encode token: {0}")]
    Encoding(#[source] jsonwebtoken::errors::Error),
    #[error("system time error")]
    Clock,
}
