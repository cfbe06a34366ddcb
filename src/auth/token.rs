//! HS256 session tokens: issue on login, verify on every protected request.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::database::{Database, DatabaseError};

/// Default session lifetime: 24 hours.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(24 * 3600);

/// Token-layer errors. Every verification failure shape (garbage input,
/// bad signature, expired) collapses into `Unauthorized` so responses
/// cannot leak which check rejected the token.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid or expired session token")]
    Unauthorized,
    #[error("token signing failed")]
    Signing(#[source] jsonwebtoken::errors::Error),
    #[error(transparent)]
    Database(DatabaseError),
}

/// Signed claim set: subject identity plus issue/expiry instants
/// (Unix epoch seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies stateless session tokens.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    default_ttl: Duration,
}

impl TokenIssuer {
    /// Build an issuer around the process signing secret.
    pub fn new(secret: &str, default_ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            default_ttl,
        }
    }

    /// Verify a credential pair against the store and issue a token for the
    /// matched user. Unknown email and wrong password both surface as
    /// `Unauthorized`; the store keeps their timing comparable.
    pub fn login(
        &self,
        db: &Database,
        email: &str,
        password: &str,
    ) -> Result<String, AuthError> {
        let user = db.authenticate(email, password).map_err(|e| match e {
            DatabaseError::InvalidCredentials => AuthError::Unauthorized,
            other => AuthError::Database(other),
        })?;
        self.issue_session(&user.id)
    }

    /// Sign a token for `subject` with the issuer's default lifetime.
    pub fn issue_session(&self, subject: &str) -> Result<String, AuthError> {
        self.issue_token(subject, self.default_ttl)
    }

    /// Sign a token for `subject` expiring `ttl` from now.
    pub fn issue_token(&self, subject: &str, ttl: Duration) -> Result<String, AuthError> {
        let now = epoch_secs();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now,
            exp: now + ttl.as_secs() as i64,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(AuthError::Signing)
    }

    /// Verify signature and expiry, returning the subject identity.
    ///
    /// A token is valid only while now < exp: the boundary instant itself
    /// is already expired, and no clock leeway is granted.
    pub fn verify_token(&self, token: &str) -> Result<String, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| AuthError::Unauthorized)?;

        if epoch_secs() >= data.claims.exp {
            return Err(AuthError::Unauthorized);
        }
        Ok(data.claims.sub)
    }
}

fn epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
