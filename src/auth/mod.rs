//! Session-token issuance and verification.
//!
//! Provides:
//! - Credential login against the store (uniform failure for unknown email
//!   vs. wrong password)
//! - Stateless HS256-signed session tokens carrying subject + expiry
//! - Token verification with a strict expiry boundary and zero clock leeway
//!
//! ## Design Decisions
//! - Tokens are never persisted server-side: the signature and the `exp`
//!   claim are the whole validity story. There is no revocation and no
//!   refresh; an expired token is terminal and the client logs in again.
//! - The signing secret is injected at construction, never read from the
//!   environment inside the issuer.

pub mod token;

pub use token::{AuthError, Claims, TokenIssuer, DEFAULT_TOKEN_TTL};
