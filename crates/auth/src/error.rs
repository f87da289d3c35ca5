//! Error types for the authentication core

use crate::email::EmailError;
use crate::jwt::TokenError;
use crate::password::PasswordError;
use crate::qr::QrError;
use crate::store::StoreError;
use crate::tokens::ResetTokenError;
use crate::totp::TotpError;

/// Authentication error type
///
/// Failure modes that would aid account enumeration carry deliberately
/// uniform messages (`InvalidCredentials` never says whether the username
/// exists); everything else is precise so callers can distinguish a wrong
/// MFA code from a malformed one.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    // Authentication errors
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Invalid verification code")]
    InvalidCode,
    #[error("Code must be 6 digits")]
    InvalidFormat,
    #[error("Invalid or expired login session")]
    InvalidSession,
    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,

    // Registration errors
    #[error("Email already registered")]
    EmailAlreadyExists,
    #[error("Username already taken")]
    UsernameTaken,

    // Validation errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Collaborator errors
    #[error("Email delivery failed: {0}")]
    Delivery(String),
    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    // Internal errors (corrupt stored state or crypto failure, never user input)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience result alias used across the crate
pub type AuthResult<T> = Result<T, AuthError>;

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            // Conflicts only arise from inserts; the message names the
            // violated column (memory store) or constraint (Postgres).
            StoreError::Conflict(detail) => {
                if detail.contains("username") {
                    AuthError::UsernameTaken
                } else {
                    AuthError::EmailAlreadyExists
                }
            }
            StoreError::Unavailable(detail) => AuthError::DependencyUnavailable(detail),
        }
    }
}

impl From<EmailError> for AuthError {
    fn from(err: EmailError) -> Self {
        AuthError::Delivery(err.to_string())
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Encoding(detail) => AuthError::Internal(detail),
            TokenError::Expired | TokenError::Invalid | TokenError::WrongTokenType => {
                AuthError::InvalidSession
            }
        }
    }
}

impl From<TotpError> for AuthError {
    fn from(err: TotpError) -> Self {
        match err {
            TotpError::InvalidFormat => AuthError::InvalidFormat,
            other => AuthError::Internal(other.to_string()),
        }
    }
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl From<ResetTokenError> for AuthError {
    fn from(_: ResetTokenError) -> Self {
        // Uniform by design: callers must not learn why a reset token failed.
        AuthError::InvalidOrExpiredToken
    }
}

impl From<QrError> for AuthError {
    fn from(err: QrError) -> Self {
        AuthError::Internal(err.to_string())
    }
}
