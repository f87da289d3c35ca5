//! Password-reset tokens
//!
//! Reset tokens are stateless: `{uid_b64}.{exp}.{mac}` where the MAC is an
//! HMAC-SHA256 over the user id, the user's *current* password hash, and the
//! expiry timestamp. Binding the MAC to the live password hash makes every
//! outstanding token for a user die the moment the password changes — no
//! token table, no consumed-at bookkeeping.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::store::UserCredential;

type HmacSha256 = Hmac<Sha256>;

/// Domain separation so a reset MAC can never double as any other signature
/// made with the same key.
const RESET_TOKEN_CONTEXT: &[u8] = b"workforce-auth.password-reset.v1";

#[derive(Debug, thiserror::Error)]
pub enum ResetTokenError {
    #[error("Malformed reset token")]
    Malformed,
    #[error("Reset token has expired")]
    Expired,
    #[error("Reset token signature mismatch")]
    BadSignature,
    #[error("Signing failure")]
    Crypto,
}

/// Mints and checks password-reset tokens.
pub struct ResetTokenGenerator {
    key: Vec<u8>,
    ttl: Duration,
}

impl ResetTokenGenerator {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            key: config.signing_key.as_bytes().to_vec(),
            ttl: config.reset_token_ttl,
        }
    }

    /// Mint a token for the user's current password-hash state.
    pub fn make_token(&self, user: &UserCredential) -> Result<String, ResetTokenError> {
        self.make_token_at(user, OffsetDateTime::now_utc().unix_timestamp())
    }

    /// Mint a token as of an explicit timestamp.
    pub fn make_token_at(
        &self,
        user: &UserCredential,
        now: i64,
    ) -> Result<String, ResetTokenError> {
        let exp = now + self.ttl.whole_seconds();
        let mac = self.signature(user.id, &user.password_hash, exp)?;
        Ok(format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode(user.id.as_bytes()),
            exp,
            mac
        ))
    }

    /// Extract the user id so the caller can load the record the MAC must be
    /// checked against. Performs no verification by itself.
    pub fn subject(token: &str) -> Result<Uuid, ResetTokenError> {
        let uid_b64 = token.split('.').next().ok_or(ResetTokenError::Malformed)?;
        let bytes = URL_SAFE_NO_PAD
            .decode(uid_b64)
            .map_err(|_| ResetTokenError::Malformed)?;
        Uuid::from_slice(&bytes).map_err(|_| ResetTokenError::Malformed)
    }

    /// Verify a token against the live user record and the system clock.
    pub fn verify(&self, token: &str, user: &UserCredential) -> Result<(), ResetTokenError> {
        self.verify_at(token, user, OffsetDateTime::now_utc().unix_timestamp())
    }

    /// Verify a token as of an explicit timestamp.
    ///
    /// The MAC covers the user id and the user's current password hash, so a
    /// token issued before a password change fails here with `BadSignature`;
    /// that is the single-use property.
    pub fn verify_at(
        &self,
        token: &str,
        user: &UserCredential,
        now: i64,
    ) -> Result<(), ResetTokenError> {
        let mut parts = token.split('.');
        let (Some(_uid), Some(exp), Some(mac), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ResetTokenError::Malformed);
        };

        let exp: i64 = exp.parse().map_err(|_| ResetTokenError::Malformed)?;
        if now >= exp {
            return Err(ResetTokenError::Expired);
        }

        let tag = hex::decode(mac).map_err(|_| ResetTokenError::Malformed)?;
        self.mac(user.id, &user.password_hash, exp)?
            .verify_slice(&tag)
            .map_err(|_| ResetTokenError::BadSignature)
    }

    fn mac(
        &self,
        user_id: Uuid,
        password_hash: &str,
        exp: i64,
    ) -> Result<HmacSha256, ResetTokenError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).map_err(|_| ResetTokenError::Crypto)?;
        mac.update(RESET_TOKEN_CONTEXT);
        mac.update(user_id.as_bytes());
        mac.update(password_hash.as_bytes());
        mac.update(&exp.to_be_bytes());
        Ok(mac)
    }

    fn signature(
        &self,
        user_id: Uuid,
        password_hash: &str,
        exp: i64,
    ) -> Result<String, ResetTokenError> {
        Ok(hex::encode(
            self.mac(user_id, password_hash, exp)?.finalize().into_bytes(),
        ))
    }
}
