//! Bearer-token codec (JWT, HS256)
//!
//! Three token classes flow through here: access tokens, refresh tokens, and
//! the short-lived MFA-pending token a client holds between the password
//! check and second-factor verification. The pending token is an
//! access-class token flagged with the `mfa_pending` claim; session
//! validation refuses any token carrying that flag, and the MFA-completion
//! path accepts nothing else.

use jsonwebtoken::{
    encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::config::AuthConfig;

/// Session-token class carried in the `token_type` claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claims carried by every token this core issues
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: Uuid,
    /// Issued at (Unix seconds, UTC)
    pub iat: i64,
    /// Expiry (Unix seconds, UTC)
    pub exp: i64,
    /// Token class
    pub token_type: TokenType,
    /// Set only on the temporary token issued after a correct password when
    /// the account still owes a second factor.
    #[serde(default, skip_serializing_if = "is_false")]
    pub mfa_pending: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
    #[error("Wrong token type")]
    WrongTokenType,
    #[error("Failed to encode token: {0}")]
    Encoding(String),
}

/// Signs, verifies, and decodes bearer tokens.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    mfa_pending_ttl: Duration,
}

impl TokenCodec {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.signing_key.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.signing_key.as_bytes()),
            access_ttl: config.access_token_ttl,
            refresh_ttl: config.refresh_token_ttl,
            mfa_pending_ttl: config.mfa_pending_ttl,
        }
    }

    /// Access-token lifetime in seconds, for `expires_in` style responses.
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl.whole_seconds()
    }

    pub fn issue_access_token(&self, user_id: Uuid) -> Result<String, TokenError> {
        self.issue(user_id, self.access_ttl, TokenType::Access, false)
    }

    pub fn issue_refresh_token(&self, user_id: Uuid) -> Result<String, TokenError> {
        self.issue(user_id, self.refresh_ttl, TokenType::Refresh, false)
    }

    /// Issue the access + refresh pair handed out after full authentication.
    pub fn issue_session_pair(&self, user_id: Uuid) -> Result<(String, String), TokenError> {
        Ok((
            self.issue_access_token(user_id)?,
            self.issue_refresh_token(user_id)?,
        ))
    }

    /// Issue the temporary token that proves password correctness while a
    /// second factor is still owed.
    pub fn issue_mfa_pending_token(&self, user_id: Uuid) -> Result<String, TokenError> {
        self.issue(user_id, self.mfa_pending_ttl, TokenType::Access, true)
    }

    fn issue(
        &self,
        user_id: Uuid,
        ttl: Duration,
        token_type: TokenType,
        mfa_pending: bool,
    ) -> Result<String, TokenError> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp(),
            exp: (now + ttl).unix_timestamp(),
            token_type,
            mfa_pending,
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    /// Verify signature and expiry, returning the claims.
    ///
    /// The algorithm is pinned to HS256 so a forged header cannot downgrade
    /// verification, and leeway is zero: a token is live strictly while
    /// `now < exp`.
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }

    /// Decode and require a plain access token (MFA-pending tokens refused).
    pub fn validate_access_token(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.decode(token)?;
        if claims.token_type != TokenType::Access || claims.mfa_pending {
            return Err(TokenError::WrongTokenType);
        }
        Ok(claims)
    }

    /// Decode and require a refresh token (MFA-pending tokens refused).
    pub fn validate_refresh_token(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.decode(token)?;
        if claims.token_type != TokenType::Refresh || claims.mfa_pending {
            return Err(TokenError::WrongTokenType);
        }
        Ok(claims)
    }

    /// Decode and require the `mfa_pending` claim.
    pub fn validate_mfa_pending_token(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.decode(token)?;
        if !claims.mfa_pending {
            return Err(TokenError::WrongTokenType);
        }
        Ok(claims)
    }
}
