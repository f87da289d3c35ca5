//! Login and MFA orchestration
//!
//! The state machine at the center of the crate:
//! `Unauthenticated → CredentialsValid → {SessionActive | MFAPending} →
//! SessionActive`. A correct password either finishes the login outright or
//! yields a short-lived MFA-pending token; that token plus a TOTP code or
//! backup code is the only way to reach a session for an MFA-enabled
//! account. The pending token is also the sole source of identity for the
//! completion step, so a caller cannot complete someone else's login.

use std::future::Future;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Serialize;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::jwt::TokenCodec;
use crate::password::{self, MIN_PASSWORD_LENGTH};
use crate::qr::QrRenderer;
use crate::store::{MfaState, UserCredential, UserStore};
use crate::totp::{self, TotpVerifier};

/// Argon2id hash of a throwaway password, verified when a login names an
/// unknown username so both failure paths cost one hash comparison.
const DUMMY_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$gZiV/M1gPc22ElAH/Jh1Hw$CWOrkoo7oJBQ/iyh7uJ0LO2aLEfrHwTWllSAxT0zRno";

/// Run a collaborator call against the configured deadline. A store or
/// mailer that hangs surfaces as `DependencyUnavailable` instead of
/// stalling the request.
pub(crate) async fn bounded<T, E, F>(
    limit: std::time::Duration,
    what: &'static str,
    call: F,
) -> AuthResult<T>
where
    E: Into<AuthError>,
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(AuthError::DependencyUnavailable(format!(
            "{what} timed out"
        ))),
    }
}

/// Validates username/password against the stored Argon2id hash. First step
/// of every login; issues no tokens itself.
pub struct CredentialAuthenticator<S> {
    store: Arc<S>,
    timeout: std::time::Duration,
}

impl<S: UserStore> CredentialAuthenticator<S> {
    pub fn new(config: &AuthConfig, store: Arc<S>) -> Self {
        Self {
            store,
            timeout: config.dependency_timeout,
        }
    }

    /// Look up the user and verify the password. The error is the same
    /// whether the username is unknown or the password is wrong; no side
    /// effects on failure.
    pub async fn authenticate(&self, username: &str, pass: &str) -> AuthResult<UserCredential> {
        let user = bounded(
            self.timeout,
            "find_by_username",
            self.store.find_by_username(username),
        )
        .await?;

        let Some(user) = user else {
            // Equalize cost with the found-user path before failing.
            let _ = password::verify_password(pass, DUMMY_HASH);
            tracing::warn!("login attempt for unknown username");
            return Err(AuthError::InvalidCredentials);
        };

        if !password::verify_password(pass, &user.password_hash)? {
            tracing::warn!(user_id = %user.id, "invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        Ok(user)
    }
}

/// Access + refresh pair handed out after full authentication.
#[derive(Debug, Clone, Serialize)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Returned from `login` when the account still owes a second factor.
#[derive(Debug, Clone, Serialize)]
pub struct MfaChallenge {
    pub requires_mfa: bool,
    pub temp_token: String,
}

/// Either a finished session or an MFA challenge.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum LoginOutcome {
    MfaRequired(MfaChallenge),
    Success(SessionTokens),
}

/// Enrollment material returned from `setup_mfa`. The secret and backup
/// codes appear here once and are never echoed back afterwards.
#[derive(Debug, Serialize)]
pub struct MfaSetup {
    pub secret: String,
    pub provisioning_uri: String,
    /// PNG data URL for enrollment screens.
    pub qr_code: String,
    pub backup_codes: Vec<String>,
}

/// Coordinates credential checks, TOTP verification, and token issuance.
pub struct MfaOrchestrator<S, Q> {
    store: Arc<S>,
    qr: Q,
    authenticator: CredentialAuthenticator<S>,
    codec: TokenCodec,
    totp: TotpVerifier,
    timeout: std::time::Duration,
}

impl<S: UserStore, Q: QrRenderer> MfaOrchestrator<S, Q> {
    pub fn new(config: &AuthConfig, store: Arc<S>, qr: Q) -> Self {
        Self {
            authenticator: CredentialAuthenticator::new(config, Arc::clone(&store)),
            codec: TokenCodec::new(config),
            totp: TotpVerifier::new(config),
            timeout: config.dependency_timeout,
            store,
            qr,
        }
    }

    /// The codec issuing this orchestrator's tokens, for embedders that
    /// validate access tokens per-request.
    pub fn token_codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn totp_verifier(&self) -> &TotpVerifier {
        &self.totp
    }

    /// Create a new account. Email is normalized to lowercase; duplicate
    /// username/email map to their own errors.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        full_name: &str,
        pass: &str,
    ) -> AuthResult<UserCredential> {
        let username = username.trim();
        let email = email.trim().to_lowercase();
        if username.is_empty() || email.is_empty() {
            return Err(AuthError::InvalidRequest(
                "username and email are required".to_string(),
            ));
        }
        if pass.len() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::InvalidRequest(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }

        let user = UserCredential::new(username, &email, full_name.trim(), pass)?;
        bounded(self.timeout, "insert_user", self.store.insert_user(&user)).await?;

        tracing::info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Verify credentials and either finish the login or hand back an
    /// MFA-pending token, depending on whether the account has MFA enabled.
    pub async fn login(&self, username: &str, pass: &str) -> AuthResult<LoginOutcome> {
        let user = self.authenticator.authenticate(username, pass).await?;

        if user.mfa.enabled {
            let temp_token = self.codec.issue_mfa_pending_token(user.id)?;
            tracing::info!(user_id = %user.id, "password verified, second factor required");
            return Ok(LoginOutcome::MfaRequired(MfaChallenge {
                requires_mfa: true,
                temp_token,
            }));
        }

        tracing::info!(user_id = %user.id, "login successful");
        Ok(LoginOutcome::Success(self.session(user.id)?))
    }

    /// Generate a fresh secret and backup codes for the user and persist
    /// them. Re-running setup overwrites any pending secret and codes;
    /// `enabled` is left as it was, only [`confirm_mfa_setup`] flips it.
    ///
    /// Note that an account with MFA already enabled may re-run setup
    /// without disabling first; embedders wanting stricter behavior should
    /// gate the call on a fresh authentication.
    ///
    /// [`confirm_mfa_setup`]: MfaOrchestrator::confirm_mfa_setup
    pub async fn setup_mfa(&self, user_id: Uuid) -> AuthResult<MfaSetup> {
        let user = bounded(self.timeout, "find_by_id", self.store.find_by_id(user_id))
            .await?
            .ok_or_else(|| AuthError::InvalidRequest("unknown user".to_string()))?;

        let secret = totp::generate_secret();
        let backup_codes = totp::generate_backup_codes();
        let provisioning_uri = self.totp.provisioning_uri(&secret, &user.email)?;
        let png = self.qr.render(&provisioning_uri)?;

        let state = MfaState {
            secret: Some(secret.clone()),
            enabled: user.mfa.enabled,
            backup_codes: backup_codes.iter().cloned().collect(),
        };
        bounded(
            self.timeout,
            "set_mfa_state",
            self.store.set_mfa_state(user_id, state),
        )
        .await?;

        tracing::info!(user_id = %user_id, "MFA setup material issued");
        Ok(MfaSetup {
            secret,
            provisioning_uri,
            qr_code: format!("data:image/png;base64,{}", BASE64.encode(png)),
            backup_codes,
        })
    }

    /// Prove possession of the most recently stored secret and enable MFA
    /// for the account. The secret is re-read on every call, so a code for
    /// an overwritten setup cannot confirm.
    pub async fn confirm_mfa_setup(&self, user_id: Uuid, code: &str) -> AuthResult<()> {
        let mut state = bounded(
            self.timeout,
            "get_mfa_state",
            self.store.get_mfa_state(user_id),
        )
        .await?
        .ok_or_else(|| AuthError::InvalidRequest("unknown user".to_string()))?;

        let Some(secret) = state.secret.clone() else {
            return Err(AuthError::InvalidRequest(
                "MFA setup has not started".to_string(),
            ));
        };

        if !self.totp.verify(&secret, code)? {
            tracing::warn!(user_id = %user_id, "MFA confirmation code rejected");
            return Err(AuthError::InvalidCode);
        }

        state.enabled = true;
        bounded(
            self.timeout,
            "set_mfa_state",
            self.store.set_mfa_state(user_id, state),
        )
        .await?;

        tracing::info!(user_id = %user_id, "MFA enabled");
        Ok(())
    }

    /// Exchange an MFA-pending token plus exactly one of a TOTP code or a
    /// backup code for session tokens.
    ///
    /// The user id comes from the token claims alone. Backup codes are
    /// consumed atomically in the store, so of two concurrent submissions
    /// of the same code at most one can succeed; the loser sees
    /// `InvalidCode`. No state is mutated on the failure paths.
    pub async fn complete_mfa_login(
        &self,
        temp_token: &str,
        code: Option<&str>,
        backup_code: Option<&str>,
    ) -> AuthResult<SessionTokens> {
        match (code, backup_code) {
            (Some(_), Some(_)) => {
                return Err(AuthError::InvalidRequest(
                    "provide either a code or a backup code, not both".to_string(),
                ))
            }
            (None, None) => {
                return Err(AuthError::InvalidRequest(
                    "a code or a backup code is required".to_string(),
                ))
            }
            _ => {}
        }

        let claims = self.codec.validate_mfa_pending_token(temp_token)?;
        let user_id = claims.sub;

        let state = bounded(
            self.timeout,
            "get_mfa_state",
            self.store.get_mfa_state(user_id),
        )
        .await?
        .ok_or(AuthError::InvalidSession)?;

        // A pending token for an account that no longer requires MFA is a
        // stale session, not a code problem.
        if !state.enabled {
            return Err(AuthError::InvalidSession);
        }

        if let Some(code) = code {
            let secret = state.secret.as_deref().ok_or(AuthError::InvalidSession)?;
            if !self.totp.verify(secret, code)? {
                tracing::warn!(user_id = %user_id, "second-factor code rejected");
                return Err(AuthError::InvalidCode);
            }
        } else if let Some(backup_code) = backup_code {
            let consumed = bounded(
                self.timeout,
                "consume_backup_code",
                self.store.consume_backup_code(user_id, backup_code),
            )
            .await?;
            if !consumed {
                tracing::warn!(user_id = %user_id, "backup code rejected");
                return Err(AuthError::InvalidCode);
            }
            tracing::info!(user_id = %user_id, "backup code consumed");
        }

        tracing::info!(user_id = %user_id, "second factor verified, session issued");
        self.session(user_id)
    }

    /// Exchange a refresh token for a fresh access + refresh pair.
    /// MFA-pending and access tokens are refused.
    pub async fn refresh_session(&self, refresh_token: &str) -> AuthResult<SessionTokens> {
        let claims = self.codec.validate_refresh_token(refresh_token)?;

        let user = bounded(
            self.timeout,
            "find_by_id",
            self.store.find_by_id(claims.sub),
        )
        .await?
        .ok_or(AuthError::InvalidSession)?;

        tracing::info!(user_id = %user.id, "session refreshed");
        self.session(user.id)
    }

    fn session(&self, user_id: Uuid) -> AuthResult<SessionTokens> {
        let (access_token, refresh_token) = self.codec.issue_session_pair(user_id)?;
        Ok(SessionTokens {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.codec.access_ttl_seconds(),
        })
    }
}
