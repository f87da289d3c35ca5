//! Password reset by email
//!
//! `request_reset` answers identically whether or not the email names an
//! account, so the endpoint cannot be used to enumerate users. When an
//! account exists, a stateless reset token (see [`crate::tokens`]) is mailed
//! out; a failed delivery is a failed request, never a silent success.

use std::sync::Arc;

use serde::Serialize;

use crate::config::AuthConfig;
use crate::email::{EmailConfig, EmailSender};
use crate::error::{AuthError, AuthResult};
use crate::orchestrator::bounded;
use crate::password::{self, MIN_PASSWORD_LENGTH};
use crate::store::UserStore;
use crate::tokens::ResetTokenGenerator;

/// The one response `request_reset` ever gives.
pub const GENERIC_RESET_MESSAGE: &str =
    "If an account exists with that email, a password reset link has been sent.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResetRequested {
    pub message: String,
}

pub struct PasswordResetFlow<S, M> {
    store: Arc<S>,
    mailer: Arc<M>,
    tokens: ResetTokenGenerator,
    branding: EmailConfig,
    token_ttl: time::Duration,
    timeout: std::time::Duration,
}

impl<S: UserStore, M: EmailSender> PasswordResetFlow<S, M> {
    pub fn new(config: &AuthConfig, branding: EmailConfig, store: Arc<S>, mailer: Arc<M>) -> Self {
        Self {
            store,
            mailer,
            tokens: ResetTokenGenerator::new(config),
            branding,
            token_ttl: config.reset_token_ttl,
            timeout: config.dependency_timeout,
        }
    }

    /// Start a reset. Unknown emails do no token work at all; known emails
    /// get a reset link. The success payload is byte-identical either way.
    pub async fn request_reset(&self, email: &str) -> AuthResult<ResetRequested> {
        let email = email.trim().to_lowercase();
        let user = bounded(self.timeout, "find_by_email", self.store.find_by_email(&email)).await?;

        if let Some(user) = user {
            let token = self.tokens.make_token(&user)?;
            let reset_link = format!(
                "{}/auth/reset-password?token={}",
                self.branding.public_url, token
            );
            bounded(
                self.timeout,
                "send_email",
                self.mailer.send(
                    &user.email,
                    &format!("Password Reset - {}", self.branding.app_name),
                    &self.reset_email_html(&reset_link),
                ),
            )
            .await?;
            tracing::info!(user_id = %user.id, "password reset email sent");
        }

        Ok(ResetRequested {
            message: GENERIC_RESET_MESSAGE.to_string(),
        })
    }

    /// Finish a reset. The token must resolve to a live user, carry a valid
    /// MAC over that user's current password hash, and be inside its window;
    /// any miss is `InvalidOrExpiredToken`. Overwriting the hash invalidates
    /// every outstanding reset token for the user.
    pub async fn confirm_reset(&self, token: &str, new_password: &str) -> AuthResult<()> {
        if new_password.len() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::InvalidRequest(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }

        let user_id = ResetTokenGenerator::subject(token)?;
        let user = bounded(self.timeout, "find_by_id", self.store.find_by_id(user_id))
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;

        self.tokens.verify(token, &user)?;

        let password_hash = password::hash_password(new_password)?;
        bounded(
            self.timeout,
            "update_password_hash",
            self.store.update_password_hash(user.id, &password_hash),
        )
        .await?;

        tracing::info!(user_id = %user.id, "password reset completed");
        Ok(())
    }

    fn reset_email_html(&self, reset_link: &str) -> String {
        let expiry = expiry_text(self.token_ttl);
        format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2 style="color: #6366f1;">Password Reset Requested</h2>
    <p>Hi there,</p>
    <p>We received a request to reset your password for your {app_name} account.</p>
    <p style="text-align: center; margin: 30px 0;">
        <a href="{reset_link}" style="display: inline-block; padding: 14px 28px; background-color: #6366f1; color: white; text-decoration: none; border-radius: 6px; font-weight: bold; font-size: 16px;">
            Reset Password
        </a>
    </p>
    <p style="color: #dc2626; font-size: 14px; font-weight: bold;">
        If you didn't request a password reset, please ignore this email and your password will remain unchanged.
    </p>
    <p style="color: #666; font-size: 14px;">
        For security, this reset link expires in <strong>{expiry}</strong>.
    </p>
    <hr style="border: none; border-top: 1px solid #eee; margin: 20px 0;">
    <p style="color: #999; font-size: 12px;">
        {app_name} &bull; <a href="mailto:{support_email}" style="color: #999;">{support_email}</a>
    </p>
</body>
</html>"#,
            app_name = self.branding.app_name,
            reset_link = reset_link,
            expiry = expiry,
            support_email = self.branding.support_email,
        )
    }
}

/// Human-readable token lifetime for the email body, matching the
/// configured `reset_token_ttl` rather than assuming the default.
fn expiry_text(ttl: time::Duration) -> String {
    let hours = ttl.whole_hours();
    match hours {
        0 => format!("{} minutes", ttl.whole_minutes().max(1)),
        1 => "1 hour".to_string(),
        _ => format!("{} hours", hours),
    }
}
