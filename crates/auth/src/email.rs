//! Outbound email delivery
//!
//! The flows send mail through the [`EmailSender`] trait; [`ResendMailer`]
//! delivers via the Resend API and [`MemoryMailer`] captures messages for
//! tests. Unlike notification mail, a password-reset message that fails to
//! send is a failed operation, so `send` returns a result instead of logging
//! and moving on.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Email transport not configured")]
    NotConfigured,
    /// The provider accepted the connection but rejected the message.
    #[error("Email provider error: {0}")]
    Provider(String),
    /// The provider could not be reached at all.
    #[error("Email transport error: {0}")]
    Transport(String),
}

/// Email configuration
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Resend API key
    pub resend_api_key: String,
    /// From address for emails
    pub email_from: String,
    /// App name for branding
    pub app_name: String,
    /// Support email
    pub support_email: String,
    /// Public base URL used in links
    pub public_url: String,
}

impl EmailConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self {
            resend_api_key: std::env::var("RESEND_API_KEY").unwrap_or_default(),
            email_from: std::env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "Workforce <noreply@localhost>".to_string()),
            app_name: std::env::var("APP_NAME").unwrap_or_else(|_| "Workforce".to_string()),
            support_email: std::env::var("SUPPORT_EMAIL")
                .unwrap_or_else(|_| "support@localhost".to_string()),
            public_url: std::env::var("PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
        }
    }

    /// Check if email sending is enabled
    pub fn is_enabled(&self) -> bool {
        !self.resend_api_key.is_empty()
    }
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), EmailError>;
}

/// Upper bound on a single API call; a stuck provider becomes a transport
/// error instead of a hung request.
const HTTP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// [`EmailSender`] backed by the Resend HTTP API.
#[derive(Clone)]
pub struct ResendMailer {
    config: EmailConfig,
    client: reqwest::Client,
    api_base: String,
}

impl ResendMailer {
    pub fn new(config: EmailConfig) -> Self {
        Self::with_api_base(config, "https://api.resend.com")
    }

    /// Point the mailer at a different API base URL (mock servers in tests).
    pub fn with_api_base(config: EmailConfig, api_base: impl Into<String>) -> Self {
        Self {
            config,
            client: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_base: api_base.into(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Self {
        Self::new(EmailConfig::from_env())
    }
}

#[async_trait]
impl EmailSender for ResendMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), EmailError> {
        if !self.config.is_enabled() {
            tracing::warn!(subject = %subject, "Email not configured, refusing to send");
            return Err(EmailError::NotConfigured);
        }

        let body = serde_json::json!({
            "from": self.config.email_from,
            "to": [to],
            "subject": subject,
            "html": html
        });

        let response = self
            .client
            .post(format!("{}/emails", self.api_base))
            .header(
                "Authorization",
                format!("Bearer {}", self.config.resend_api_key),
            )
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| EmailError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, "Email provider rejected message");
            return Err(EmailError::Provider(format!("{}: {}", status, detail)));
        }

        tracing::info!(to = %to, subject = %subject, "Email sent");
        Ok(())
    }
}

/// A message captured by [`MemoryMailer`].
#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// In-memory [`EmailSender`] for tests; records every message and can be
/// told to fail delivery.
#[derive(Clone, Default)]
pub struct MemoryMailer {
    outbox: Arc<Mutex<Vec<SentEmail>>>,
    fail_with: Arc<Mutex<Option<String>>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `send` fail with the given transport error.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self
            .fail_with
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(message.into());
    }

    /// Everything sent so far, in order.
    pub fn sent(&self) -> Vec<SentEmail> {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl EmailSender for MemoryMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), EmailError> {
        if let Some(message) = self
            .fail_with
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(EmailError::Transport(message));
        }
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SentEmail {
                to: to.to_string(),
                subject: subject.to_string(),
                html: html.to_string(),
            });
        Ok(())
    }
}
