//! Authentication configuration
//!
//! Every knob the core uses is an explicit field here; nothing reads global
//! state at call time. `AuthConfig::new` gives production defaults for
//! everything except the signing key, `AuthConfig::from_env` loads and
//! validates the full surface from the environment.

use std::env;

use time::Duration;

/// Configuration passed to the token codec, TOTP verifier, and flows at
/// construction.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC key for bearer tokens and reset tokens. Never logged.
    pub signing_key: String,
    /// Lifetime of access tokens.
    pub access_token_ttl: Duration,
    /// Lifetime of refresh tokens.
    pub refresh_token_ttl: Duration,
    /// Lifetime of the MFA-pending token issued between password check and
    /// second-factor verification.
    pub mfa_pending_ttl: Duration,
    /// Validity window for password-reset tokens.
    pub reset_token_ttl: Duration,
    /// TOTP time-step length in seconds.
    pub totp_step_seconds: u64,
    /// Accepted clock skew, in whole time steps on either side of now.
    pub totp_skew_steps: u8,
    /// Issuer label shown in authenticator apps.
    pub totp_issuer: String,
    /// Upper bound on any single collaborator call (store, mailer); beyond
    /// this the operation fails with `DependencyUnavailable` instead of
    /// hanging.
    pub dependency_timeout: std::time::Duration,
}

impl AuthConfig {
    /// Build a config with production defaults around the given signing key.
    pub fn new(signing_key: impl Into<String>) -> Self {
        Self {
            signing_key: signing_key.into(),
            access_token_ttl: Duration::hours(24),
            refresh_token_ttl: Duration::days(30),
            mfa_pending_ttl: Duration::minutes(5),
            reset_token_ttl: Duration::hours(24),
            totp_step_seconds: 30,
            totp_skew_steps: 1,
            totp_issuer: "Workforce".to_string(),
            dependency_timeout: std::time::Duration::from_secs(10),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// `JWT_SECRET` is required and must be at least 32 characters; all
    /// other variables fall back to the defaults of [`AuthConfig::new`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let signing_key = env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
        if signing_key.len() < 32 {
            return Err(ConfigError::WeakSecret(
                "JWT_SECRET must be at least 32 characters",
            ));
        }

        let mut config = Self::new(signing_key);
        config.access_token_ttl = Duration::hours(env_parse("JWT_EXPIRY_HOURS", 24));
        config.refresh_token_ttl = Duration::days(env_parse("JWT_REFRESH_EXPIRY_DAYS", 30));
        config.mfa_pending_ttl = Duration::seconds(env_parse("MFA_PENDING_TTL_SECONDS", 300));
        config.reset_token_ttl = Duration::hours(env_parse("RESET_TOKEN_TTL_HOURS", 24));
        config.totp_step_seconds = env_parse("TOTP_STEP_SECONDS", 30);
        config.totp_skew_steps = env_parse("TOTP_SKEW_STEPS", 1);
        if let Ok(issuer) = env::var("TOTP_ISSUER") {
            config.totp_issuer = issuer;
        }
        config.dependency_timeout =
            std::time::Duration::from_secs(env_parse("DEPENDENCY_TIMEOUT_SECONDS", 10));

        Ok(config)
    }
}

/// Parse an environment variable, falling back to `default` when the
/// variable is absent or unparseable.
fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("{0}")]
    WeakSecret(&'static str),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch them.
    static CONFIG_TEST_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for var in [
            "JWT_SECRET",
            "JWT_EXPIRY_HOURS",
            "JWT_REFRESH_EXPIRY_DAYS",
            "MFA_PENDING_TTL_SECONDS",
            "RESET_TOKEN_TTL_HOURS",
            "TOTP_STEP_SECONDS",
            "TOTP_SKEW_STEPS",
            "TOTP_ISSUER",
            "DEPENDENCY_TIMEOUT_SECONDS",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_missing_secret_rejected() {
        let _lock = CONFIG_TEST_MUTEX.lock().unwrap();
        clear_env();

        assert!(matches!(
            AuthConfig::from_env(),
            Err(ConfigError::Missing("JWT_SECRET"))
        ));
    }

    #[test]
    fn test_short_secret_rejected() {
        let _lock = CONFIG_TEST_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("JWT_SECRET", "too-short");
        assert!(matches!(
            AuthConfig::from_env(),
            Err(ConfigError::WeakSecret(_))
        ));
        clear_env();
    }

    #[test]
    fn test_defaults() {
        let _lock = CONFIG_TEST_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("JWT_SECRET", "0123456789abcdef0123456789abcdef");
        let config = AuthConfig::from_env().unwrap();
        assert_eq!(config.access_token_ttl, Duration::hours(24));
        assert_eq!(config.refresh_token_ttl, Duration::days(30));
        assert_eq!(config.mfa_pending_ttl, Duration::minutes(5));
        assert_eq!(config.totp_step_seconds, 30);
        assert_eq!(config.totp_skew_steps, 1);
        assert_eq!(config.totp_issuer, "Workforce");
        clear_env();
    }

    #[test]
    fn test_overrides_and_lenient_parsing() {
        let _lock = CONFIG_TEST_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("JWT_SECRET", "0123456789abcdef0123456789abcdef");
        env::set_var("JWT_EXPIRY_HOURS", "1");
        env::set_var("MFA_PENDING_TTL_SECONDS", "60");
        env::set_var("TOTP_SKEW_STEPS", "not-a-number");
        env::set_var("TOTP_ISSUER", "Workforce Staging");

        let config = AuthConfig::from_env().unwrap();
        assert_eq!(config.access_token_ttl, Duration::hours(1));
        assert_eq!(config.mfa_pending_ttl, Duration::seconds(60));
        // Unparseable values fall back to the default instead of failing.
        assert_eq!(config.totp_skew_steps, 1);
        assert_eq!(config.totp_issuer, "Workforce Staging");
        clear_env();
    }
}
