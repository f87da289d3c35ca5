//! TOTP (Time-based One-Time Password) verification
//!
//! Generates secrets, provisioning URIs, and backup codes, and verifies
//! 6-digit codes compatible with Google Authenticator, Authy, and other
//! TOTP apps.

use subtle::ConstantTimeEq;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::config::AuthConfig;

/// TOTP code length (standard is 6 digits)
pub const TOTP_DIGITS: usize = 6;

/// Number of backup codes generated per setup
pub const BACKUP_CODE_COUNT: usize = 10;

/// Backup code length in characters
pub const BACKUP_CODE_LENGTH: usize = 8;

/// Character set for backup codes (excludes ambiguous chars: i, l, o, 0, 1)
const BACKUP_CODE_CHARSET: &[u8] = b"abcdefghjkmnpqrstuvwxyz23456789";

#[derive(Debug, thiserror::Error)]
pub enum TotpError {
    #[error("Invalid TOTP secret")]
    InvalidSecret,
    #[error("Code must be 6 digits")]
    InvalidFormat,
    #[error("Failed to create TOTP instance")]
    Creation,
    #[error("System clock error")]
    Clock,
}

/// Generate a new TOTP secret (160-bit, base32 encoded)
pub fn generate_secret() -> String {
    Secret::generate_secret().to_encoded().to_string()
}

/// Generate a batch of single-use backup codes.
///
/// Codes are checked for collisions within the batch so every code in a
/// response is distinct. Matching is case-sensitive and exact; codes are
/// stored and presented as-is.
pub fn generate_backup_codes() -> Vec<String> {
    use rand::{rngs::OsRng, Rng};

    let mut codes: Vec<String> = Vec::with_capacity(BACKUP_CODE_COUNT);
    while codes.len() < BACKUP_CODE_COUNT {
        // gen_range samples uniformly; indexing bytes modulo the charset
        // size would over-represent part of the alphabet.
        let code: String = (0..BACKUP_CODE_LENGTH)
            .map(|_| {
                let idx = OsRng.gen_range(0..BACKUP_CODE_CHARSET.len());
                BACKUP_CODE_CHARSET[idx] as char
            })
            .collect();
        if !codes.contains(&code) {
            codes.push(code);
        }
    }
    codes
}

/// Validates time-based one-time codes against a shared secret.
pub struct TotpVerifier {
    step: u64,
    skew_steps: u8,
    issuer: String,
}

impl TotpVerifier {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            step: config.totp_step_seconds,
            skew_steps: config.totp_skew_steps,
            issuer: config.totp_issuer.clone(),
        }
    }

    /// otpauth:// URI for QR enrollment, labeled with the configured issuer.
    pub fn provisioning_uri(&self, secret: &str, account_label: &str) -> Result<String, TotpError> {
        Ok(self.instance(secret, account_label)?.get_url())
    }

    /// Verify a submitted code against the system clock.
    pub fn verify(&self, secret: &str, code: &str) -> Result<bool, TotpError> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|_| TotpError::Clock)?
            .as_secs();
        self.verify_at(secret, code, now)
    }

    /// Verify a submitted code at an explicit Unix timestamp.
    ///
    /// Malformed input (wrong length, non-numeric) is `InvalidFormat`, a
    /// distinct condition from a well-formed wrong code (`Ok(false)`).
    /// The current time step is tried before its neighbors, then each step
    /// of configured skew on either side. Comparisons are constant-time per
    /// candidate so a near-miss costs the same as a full miss.
    pub fn verify_at(&self, secret: &str, code: &str, now: u64) -> Result<bool, TotpError> {
        if code.len() != TOTP_DIGITS || !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(TotpError::InvalidFormat);
        }

        let totp = self.instance(secret, "verify")?;
        let code_bytes = code.as_bytes();

        let mut offsets: Vec<i64> = vec![0];
        for step in 1..=i64::from(self.skew_steps) {
            offsets.push(-step);
            offsets.push(step);
        }

        for offset in offsets {
            let window = now as i64 + offset * self.step as i64;
            if window < 0 {
                continue;
            }
            let expected = totp.generate(window as u64);
            if bool::from(code_bytes.ct_eq(expected.as_bytes())) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Generate the code for a secret at an explicit Unix timestamp.
    /// Used by enrollment tooling and tests.
    pub fn code_at(&self, secret: &str, time: u64) -> Result<String, TotpError> {
        Ok(self.instance(secret, "verify")?.generate(time))
    }

    fn instance(&self, secret: &str, account_label: &str) -> Result<TOTP, TotpError> {
        let secret_bytes = Secret::Encoded(secret.to_string())
            .to_bytes()
            .map_err(|_| TotpError::InvalidSecret)?;

        TOTP::new(
            Algorithm::SHA1, // SHA1 is standard for TOTP compatibility
            TOTP_DIGITS,
            1,
            self.step,
            secret_bytes,
            Some(self.issuer.clone()),
            account_label.to_string(),
        )
        .map_err(|_| TotpError::Creation)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000;

    fn verifier() -> TotpVerifier {
        TotpVerifier::new(&AuthConfig::new("test-signing-key-0123456789abcdef"))
    }

    #[test]
    fn test_generate_secret() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 32);
        assert!(secret
            .chars()
            .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c)));
        assert_ne!(secret, generate_secret());
    }

    #[test]
    fn test_accepts_current_and_adjacent_windows() {
        let verifier = verifier();
        let secret = generate_secret();

        for time in [NOW, NOW - 30, NOW + 30] {
            let code = verifier.code_at(&secret, time).unwrap();
            assert!(
                verifier.verify_at(&secret, &code, NOW).unwrap(),
                "code for offset {} should verify",
                time as i64 - NOW as i64
            );
        }
    }

    #[test]
    fn test_rejects_outside_skew_window() {
        let verifier = verifier();
        let secret = generate_secret();

        for time in [NOW - 60, NOW + 60] {
            let code = verifier.code_at(&secret, time).unwrap();
            assert!(!verifier.verify_at(&secret, &code, NOW).unwrap());
        }
    }

    #[test]
    fn test_zero_skew_only_accepts_current_window() {
        let mut config = AuthConfig::new("test-signing-key-0123456789abcdef");
        config.totp_skew_steps = 0;
        let verifier = TotpVerifier::new(&config);
        let secret = generate_secret();

        let current = verifier.code_at(&secret, NOW).unwrap();
        assert!(verifier.verify_at(&secret, &current, NOW).unwrap());

        let previous = verifier.code_at(&secret, NOW - 30).unwrap();
        assert!(!verifier.verify_at(&secret, &previous, NOW).unwrap());
    }

    #[test]
    fn test_rejects_code_from_different_secret() {
        let verifier = verifier();
        let secret = generate_secret();
        let other = generate_secret();

        let code = verifier.code_at(&other, NOW).unwrap();
        assert!(!verifier.verify_at(&secret, &code, NOW).unwrap());
    }

    #[test]
    fn test_malformed_codes_are_a_distinct_error() {
        let verifier = verifier();
        let secret = generate_secret();

        for bad in ["", "12345", "1234567", "12a456", "      "] {
            assert!(matches!(
                verifier.verify_at(&secret, bad, NOW),
                Err(TotpError::InvalidFormat)
            ));
        }
    }

    #[test]
    fn test_provisioning_uri() {
        let verifier = verifier();
        let secret = generate_secret();

        let uri = verifier.provisioning_uri(&secret, "worker@example.com").unwrap();
        assert!(uri.starts_with("otpauth://totp/"));
        assert!(uri.contains("Workforce"));
        assert!(uri.contains(&secret));
    }

    #[test]
    fn test_backup_codes() {
        let codes = generate_backup_codes();
        assert_eq!(codes.len(), BACKUP_CODE_COUNT);

        for code in &codes {
            assert_eq!(code.len(), BACKUP_CODE_LENGTH);
            assert!(code.bytes().all(|b| BACKUP_CODE_CHARSET.contains(&b)));
        }

        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn test_backup_codes_use_whole_charset() {
        // 200 batches * 10 codes * 8 chars = 16k draws over 31 symbols; a
        // missing symbol at that volume means the sampler is skewed.
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            for code in generate_backup_codes() {
                seen.extend(code.bytes());
            }
        }
        assert_eq!(seen.len(), BACKUP_CODE_CHARSET.len());
    }

    #[test]
    fn test_invalid_secret_rejected() {
        let verifier = verifier();
        assert!(matches!(
            verifier.verify_at("not base32!!", "123456", NOW),
            Err(TotpError::InvalidSecret)
        ));
    }
}
