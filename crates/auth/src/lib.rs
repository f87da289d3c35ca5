//! Workforce Authentication Core
//!
//! Credential login, optional TOTP two-factor authentication with single-use
//! backup codes, and password reset by email, issuing JWT access and refresh
//! tokens. The crate is a library; storage, mail delivery, and QR rendering
//! sit behind traits so an HTTP layer can embed the flows against whatever
//! infrastructure it has.

pub mod config;
pub mod email;
pub mod error;
pub mod jwt;
pub mod orchestrator;
pub mod password;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod qr;
pub mod reset;
pub mod store;
pub mod tokens;
pub mod totp;

pub use config::AuthConfig;
pub use email::{EmailConfig, EmailSender, MemoryMailer, ResendMailer};
pub use error::{AuthError, AuthResult};
pub use jwt::{Claims, TokenCodec, TokenType};
pub use orchestrator::{
    CredentialAuthenticator, LoginOutcome, MfaChallenge, MfaOrchestrator, MfaSetup, SessionTokens,
};
#[cfg(feature = "postgres")]
pub use postgres::PostgresUserStore;
pub use qr::{PngQrRenderer, QrRenderer};
pub use reset::{PasswordResetFlow, ResetRequested};
pub use store::{MemoryUserStore, MfaState, UserCredential, UserStore};
pub use totp::TotpVerifier;
