//! User credential storage
//!
//! The authentication flows talk to storage through the [`UserStore`] trait so
//! the same orchestration runs against Postgres in production and the
//! in-memory store in tests. Implementations must keep
//! [`UserStore::consume_backup_code`] atomic: two concurrent calls with the
//! same code must never both succeed.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use crate::password::{self, PasswordError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint was violated; the detail names the field.
    #[error("Conflict: {0}")]
    Conflict(String),
    /// The backing store could not be reached or failed mid-operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Per-user MFA material. Lives inside the credential record so loading a
/// user is one lookup.
#[derive(Debug, Clone, Default)]
pub struct MfaState {
    /// Base32 TOTP secret. Present once setup has started, even before the
    /// user confirms.
    pub secret: Option<String>,
    /// Set only after the user has proven possession of the secret.
    pub enabled: bool,
    /// Single-use recovery codes, removed as they are spent.
    pub backup_codes: HashSet<String>,
}

#[derive(Debug, Clone)]
pub struct UserCredential {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub mfa: MfaState,
}

impl UserCredential {
    /// Build a new record, hashing the password. The caller is responsible
    /// for normalizing username/email first.
    pub fn new(
        username: &str,
        email: &str,
        full_name: &str,
        password: &str,
    ) -> Result<Self, PasswordError> {
        Ok(Self {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            full_name: full_name.to_string(),
            password_hash: password::hash_password(password)?,
            mfa: MfaState::default(),
        })
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserCredential>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserCredential>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserCredential>, StoreError>;

    /// Insert a new user. Fails with [`StoreError::Conflict`] when the
    /// username or email is already taken.
    async fn insert_user(&self, user: &UserCredential) -> Result<(), StoreError>;

    /// Replace the stored password hash. No-op when the user does not exist.
    async fn update_password_hash(&self, id: Uuid, password_hash: &str)
        -> Result<(), StoreError>;

    /// `None` when the user does not exist.
    async fn get_mfa_state(&self, id: Uuid) -> Result<Option<MfaState>, StoreError>;

    /// Replace the user's MFA state wholesale. No-op when the user does not
    /// exist.
    async fn set_mfa_state(&self, id: Uuid, state: MfaState) -> Result<(), StoreError>;

    /// Atomically remove one backup code. Returns `true` only when the code
    /// was present and this call removed it; a second call with the same code
    /// returns `false`.
    async fn consume_backup_code(&self, id: Uuid, code: &str) -> Result<bool, StoreError>;
}

/// In-memory [`UserStore`] backed by a mutex-guarded map. Used by the test
/// suites and useful for local experimentation; production deployments use
/// the Postgres store.
#[derive(Clone, Default)]
pub struct MemoryUserStore {
    users: Arc<Mutex<HashMap<Uuid, UserCredential>>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, UserCredential>> {
        self.users.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserCredential>, StoreError> {
        Ok(self
            .lock()
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserCredential>, StoreError> {
        Ok(self.lock().values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserCredential>, StoreError> {
        Ok(self.lock().get(&id).cloned())
    }

    async fn insert_user(&self, user: &UserCredential) -> Result<(), StoreError> {
        let mut users = self.lock();
        if users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict("duplicate username".to_string()));
        }
        if users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("duplicate email".to_string()));
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        if let Some(user) = self.lock().get_mut(&id) {
            user.password_hash = password_hash.to_string();
        }
        Ok(())
    }

    async fn get_mfa_state(&self, id: Uuid) -> Result<Option<MfaState>, StoreError> {
        Ok(self.lock().get(&id).map(|u| u.mfa.clone()))
    }

    async fn set_mfa_state(&self, id: Uuid, state: MfaState) -> Result<(), StoreError> {
        if let Some(user) = self.lock().get_mut(&id) {
            user.mfa = state;
        }
        Ok(())
    }

    async fn consume_backup_code(&self, id: Uuid, code: &str) -> Result<bool, StoreError> {
        // HashSet::remove under the lock is the atomicity guarantee here: it
        // reports whether the code was present, and only one caller can see
        // true for a given code.
        Ok(self
            .lock()
            .get_mut(&id)
            .map(|u| u.mfa.backup_codes.remove(code))
            .unwrap_or(false))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;

    async fn seeded_store() -> (MemoryUserStore, UserCredential) {
        let store = MemoryUserStore::new();
        let user = UserCredential::new("worker", "worker@example.com", "Wren Worker", "hunter2!")
            .unwrap();
        store.insert_user(&user).await.unwrap();
        (store, user)
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let (store, user) = seeded_store().await;

        let by_username = store.find_by_username("worker").await.unwrap().unwrap();
        assert_eq!(by_username.id, user.id);

        let by_email = store
            .find_by_email("worker@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, user.id);

        let by_id = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(by_id.username, "worker");

        assert!(store.find_by_username("nobody").await.unwrap().is_none());
        assert!(store.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_conflicts() {
        let (store, _) = seeded_store().await;
        let dup =
            UserCredential::new("worker", "other@example.com", "Other", "hunter2!").unwrap();

        let err = store.insert_user(&dup).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(ref d) if d.contains("username")));
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let (store, _) = seeded_store().await;
        let dup =
            UserCredential::new("worker2", "worker@example.com", "Other", "hunter2!").unwrap();

        let err = store.insert_user(&dup).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(ref d) if d.contains("email")));
    }

    #[tokio::test]
    async fn test_update_password_hash() {
        let (store, user) = seeded_store().await;

        store
            .update_password_hash(user.id, "$argon2id$new")
            .await
            .unwrap();
        let reloaded = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.password_hash, "$argon2id$new");
    }

    #[tokio::test]
    async fn test_mfa_state_roundtrip() {
        let (store, user) = seeded_store().await;

        let state = MfaState {
            secret: Some("JBSWY3DPEHPK3PXP".to_string()),
            enabled: false,
            backup_codes: HashSet::from(["A1B2C3D4".to_string()]),
        };
        store.set_mfa_state(user.id, state).await.unwrap();

        let loaded = store.get_mfa_state(user.id).await.unwrap().unwrap();
        assert_eq!(loaded.secret.as_deref(), Some("JBSWY3DPEHPK3PXP"));
        assert!(!loaded.enabled);
        assert!(loaded.backup_codes.contains("A1B2C3D4"));

        assert!(store
            .get_mfa_state(Uuid::new_v4())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_backup_code_consumed_once() {
        let (store, user) = seeded_store().await;

        let state = MfaState {
            backup_codes: HashSet::from(["A1B2C3D4".to_string(), "E5F6G7H8".to_string()]),
            ..MfaState::default()
        };
        store.set_mfa_state(user.id, state).await.unwrap();

        assert!(store.consume_backup_code(user.id, "A1B2C3D4").await.unwrap());
        assert!(!store.consume_backup_code(user.id, "A1B2C3D4").await.unwrap());

        // Case matters; stored codes are matched exactly.
        assert!(!store.consume_backup_code(user.id, "e5f6g7h8").await.unwrap());
        assert!(store.consume_backup_code(user.id, "E5F6G7H8").await.unwrap());

        let remaining = store.get_mfa_state(user.id).await.unwrap().unwrap();
        assert!(remaining.backup_codes.is_empty());
    }

    #[tokio::test]
    async fn test_consume_for_unknown_user_is_false() {
        let store = MemoryUserStore::new();
        assert!(!store
            .consume_backup_code(Uuid::new_v4(), "A1B2C3D4")
            .await
            .unwrap());
    }
}
