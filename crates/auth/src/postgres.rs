//! Postgres-backed [`UserStore`]
//!
//! One row per user; MFA material lives on the same row so every lookup is
//! a single query. Backup-code consumption is a single conditional UPDATE
//! (`array_remove` guarded by an `ANY` check), so of two racing submissions
//! of the same code exactly one sees a row change.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::store::{MfaState, StoreError, UserCredential, UserStore};

pub struct PostgresUserStore {
    pool: PgPool,
}

impl PostgresUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the crate's schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!()
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    async fn fetch_one(
        &self,
        clause: &str,
        bind: &str,
    ) -> Result<Option<UserCredential>, StoreError> {
        let query = format!(
            "SELECT id, username, email, full_name, password_hash, \
             mfa_secret, mfa_enabled, backup_codes \
             FROM users WHERE {} = $1",
            clause
        );
        let row: Option<UserRow> = sqlx::query_as(&query)
            .bind(bind)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(row.map(UserCredential::from))
    }
}

fn map_sqlx(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(db.constraint().unwrap_or("unique constraint").to_string())
        }
        _ => StoreError::Unavailable(e.to_string()),
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    full_name: String,
    password_hash: String,
    mfa_secret: Option<String>,
    mfa_enabled: bool,
    backup_codes: Vec<String>,
}

impl From<UserRow> for UserCredential {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            full_name: row.full_name,
            password_hash: row.password_hash,
            mfa: MfaState {
                secret: row.mfa_secret,
                enabled: row.mfa_enabled,
                backup_codes: row.backup_codes.into_iter().collect(),
            },
        }
    }
}

#[async_trait]
impl UserStore for PostgresUserStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserCredential>, StoreError> {
        self.fetch_one("username", username).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserCredential>, StoreError> {
        self.fetch_one("email", email).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserCredential>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, username, email, full_name, password_hash, \
             mfa_secret, mfa_enabled, backup_codes \
             FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(row.map(UserCredential::from))
    }

    async fn insert_user(&self, user: &UserCredential) -> Result<(), StoreError> {
        let backup_codes: Vec<String> = user.mfa.backup_codes.iter().cloned().collect();
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, full_name, password_hash,
                               mfa_secret, mfa_enabled, backup_codes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(&user.password_hash)
        .bind(&user.mfa.secret)
        .bind(user.mfa.enabled)
        .bind(&backup_codes)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn get_mfa_state(&self, id: Uuid) -> Result<Option<MfaState>, StoreError> {
        let row: Option<(Option<String>, bool, Vec<String>)> = sqlx::query_as(
            "SELECT mfa_secret, mfa_enabled, backup_codes FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(row.map(|(secret, enabled, backup_codes)| MfaState {
            secret,
            enabled,
            backup_codes: backup_codes.into_iter().collect(),
        }))
    }

    async fn set_mfa_state(&self, id: Uuid, state: MfaState) -> Result<(), StoreError> {
        let backup_codes: Vec<String> = state.backup_codes.iter().cloned().collect();
        sqlx::query(
            "UPDATE users SET mfa_secret = $2, mfa_enabled = $3, backup_codes = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(&state.secret)
        .bind(state.enabled)
        .bind(&backup_codes)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn consume_backup_code(&self, id: Uuid, code: &str) -> Result<bool, StoreError> {
        // Single statement so the presence check and the removal cannot be
        // split by a concurrent consumer.
        let result = sqlx::query(
            r#"
            UPDATE users
            SET backup_codes = array_remove(backup_codes, $2)
            WHERE id = $1 AND $2 = ANY(backup_codes)
            "#,
        )
        .bind(id)
        .bind(code)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;

    #[test]
    fn test_row_conversion() {
        let id = Uuid::new_v4();
        let row = UserRow {
            id,
            username: "worker".to_string(),
            email: "worker@example.com".to_string(),
            full_name: "Wren Worker".to_string(),
            password_hash: "$argon2id$hash".to_string(),
            mfa_secret: Some("JBSWY3DPEHPK3PXP".to_string()),
            mfa_enabled: true,
            backup_codes: vec!["A1B2C3D4".to_string(), "E5F6G7H8".to_string()],
        };

        let user = UserCredential::from(row);
        assert_eq!(user.id, id);
        assert!(user.mfa.enabled);
        assert_eq!(user.mfa.secret.as_deref(), Some("JBSWY3DPEHPK3PXP"));
        assert_eq!(user.mfa.backup_codes.len(), 2);
    }
}
