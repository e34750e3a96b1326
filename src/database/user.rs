use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::password_reset::PasswordResetTarget;
use crate::models::user::User;
use argon2::Argon2;
use chrono::{DateTime, Utc};
use password_hash::rand_core::OsRng;
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use std::sync::LazyLock;
use uuid::Uuid;

/// A real Argon2 hash generated once, used as a timing decoy so that lookups for unknown
/// emails cost as much as a real password check.
static DUMMY_HASH: LazyLock<Option<String>> = LazyLock::new(|| {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(b"dummy-never-matches", &salt)
        .ok()
        .map(|hash| hash.to_string())
});

const USER_COLUMNS: &str = "id, email, password_hash, is_verified, role, created_at";

#[async_trait::async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    async fn get_user_by_id(&self, id: &Uuid) -> Result<Option<User>, AppError>;
    /// Creates the user and an empty profile atomically.
    async fn create_user_with_profile(&self, email: &str, salt: &str, password_hash: &str) -> Result<User, AppError>;
    /// Returns `false` when the user was already verified.
    async fn mark_verified(&self, id: &Uuid) -> Result<bool, AppError>;
    async fn set_reset_token(&self, id: &Uuid, token_hash: &str, expires_at: DateTime<Utc>) -> Result<(), AppError>;
    async fn get_user_by_reset_token(&self, token_hash: &str) -> Result<Option<PasswordResetTarget>, AppError>;
    /// Replaces the password and clears any pending reset token.
    async fn reset_password(&self, id: &Uuid, salt: &str, password_hash: &str) -> Result<(), AppError>;
}

#[async_trait::async_trait]
impl UserRepository for PostgresRepository {
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn get_user_by_id(&self, id: &Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn create_user_with_profile(&self, email: &str, salt: &str, password_hash: &str) -> Result<User, AppError> {
        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, salt, password_hash, is_verified, role)
            VALUES ($1, $2, $3, FALSE, 0)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(email)
        .bind(salt)
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => AppError::UserAlreadyExists(email.to_string()),
            _ => AppError::db("Failed to create user", e),
        })?;

        sqlx::query("INSERT INTO profiles (user_id, email, search_index) VALUES ($1, $2, $3)")
            .bind(user.id)
            .bind(email)
            .bind(email)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(user)
    }

    async fn mark_verified(&self, id: &Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE users SET is_verified = TRUE WHERE id = $1 AND is_verified = FALSE")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_reset_token(&self, id: &Uuid, token_hash: &str, expires_at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET reset_token_hash = $1, reset_token_expires_at = $2 WHERE id = $3")
            .bind(token_hash)
            .bind(expires_at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get_user_by_reset_token(&self, token_hash: &str) -> Result<Option<PasswordResetTarget>, AppError> {
        let target = sqlx::query_as::<_, PasswordResetTarget>("SELECT id, reset_token_expires_at FROM users WHERE reset_token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;

        Ok(target)
    }

    async fn reset_password(&self, id: &Uuid, salt: &str, password_hash: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE users
            SET salt = $1, password_hash = $2, reset_token_hash = NULL, reset_token_expires_at = NULL
            WHERE id = $3
            "#,
        )
        .bind(salt)
        .bind(password_hash)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Returns `(salt, phc_hash)`.
pub(crate) fn password_hash(password: &str) -> Result<(String, String), AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;

    Ok((salt.as_str().to_string(), hash.to_string()))
}

pub(crate) fn verify_password_hash(stored_hash: &str, password: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| AppError::password_hash("Failed to parse stored password hash", e))?;
    Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
}

/// Throwaway Argon2 verification to equalize response timing for unknown accounts.
pub(crate) fn dummy_verify(password: &str) {
    if let Some(hash) = DUMMY_HASH.as_deref()
        && let Ok(parsed) = PasswordHash::new(hash)
    {
        let _ = Argon2::default().verify_password(password.as_bytes(), &parsed);
    }
}

/// Argon2 is deliberately slow; keep it off the async workers.
pub(crate) async fn hash_password_blocking(password: String) -> Result<(String, String), AppError> {
    tokio::task::spawn_blocking(move || password_hash(&password)).await?
}

pub(crate) async fn verify_password_blocking(stored_hash: String, password: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || verify_password_hash(&stored_hash, &password)).await?
}

pub(crate) async fn dummy_verify_blocking(password: String) -> Result<(), AppError> {
    tokio::task::spawn_blocking(move || dummy_verify(&password)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_round_trip() {
        let (salt, hash) = password_hash("Kater-Felix-schläft-2024!").unwrap();
        assert!(!salt.is_empty());
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password_hash(&hash, "Kater-Felix-schläft-2024!").unwrap());
        assert!(!verify_password_hash(&hash, "wrong").unwrap());
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        let (salt_a, hash_a) = password_hash("123456").unwrap();
        let (salt_b, hash_b) = password_hash("123456").unwrap();
        assert_ne!(salt_a, salt_b);
        assert_ne!(hash_a, hash_b);
    }

    #[test]
    fn malformed_stored_hash_is_an_error() {
        assert!(matches!(verify_password_hash("plaintext", "x"), Err(AppError::PasswordHash { .. })));
    }

    #[tokio::test]
    async fn blocking_wrappers_agree() {
        let (_, hash) = hash_password_blocking("654321".to_string()).await.unwrap();
        assert!(verify_password_blocking(hash.clone(), "654321".to_string()).await.unwrap());
        assert!(!verify_password_blocking(hash, "123456".to_string()).await.unwrap());
        dummy_verify_blocking("anything".to_string()).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn create_user_creates_profile_and_verifies_once() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = sqlx::PgPool::connect(&url).await.unwrap();
        sqlx::migrate!().run(&pool).await.unwrap();
        let repo = PostgresRepository::new(&pool);

        let email = format!("{}@example.com", Uuid::new_v4());
        let (salt, hash) = password_hash("Kater-Felix-schläft-2024!").unwrap();
        let user = repo.create_user_with_profile(&email, &salt, &hash).await.unwrap();
        assert!(!user.is_verified);

        let profiles: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM profiles WHERE user_id = $1")
            .bind(user.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(profiles.0, 1);

        assert!(repo.mark_verified(&user.id).await.unwrap());
        assert!(!repo.mark_verified(&user.id).await.unwrap());

        let duplicate = repo.create_user_with_profile(&email, &salt, &hash).await;
        assert!(matches!(duplicate, Err(AppError::UserAlreadyExists(_))));
    }
}
