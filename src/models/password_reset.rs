use chrono::{DateTime, Utc};
use uuid::Uuid;

/// User row matched by a reset token hash.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PasswordResetTarget {
    pub id: Uuid,
    pub reset_token_expires_at: Option<DateTime<Utc>>,
}

impl PasswordResetTarget {
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.reset_token_expires_at {
            Some(expires_at) => expires_at <= now,
            None => true,
        }
    }
}
