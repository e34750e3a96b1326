use chrono::{DateTime, Utc};
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Role tier from which dashboard access is granted.
pub const ADMIN_ROLE: i16 = 1;

const MIN_PASSWORD_SCORE: u8 = 2;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub is_verified: bool,
    pub role: i16,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq, JsonSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub is_verified: bool,
    pub role: i16,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            is_verified: user.is_verified,
            role: user.role,
        }
    }
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    #[validate(custom(function = "validate_password_strength"))]
    pub password: String,
}

#[derive(Deserialize, Debug, JsonSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct ForgotPasswordRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 8))]
    #[validate(custom(function = "validate_password_strength"))]
    pub password: String,
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct RegisterResponse {
    pub success: bool,
    pub message: String,
    pub email_sent: bool,
}

/// Plain acknowledgement for endpoints without a payload.
#[derive(Serialize, Debug, JsonSchema)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// Emails are unique case-insensitively; store and compare the trimmed lowercase form.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    let estimate = zxcvbn::zxcvbn(password, &[]);
    if u8::from(estimate.score()) < MIN_PASSWORD_SCORE {
        let mut error = ValidationError::new("weak_password");
        error.message = Some("Das Passwort ist zu schwach.".into());
        return Err(error);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email("  Owner@Example.COM "), "owner@example.com");
    }

    #[test]
    fn weak_password_is_rejected() {
        assert!(validate_password_strength("password").is_err());
        assert!(validate_password_strength("Kater-Felix-schläft-2024!").is_ok());
    }

    #[test]
    fn register_request_validation() {
        let request = RegisterRequest {
            email: "not-an-email".to_string(),
            password: "Kater-Felix-schläft-2024!".to_string(),
        };
        assert!(request.validate().is_err());

        let request = RegisterRequest {
            email: "owner@example.com".to_string(),
            password: "short".to_string(),
        };
        assert!(request.validate().is_err());

        let request = RegisterRequest {
            email: "owner@example.com".to_string(),
            password: "Kater-Felix-schläft-2024!".to_string(),
        };
        assert!(request.validate().is_ok());
    }
}
