//! Signed, expiring tokens for every short- and long-lived credential the service hands out.
//!
//! All tokens are HS256 JWTs sharing one secret; the `purpose` claim keeps a token minted
//! for one flow from being accepted by another.

use crate::config::JwtConfig;
use crate::error::app_error::AppError;
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    /// Carries the one-time code of a login challenge.
    #[serde(rename = "2fa")]
    TwoFactor,
    /// Proves the password was already checked.
    TempAuth,
    Session,
    QrPage,
    EmailVerify,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub purpose: TokenPurpose,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<i16>,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn subject_id(&self) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&self.sub).map_err(|_| TokenError::Invalid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token")]
    Invalid,
}

pub struct TokenService {
    secret: String,
    config: JwtConfig,
}

impl TokenService {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            secret: config.secret.clone(),
            config: config.clone(),
        }
    }

    fn issue(&self, subject: &Uuid, purpose: TokenPurpose, ttl_seconds: i64, extra: impl FnOnce(&mut Claims)) -> Result<String, AppError> {
        let now = Utc::now().timestamp();
        let mut claims = Claims {
            sub: subject.to_string(),
            purpose,
            code: None,
            email: None,
            role: None,
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now + ttl_seconds,
        };
        extra(&mut claims);

        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(self.secret.as_bytes()))
            .map_err(|e| AppError::token("Failed to sign token", e))
    }

    pub fn issue_code_challenge(&self, user_id: &Uuid, code: &str) -> Result<String, AppError> {
        self.issue(user_id, TokenPurpose::TwoFactor, self.config.code_challenge_ttl, |claims| {
            claims.code = Some(code.to_string());
        })
    }

    pub fn issue_temp_session(&self, user_id: &Uuid) -> Result<String, AppError> {
        self.issue(user_id, TokenPurpose::TempAuth, self.config.temp_session_ttl, |_| {})
    }

    pub fn issue_session(&self, user_id: &Uuid, email: &str, role: i16) -> Result<String, AppError> {
        self.issue(user_id, TokenPurpose::Session, self.config.session_ttl, |claims| {
            claims.email = Some(email.to_string());
            claims.role = Some(role);
        })
    }

    pub fn issue_qr_page(&self, qr_id: &Uuid) -> Result<String, AppError> {
        self.issue(qr_id, TokenPurpose::QrPage, self.config.qr_page_ttl, |_| {})
    }

    pub fn issue_email_verification(&self, user_id: &Uuid) -> Result<String, AppError> {
        self.issue(user_id, TokenPurpose::EmailVerify, self.config.email_verification_ttl, |_| {})
    }

    pub fn session_ttl_seconds(&self) -> i64 {
        self.config.session_ttl
    }

    pub fn qr_page_ttl_seconds(&self) -> i64 {
        self.config.qr_page_ttl
    }

    /// Verifies signature, expiry (no leeway) and purpose.
    pub fn verify(&self, token: &str, purpose: TokenPurpose) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &DecodingKey::from_secret(self.secret.as_bytes()), &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid,
        })?;

        if data.claims.purpose != purpose {
            return Err(TokenError::Invalid);
        }

        Ok(data.claims)
    }
}
