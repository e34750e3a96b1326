//! Account lifecycle and the two-step login: password check, then a mailed one-time code.
//!
//! `initiate_login` never issues a session. It hands out a code-challenge token (the code,
//! one minute) and a temp-session token (proof the password was checked, fifteen minutes);
//! only `verify_code` with both tokens and the mailed code yields a session.

use crate::config::{FrontendConfig, JwtConfig};
use crate::database::user::{UserRepository, dummy_verify_blocking, hash_password_blocking, verify_password_blocking};
use crate::error::app_error::AppError;
use crate::models::two_factor::VerifyCodeRequest;
use crate::models::user::{LoginRequest, RegisterRequest, User, normalize_email};
use crate::service::challenge::ChallengeLedger;
use crate::service::codes::{generate_reset_token, generate_six_digit_code, hash_reset_token};
use crate::service::email::{Mailer, dispatch, email_verification_email, password_reset_email, verification_code_email};
use crate::service::token::{TokenError, TokenPurpose, TokenService};
use chrono::{Duration, Utc};

const SESSION_EXPIRED_MESSAGE: &str = "Die Sitzung ist abgelaufen. Bitte melden Sie sich erneut an.";
const INVALID_TOKEN_MESSAGE: &str = "Ungültiges Token";
const CODE_ALREADY_USED_MESSAGE: &str = "Der Bestätigungscode wurde bereits verwendet.";

#[derive(Debug)]
pub struct Registration {
    pub user: User,
    pub email_sent: bool,
}

/// Password verified, second factor pending.
#[derive(Debug)]
pub struct LoginChallenge {
    pub code_challenge_token: String,
    pub temp_session_token: String,
    pub user: User,
    pub code_sent: bool,
}

#[derive(Debug)]
pub struct ResentCode {
    pub code_challenge_token: String,
    pub code_sent: bool,
}

#[derive(Debug)]
pub struct AuthenticatedSession {
    pub token: String,
    pub user: User,
}

pub struct AuthService<'a> {
    pub users: &'a dyn UserRepository,
    pub tokens: &'a TokenService,
    pub mailer: &'a dyn Mailer,
    pub ledger: &'a ChallengeLedger,
    pub frontend: &'a FrontendConfig,
    pub jwt: &'a JwtConfig,
}

impl AuthService<'_> {
    pub async fn register(&self, request: &RegisterRequest) -> Result<Registration, AppError> {
        let email = normalize_email(&request.email);

        if self.users.get_user_by_email(&email).await?.is_some() {
            return Err(AppError::UserAlreadyExists(email));
        }

        let (salt, hash) = hash_password_blocking(request.password.clone()).await?;
        let user = self.users.create_user_with_profile(&email, &salt, &hash).await?;

        let token = self.tokens.issue_email_verification(&user.id)?;
        let link = self.frontend.email_verification_url(&token);
        let email_sent = dispatch(self.mailer, email_verification_email(&user.email, &link)).await;

        tracing::info!(user_id = %user.id, email_sent, "user registered");
        Ok(Registration { user, email_sent })
    }

    pub async fn verify_email(&self, token: &str) -> Result<(), AppError> {
        let claims = self
            .tokens
            .verify(token, TokenPurpose::EmailVerify)
            .map_err(|e| AppError::BadRequest(match e {
                TokenError::Expired => "Der Bestätigungslink ist abgelaufen.".to_string(),
                TokenError::Invalid => INVALID_TOKEN_MESSAGE.to_string(),
            }))?;
        let user_id = claims.subject_id().map_err(|_| AppError::BadRequest(INVALID_TOKEN_MESSAGE.to_string()))?;

        let user = self.users.get_user_by_id(&user_id).await?.ok_or(AppError::UserNotFound)?;
        if user.is_verified {
            return Err(AppError::AlreadyVerified);
        }

        // a concurrent redemption may have won between the read and the update
        if !self.users.mark_verified(&user.id).await? {
            return Err(AppError::AlreadyVerified);
        }

        tracing::info!(user_id = %user.id, "email verified");
        Ok(())
    }

    /// Checks, in order: account exists, account verified, password matches. Unknown
    /// accounts and wrong passwords fail identically.
    pub async fn initiate_login(&self, request: &LoginRequest) -> Result<LoginChallenge, AppError> {
        let email = normalize_email(&request.email);

        let Some(user) = self.users.get_user_by_email(&email).await? else {
            dummy_verify_blocking(request.password.clone()).await?;
            return Err(AppError::InvalidCredentials);
        };

        if !user.is_verified {
            return Err(AppError::VerificationRequired);
        }

        if !verify_password_blocking(user.password_hash.clone(), request.password.clone()).await? {
            tracing::warn!(user_id = %user.id, "login rejected: wrong password");
            return Err(AppError::InvalidCredentials);
        }

        let code = generate_six_digit_code();
        let code_challenge_token = self.tokens.issue_code_challenge(&user.id, &code)?;
        let temp_session_token = self.tokens.issue_temp_session(&user.id)?;
        let code_sent = dispatch(self.mailer, verification_code_email(&user.email, &code, self.jwt.code_challenge_ttl)).await;

        tracing::info!(user_id = %user.id, code_sent, "login challenge issued");
        Ok(LoginChallenge {
            code_challenge_token,
            temp_session_token,
            user,
            code_sent,
        })
    }

    pub async fn verify_code(&self, request: &VerifyCodeRequest) -> Result<AuthenticatedSession, AppError> {
        let challenge = self
            .tokens
            .verify(&request.code_challenge_token, TokenPurpose::TwoFactor)
            .map_err(|e| match e {
                TokenError::Expired => AppError::CodeExpired,
                TokenError::Invalid => AppError::SessionExpired(INVALID_TOKEN_MESSAGE.to_string()),
            })?;
        let temp_session = self
            .tokens
            .verify(&request.temp_session_token, TokenPurpose::TempAuth)
            .map_err(session_error)?;

        if challenge.code.as_deref() != Some(request.code.normalized().as_str()) {
            return Err(AppError::CodeInvalid);
        }

        let user_id = challenge.subject_id().map_err(session_error)?;
        if temp_session.subject_id().map_err(session_error)? != user_id {
            tracing::warn!(user_id = %user_id, "login rejected: challenge and temp session belong to different users");
            return Err(AppError::TokenMismatch);
        }

        let user = self.users.get_user_by_id(&user_id).await?.ok_or(AppError::UserNotFound)?;

        if !self.ledger.consume(&challenge.jti, challenge.exp).await {
            return Err(AppError::SessionExpired(CODE_ALREADY_USED_MESSAGE.to_string()));
        }
        let token = match self.tokens.issue_session(&user.id, &user.email, user.role) {
            Ok(token) => token,
            Err(e) => {
                self.ledger.release(&challenge.jti).await;
                return Err(e);
            }
        };

        tracing::info!(user_id = %user.id, "login completed");
        Ok(AuthenticatedSession { token, user })
    }

    /// Trusts the temp session as proof of the earlier password check.
    pub async fn resend_code(&self, temp_session_token: &str) -> Result<ResentCode, AppError> {
        let claims = self.tokens.verify(temp_session_token, TokenPurpose::TempAuth).map_err(session_error)?;
        let user_id = claims.subject_id().map_err(session_error)?;

        let user = self.users.get_user_by_id(&user_id).await?.ok_or(AppError::UserNotFound)?;

        let code = generate_six_digit_code();
        let code_challenge_token = self.tokens.issue_code_challenge(&user.id, &code)?;
        let code_sent = dispatch(self.mailer, verification_code_email(&user.email, &code, self.jwt.code_challenge_ttl)).await;

        tracing::info!(user_id = %user.id, code_sent, "login code resent");
        Ok(ResentCode {
            code_challenge_token,
            code_sent,
        })
    }

    /// Returns whether the reset mail went out.
    pub async fn forgot_password(&self, email: &str) -> Result<bool, AppError> {
        let email = normalize_email(email);
        let user = self.users.get_user_by_email(&email).await?.ok_or(AppError::UserNotFound)?;

        let (token, token_hash) = generate_reset_token();
        let expires_at = Utc::now() + Duration::seconds(self.frontend.password_reset_ttl_seconds);
        self.users.set_reset_token(&user.id, &token_hash, expires_at).await?;

        let link = self.frontend.password_reset_url(&token);
        let email_sent = dispatch(self.mailer, password_reset_email(&user.email, &link)).await;

        tracing::info!(user_id = %user.id, email_sent, "password reset requested");
        Ok(email_sent)
    }

    pub async fn reset_password(&self, token: &str, password: &str) -> Result<(), AppError> {
        let target = self
            .users
            .get_user_by_reset_token(&hash_reset_token(token))
            .await?
            .ok_or_else(|| AppError::BadRequest(INVALID_TOKEN_MESSAGE.to_string()))?;

        if target.is_expired() {
            return Err(AppError::BadRequest("Das Token ist abgelaufen.".to_string()));
        }

        let (salt, hash) = hash_password_blocking(password.to_string()).await?;
        self.users.reset_password(&target.id, &salt, &hash).await?;

        tracing::info!(user_id = %target.id, "password reset");
        Ok(())
    }
}

fn session_error(error: TokenError) -> AppError {
    match error {
        TokenError::Expired => AppError::SessionExpired(SESSION_EXPIRED_MESSAGE.to_string()),
        TokenError::Invalid => AppError::SessionExpired(INVALID_TOKEN_MESSAGE.to_string()),
    }
}
