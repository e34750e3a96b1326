use crate::auth::http_only_cookie;
use crate::config::Config;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::error::json::JsonBody;
use crate::middleware::rate_limit::{AuthRateLimit, RateLimit};
use crate::models::two_factor::{LoginChallengeResponse, ResendCodeRequest, ResendCodeResponse, SessionResponse, VerifyCodeRequest};
use crate::models::user::{ForgotPasswordRequest, LoginRequest, MessageResponse, RegisterRequest, RegisterResponse, ResetPasswordRequest, UserResponse};
use crate::service::auth::AuthService;
use crate::service::challenge::ChallengeLedger;
use crate::service::email::Mailer;
use crate::service::token::TokenService;
use rocket::http::{Cookie, CookieJar, Status};
use rocket::serde::json::Json;
use rocket::{State, delete, get, patch, post};
use rocket_okapi::openapi;
use sqlx::PgPool;
use std::sync::Arc;
use validator::Validate;

/// Everything the account flows need, pulled from managed state.
struct AuthContext<'r> {
    repo: PostgresRepository,
    tokens: &'r TokenService,
    mailer: &'r dyn Mailer,
    ledger: &'r ChallengeLedger,
    config: &'r Config,
}

impl<'r> AuthContext<'r> {
    fn new(pool: &PgPool, tokens: &'r TokenService, mailer: &'r Arc<dyn Mailer>, ledger: &'r Arc<ChallengeLedger>, config: &'r Config) -> Self {
        Self {
            repo: PostgresRepository::new(pool),
            tokens,
            mailer: mailer.as_ref(),
            ledger: ledger.as_ref(),
            config,
        }
    }

    fn service(&self) -> AuthService<'_> {
        AuthService {
            users: &self.repo,
            tokens: self.tokens,
            mailer: self.mailer,
            ledger: self.ledger,
            frontend: &self.config.frontend,
            jwt: &self.config.jwt,
        }
    }
}

/// Create an account and mail the verification link.
#[openapi(tag = "Authentication")]
#[post("/register", data = "<payload>")]
pub async fn register(
    pool: &State<PgPool>,
    tokens: &State<TokenService>,
    mailer: &State<Arc<dyn Mailer>>,
    ledger: &State<Arc<ChallengeLedger>>,
    config: &State<Config>,
    _rate_limit: RateLimit,
    payload: JsonBody<RegisterRequest>,
) -> Result<(Status, Json<RegisterResponse>), AppError> {
    payload.validate()?;

    let context = AuthContext::new(pool, tokens, mailer, ledger, config);
    let registration = context.service().register(&payload).await?;

    let message = if registration.email_sent {
        "Registrierung erfolgreich. Bitte bestätigen Sie Ihre E-Mail-Adresse."
    } else {
        "Registrierung erfolgreich, aber die Bestätigungs-E-Mail konnte nicht gesendet werden."
    };

    Ok((
        Status::Created,
        Json(RegisterResponse {
            success: true,
            message: message.to_string(),
            email_sent: registration.email_sent,
        }),
    ))
}

/// Redeem the link from the verification mail.
#[openapi(tag = "Authentication")]
#[get("/verify-email?<token>")]
pub async fn verify_email(
    pool: &State<PgPool>,
    tokens: &State<TokenService>,
    mailer: &State<Arc<dyn Mailer>>,
    ledger: &State<Arc<ChallengeLedger>>,
    config: &State<Config>,
    token: Option<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let token = token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Token fehlt".to_string()))?;

    let context = AuthContext::new(pool, tokens, mailer, ledger, config);
    context.service().verify_email(token.trim()).await?;

    Ok(Json(MessageResponse::ok("E-Mail-Adresse erfolgreich bestätigt.")))
}

/// Check credentials and mail a one-time code. No session is issued here.
#[openapi(tag = "Authentication")]
#[post("/login", data = "<payload>")]
pub async fn login(
    pool: &State<PgPool>,
    tokens: &State<TokenService>,
    mailer: &State<Arc<dyn Mailer>>,
    ledger: &State<Arc<ChallengeLedger>>,
    config: &State<Config>,
    _rate_limit: AuthRateLimit,
    payload: JsonBody<LoginRequest>,
) -> Result<Json<LoginChallengeResponse>, AppError> {
    let context = AuthContext::new(pool, tokens, mailer, ledger, config);
    let challenge = context.service().initiate_login(&payload).await?;

    Ok(Json(LoginChallengeResponse {
        success: true,
        message: "Bestätigungscode wurde an Ihre E-Mail-Adresse gesendet.".to_string(),
        code_challenge_token: challenge.code_challenge_token,
        temp_session_token: challenge.temp_session_token,
        user: UserResponse::from(&challenge.user),
        code_sent: challenge.code_sent,
    }))
}

/// Exchange the mailed code for a session. Sets the session cookie.
#[openapi(tag = "Authentication")]
#[post("/verify-2fa", data = "<payload>")]
#[allow(clippy::too_many_arguments)]
pub async fn verify_two_factor(
    pool: &State<PgPool>,
    tokens: &State<TokenService>,
    mailer: &State<Arc<dyn Mailer>>,
    ledger: &State<Arc<ChallengeLedger>>,
    config: &State<Config>,
    cookies: &CookieJar<'_>,
    _rate_limit: AuthRateLimit,
    payload: JsonBody<VerifyCodeRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let context = AuthContext::new(pool, tokens, mailer, ledger, config);
    let session = context.service().verify_code(&payload).await?;

    cookies.add(http_only_cookie(
        config.session.cookie_name.clone(),
        session.token.clone(),
        tokens.session_ttl_seconds(),
        config.session.cookie_secure,
    ));

    Ok(Json(SessionResponse {
        success: true,
        message: "Anmeldung erfolgreich.".to_string(),
        token: session.token,
        user: UserResponse::from(&session.user),
    }))
}

#[openapi(tag = "Authentication")]
#[post("/resend-2fa", data = "<payload>")]
pub async fn resend_two_factor(
    pool: &State<PgPool>,
    tokens: &State<TokenService>,
    mailer: &State<Arc<dyn Mailer>>,
    ledger: &State<Arc<ChallengeLedger>>,
    config: &State<Config>,
    _rate_limit: AuthRateLimit,
    payload: JsonBody<ResendCodeRequest>,
) -> Result<Json<ResendCodeResponse>, AppError> {
    let context = AuthContext::new(pool, tokens, mailer, ledger, config);
    let resent = context.service().resend_code(&payload.temp_session_token).await?;

    Ok(Json(ResendCodeResponse {
        success: true,
        message: "Ein neuer Bestätigungscode wurde gesendet.".to_string(),
        code_challenge_token: resent.code_challenge_token,
        code_sent: resent.code_sent,
    }))
}

#[openapi(tag = "Authentication")]
#[delete("/logout")]
pub fn logout(config: &State<Config>, cookies: &CookieJar<'_>) -> Json<MessageResponse> {
    cookies.remove(Cookie::build((config.session.cookie_name.clone(), "")).path("/"));
    Json(MessageResponse::ok("Abmeldung erfolgreich."))
}

#[openapi(tag = "Authentication")]
#[post("/forgot-password", data = "<payload>")]
pub async fn forgot_password(
    pool: &State<PgPool>,
    tokens: &State<TokenService>,
    mailer: &State<Arc<dyn Mailer>>,
    ledger: &State<Arc<ChallengeLedger>>,
    config: &State<Config>,
    _rate_limit: AuthRateLimit,
    payload: JsonBody<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    payload.validate()?;

    let context = AuthContext::new(pool, tokens, mailer, ledger, config);
    let email_sent = context.service().forgot_password(&payload.email).await?;

    if !email_sent {
        return Err(AppError::email("Password reset email could not be delivered"));
    }

    Ok(Json(MessageResponse::ok("Eine E-Mail zum Zurücksetzen des Passworts wurde gesendet.")))
}

#[openapi(tag = "Authentication")]
#[patch("/reset-password/<token>", data = "<payload>")]
#[allow(clippy::too_many_arguments)]
pub async fn reset_password(
    pool: &State<PgPool>,
    tokens: &State<TokenService>,
    mailer: &State<Arc<dyn Mailer>>,
    ledger: &State<Arc<ChallengeLedger>>,
    config: &State<Config>,
    _rate_limit: AuthRateLimit,
    token: &str,
    payload: JsonBody<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    payload.validate()?;

    let context = AuthContext::new(pool, tokens, mailer, ledger, config);
    context.service().reset_password(token, &payload.password).await?;

    Ok(Json(MessageResponse::ok("Passwort wurde erfolgreich zurückgesetzt.")))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![
        register,
        verify_email,
        login,
        verify_two_factor,
        resend_two_factor,
        logout,
        forgot_password,
        reset_password
    ]
}
