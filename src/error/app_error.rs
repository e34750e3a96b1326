use rocket::http::{ContentType, Status};
use rocket::response::Responder;
use rocket::{Request, Response};
use rocket_okapi::OpenApiError;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::Responses;
use rocket_okapi::response::OpenApiResponderInner;
use serde::Serialize;
use std::io::Cursor;
use thiserror::Error;
use tracing::error;
use validator::ValidationErrors;

/// Shared by "user missing" and "wrong password" so the two stay indistinguishable.
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Ungültige Anmeldedaten";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error")]
    Db {
        message: String,
        #[source]
        source: sqlx::error::Error,
    },
    #[error("User not found")]
    UserNotFound,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden")]
    Forbidden,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Account verification required")]
    VerificationRequired,
    #[error("Account already verified")]
    AlreadyVerified,
    #[error("Session expired: {0}")]
    SessionExpired(String),
    #[error("Verification code expired")]
    CodeExpired,
    #[error("Verification code invalid")]
    CodeInvalid,
    #[error("Token subjects do not match")]
    TokenMismatch,
    #[error("QR page token missing or invalid")]
    QrPageTokenRequired,
    #[error("Internal server error")]
    PasswordHash { message: String },
    #[error("User {0} already exists")]
    UserAlreadyExists(String),
    #[error("QR code {0} already exists for this user")]
    QrCodeExists(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal server error")]
    UuidError {
        message: String,
        #[source]
        source: uuid::Error,
    },
    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationErrors),
    #[error("Internal server error")]
    Email { message: String },
    #[error("Internal server error")]
    Storage { message: String },
    #[error("Internal server error")]
    Render { message: String },
    #[error("Internal server error")]
    Token {
        message: String,
        #[source]
        source: jsonwebtoken::errors::Error,
    },
    #[error("Internal server error")]
    Task { message: String },
    #[error("Internal server error")]
    ConfigurationError {
        message: String,
        #[source]
        source: figment::Error,
    },
}

/// JSON error body; every response carries `success` and a human readable `message`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    pub error: &'static str,
}

impl AppError {
    pub fn db(message: impl Into<String>, source: sqlx::error::Error) -> Self {
        Self::Db {
            message: message.into(),
            source,
        }
    }

    pub fn uuid(message: impl Into<String>, source: uuid::Error) -> Self {
        Self::UuidError {
            message: message.into(),
            source,
        }
    }

    pub fn password_hash(message: impl Into<String>, source: password_hash::Error) -> Self {
        Self::PasswordHash {
            message: format!("{}: {}", message.into(), source),
        }
    }

    pub fn email(message: impl Into<String>) -> Self {
        Self::Email { message: message.into() }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage { message: message.into() }
    }

    pub fn render(message: impl Into<String>) -> Self {
        Self::Render { message: message.into() }
    }

    pub fn token(message: impl Into<String>, source: jsonwebtoken::errors::Error) -> Self {
        Self::Token {
            message: message.into(),
            source,
        }
    }

    pub fn task(source: tokio::task::JoinError) -> Self {
        Self::Task {
            message: format!("Task join error: {}", source),
        }
    }

    /// Stable machine readable code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Db { .. } => "database_error",
            AppError::UserNotFound => "user_not_found",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::VerificationRequired => "verification_required",
            AppError::AlreadyVerified => "already_verified",
            AppError::SessionExpired(_) => "session_expired",
            AppError::CodeExpired => "code_expired",
            AppError::CodeInvalid => "code_invalid",
            AppError::TokenMismatch => "token_mismatch",
            AppError::QrPageTokenRequired => "qr_page_token_required",
            AppError::PasswordHash { .. } => "internal_error",
            AppError::UserAlreadyExists(_) => "user_exists",
            AppError::QrCodeExists(_) => "qr_code_exists",
            AppError::BadRequest(_) => "bad_request",
            AppError::NotFound(_) => "not_found",
            AppError::UuidError { .. } => "invalid_id",
            AppError::ValidationError(_) => "validation_error",
            AppError::Email { .. } => "email_error",
            AppError::Storage { .. } => "storage_error",
            AppError::Render { .. } => "render_error",
            AppError::Token { .. } => "token_error",
            AppError::Task { .. } => "internal_error",
            AppError::ConfigurationError { .. } => "configuration_error",
        }
    }

    /// Localized message shown to the user. Upstream failures stay generic.
    pub fn user_message(&self) -> String {
        match self {
            AppError::UserNotFound => "Benutzer nicht gefunden".to_string(),
            AppError::Unauthorized => "Token existiert nicht".to_string(),
            AppError::Forbidden => "Zugriff verweigert".to_string(),
            AppError::InvalidCredentials => INVALID_CREDENTIALS_MESSAGE.to_string(),
            AppError::VerificationRequired => "Bitte bestätigen Sie zuerst Ihre E-Mail-Adresse.".to_string(),
            AppError::AlreadyVerified => "Das Konto wurde bereits bestätigt.".to_string(),
            AppError::SessionExpired(reason) => reason.clone(),
            AppError::CodeExpired => "Der Bestätigungscode ist abgelaufen.".to_string(),
            AppError::CodeInvalid => "Der Bestätigungscode ist ungültig.".to_string(),
            AppError::TokenMismatch => "Die Sitzungsdaten stimmen nicht überein.".to_string(),
            AppError::QrPageTokenRequired => "Bitte scannen Sie den QR-Code mit Ihrer Kamera.".to_string(),
            AppError::UserAlreadyExists(_) => "E-Mail existiert bereits".to_string(),
            AppError::QrCodeExists(_) => "Ein QR-Code mit diesem Namen und dieser Benutzer-ID existiert bereits für diesen Benutzer.".to_string(),
            AppError::BadRequest(message) | AppError::NotFound(message) => message.clone(),
            AppError::UuidError { .. } => "Ungültige ID".to_string(),
            AppError::ValidationError(errors) => format!("Ungültige Eingabe: {}", errors),
            AppError::Db { .. }
            | AppError::PasswordHash { .. }
            | AppError::Email { .. }
            | AppError::Storage { .. }
            | AppError::Render { .. }
            | AppError::Token { .. }
            | AppError::Task { .. }
            | AppError::ConfigurationError { .. } => "Interner Serverfehler".to_string(),
        }
    }
}

impl From<password_hash::Error> for AppError {
    fn from(e: password_hash::Error) -> Self {
        AppError::password_hash("Password hashing failed", e)
    }
}

impl From<uuid::Error> for AppError {
    fn from(e: uuid::Error) -> Self {
        AppError::uuid("Invalid UUID", e)
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(e: tokio::task::JoinError) -> Self {
        AppError::task(e)
    }
}

impl From<&AppError> for Status {
    fn from(e: &AppError) -> Self {
        match e {
            AppError::UserNotFound => Status::NotFound,
            AppError::InvalidCredentials => Status::Unauthorized,
            AppError::VerificationRequired => Status::Forbidden,
            AppError::AlreadyVerified => Status::Conflict,
            AppError::SessionExpired(_) => Status::Unauthorized,
            AppError::CodeExpired => Status::Unauthorized,
            AppError::CodeInvalid => Status::BadRequest,
            AppError::TokenMismatch => Status::Unauthorized,
            AppError::QrPageTokenRequired => Status::PaymentRequired,
            AppError::PasswordHash { .. } => Status::InternalServerError,
            AppError::Db { .. } => Status::InternalServerError,
            AppError::Unauthorized => Status::Unauthorized,
            AppError::Forbidden => Status::Forbidden,
            AppError::UserAlreadyExists(_) => Status::Conflict,
            AppError::QrCodeExists(_) => Status::Conflict,
            AppError::BadRequest(_) => Status::BadRequest,
            AppError::NotFound(_) => Status::NotFound,
            AppError::UuidError { .. } => Status::BadRequest,
            AppError::ValidationError(_) => Status::BadRequest,
            AppError::Email { .. } => Status::InternalServerError,
            AppError::Storage { .. } => Status::InternalServerError,
            AppError::Render { .. } => Status::InternalServerError,
            AppError::Token { .. } => Status::InternalServerError,
            AppError::Task { .. } => Status::InternalServerError,
            AppError::ConfigurationError { .. } => Status::InternalServerError,
        }
    }
}

impl<'r> Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &Request<'_>) -> rocket::response::Result<'static> {
        let method = req.method();
        let uri = req.uri();

        let request_id = req
            .local_cache(|| None::<crate::middleware::RequestId>)
            .as_ref()
            .map(|r| r.0.as_str())
            .unwrap_or("unknown");

        let user_id = req
            .local_cache(|| None::<crate::auth::CurrentUser>)
            .as_ref()
            .map(|u| u.id.to_string())
            .unwrap_or_else(|| "anonymous".to_string());

        error!(
            error = ?self,
            request_id = %request_id,
            user_id = %user_id,
            method = %method,
            uri = %uri,
            "request failed"
        );

        let status = Status::from(&self);
        let body = ErrorBody {
            success: false,
            message: self.user_message(),
            error: self.code(),
        };
        let body = serde_json::to_string(&body).unwrap_or_else(|_| r#"{"success":false}"#.to_string());

        Response::build()
            .status(status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

impl OpenApiResponderInner for AppError {
    fn responses(_gen: &mut OpenApiGenerator) -> Result<Responses, OpenApiError> {
        use rocket_okapi::okapi::openapi3::{RefOr, Response as OpenApiResponse};
        let mut responses = Responses::default();
        for (code, description) in [
            ("400", "Bad Request"),
            ("401", "Unauthorized"),
            ("403", "Forbidden"),
            ("404", "Not Found"),
            ("409", "Conflict"),
            ("500", "Internal Server Error"),
        ] {
            responses.responses.insert(
                code.to_string(),
                RefOr::Object(OpenApiResponse {
                    description: description.to_string(),
                    ..Default::default()
                }),
            );
        }
        Ok(responses)
    }
}

impl From<figment::Error> for AppError {
    fn from(e: figment::Error) -> Self {
        AppError::ConfigurationError {
            message: "Failed to read configuration".to_string(),
            source: e,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("Ressource nicht gefunden".to_string()),
            _ => AppError::db("Database error", e),
        }
    }
}
