use crate::config::{Config, SessionConfig};
use crate::error::app_error::AppError;
use crate::models::user::ADMIN_ROLE;
use crate::service::token::{Claims, TokenError, TokenPurpose, TokenService};
use rocket::http::{Cookie, SameSite, Status};
use rocket::outcome::Outcome;
use rocket::request::{FromRequest, Outcome as RequestOutcome, Request};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{Object, RefOr, Response, Responses, SecurityRequirement, SecurityScheme, SecuritySchemeData};
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
    pub role: i16,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role >= ADMIN_ROLE
    }

    fn from_claims(claims: &Claims) -> Option<Self> {
        Some(Self {
            id: claims.subject_id().ok()?,
            email: claims.email.clone().unwrap_or_default(),
            role: claims.role.unwrap_or_default(),
        })
    }
}

/// Signed-in user when a valid session is presented; never rejects the request.
#[derive(Debug, Clone)]
pub struct OptionalUser(pub Option<CurrentUser>);

/// Signed-in user with dashboard rights.
///
/// The role is read from the session token and not looked up again, so a demotion takes
/// effect once the user's current session expires (`jwt.session_ttl`, 30 days by default).
/// Rotating `jwt.secret` revokes every session at once.
#[derive(Debug, Clone)]
pub struct AdminUser(pub CurrentUser);

/// Holder of a fresh page token for a scanned QR code.
#[derive(Debug, Clone, Copy)]
pub struct QrPageAccess {
    pub qr_id: Uuid,
}

fn session_settings(req: &Request<'_>) -> SessionConfig {
    req.rocket().state::<Config>().map(|config| config.session.clone()).unwrap_or_default()
}

/// The session cookie wins over an `Authorization: Bearer` header.
fn presented_session_token(req: &Request<'_>) -> Option<String> {
    let cookie_name = session_settings(req).cookie_name;
    if let Some(cookie) = req.cookies().get(&cookie_name) {
        return Some(cookie.value().to_string());
    }

    req.headers()
        .get_one("Authorization")
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

fn verify_session(req: &Request<'_>) -> Result<CurrentUser, AppError> {
    let token = presented_session_token(req).ok_or(AppError::Unauthorized)?;
    let tokens = req.rocket().state::<TokenService>().ok_or(AppError::Unauthorized)?;

    let claims = tokens.verify(&token, TokenPurpose::Session).map_err(|e| match e {
        TokenError::Expired => AppError::SessionExpired("Die Sitzung ist abgelaufen. Bitte melden Sie sich erneut an.".to_string()),
        TokenError::Invalid => AppError::Unauthorized,
    })?;

    CurrentUser::from_claims(&claims).ok_or(AppError::Unauthorized)
}

/// Subject of a valid session token, if any. Used where a missing session is not an error.
pub(crate) fn session_user_id(req: &Request<'_>) -> Option<Uuid> {
    verify_session(req).ok().map(|user| user.id)
}

pub(crate) fn http_only_cookie(name: String, value: String, max_age_seconds: i64, secure: bool) -> Cookie<'static> {
    // cross-site frontends need SameSite=None, which browsers only accept on secure cookies
    let same_site = if secure { SameSite::None } else { SameSite::Lax };

    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(same_site)
        .max_age(rocket::time::Duration::seconds(max_age_seconds))
        .build()
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CurrentUser {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        match verify_session(req) {
            Ok(user) => {
                req.local_cache(|| Some(user.clone()));
                Outcome::Success(user)
            }
            Err(err) => Outcome::Error((Status::from(&err), err)),
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for OptionalUser {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        let user = verify_session(req).ok();
        if let Some(user) = &user {
            req.local_cache(|| Some(user.clone()));
        }
        Outcome::Success(OptionalUser(user))
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminUser {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        match CurrentUser::from_request(req).await {
            Outcome::Success(user) if user.is_admin() => Outcome::Success(AdminUser(user)),
            Outcome::Success(user) => {
                tracing::warn!(user_id = %user.id, role = user.role, "dashboard access denied");
                Outcome::Error((Status::Forbidden, AppError::Forbidden))
            }
            Outcome::Error(error) => Outcome::Error(error),
            Outcome::Forward(status) => Outcome::Forward(status),
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for QrPageAccess {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        let cookie_name = session_settings(req).qr_page_cookie_name;
        let qr_id = req
            .cookies()
            .get(&cookie_name)
            .and_then(|cookie| {
                let tokens = req.rocket().state::<TokenService>()?;
                tokens.verify(cookie.value(), TokenPurpose::QrPage).ok()
            })
            .and_then(|claims| claims.subject_id().ok());

        match qr_id {
            Some(qr_id) => Outcome::Success(QrPageAccess { qr_id }),
            None => Outcome::Error((Status::PaymentRequired, AppError::QrPageTokenRequired)),
        }
    }
}

fn cookie_security(name: &str, cookie: &str, description: &str) -> RequestHeaderInput {
    let security_scheme = SecurityScheme {
        description: Some(description.to_string()),
        data: SecuritySchemeData::ApiKey {
            name: cookie.to_string(),
            location: "cookie".to_string(),
        },
        extensions: Object::default(),
    };

    let mut security_req = SecurityRequirement::new();
    security_req.insert(name.to_string(), Vec::new());

    RequestHeaderInput::Security(name.to_string(), security_scheme, security_req)
}

fn error_responses(codes: &[(&str, &str)]) -> rocket_okapi::Result<Responses> {
    let mut responses = Responses::default();
    for (code, description) in codes {
        responses.responses.insert(
            code.to_string(),
            RefOr::Object(Response {
                description: description.to_string(),
                ..Default::default()
            }),
        );
    }
    Ok(responses)
}

impl<'a> OpenApiFromRequest<'a> for CurrentUser {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(cookie_security(
            "cookieAuth",
            "auth_token",
            "Session cookie set by POST /api/auth/verify-2fa. The same token is accepted as a Bearer header.",
        ))
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        error_responses(&[("401", "Unauthorized - Authentication required")])
    }
}

impl<'a> OpenApiFromRequest<'a> for OptionalUser {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}

impl<'a> OpenApiFromRequest<'a> for AdminUser {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(cookie_security("cookieAuth", "auth_token", "Session cookie of an administrator."))
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        error_responses(&[("401", "Unauthorized - Authentication required"), ("403", "Forbidden - Administrator role required")])
    }
}

impl<'a> OpenApiFromRequest<'a> for QrPageAccess {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(cookie_security(
            "qrPageAuth",
            "qr_page_token",
            "Short-lived page cookie set by GET /api/qrcode/page-token after scanning a tag.",
        ))
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        error_responses(&[("402", "Page token missing or expired - scan the QR code again")])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_jwt_config;
    use rocket::get;
    use rocket::http::Header;
    use rocket::local::asynchronous::Client;
    use rocket::routes;

    #[get("/me")]
    fn me(user: CurrentUser) -> String {
        user.email
    }

    #[get("/admin")]
    fn admin(admin: AdminUser) -> String {
        admin.0.id.to_string()
    }

    #[get("/maybe")]
    fn maybe(user: OptionalUser) -> &'static str {
        if user.0.is_some() { "user" } else { "anonymous" }
    }

    #[get("/page")]
    fn page(access: QrPageAccess) -> String {
        access.qr_id.to_string()
    }

    async fn client() -> Client {
        let rocket = rocket::build()
            .manage(TokenService::new(&test_jwt_config()))
            .manage(Config::default())
            .mount("/", routes![me, admin, maybe, page]);
        Client::tracked(rocket).await.expect("valid rocket instance")
    }

    fn tokens() -> TokenService {
        TokenService::new(&test_jwt_config())
    }

    #[rocket::async_test]
    async fn session_cookie_and_bearer_are_accepted() {
        let client = client().await;
        let token = tokens().issue_session(&Uuid::new_v4(), "owner@example.com", 0).unwrap();

        let response = client.get("/me").cookie(Cookie::new("auth_token", token.clone())).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.into_string().await.unwrap(), "owner@example.com");

        let response = client.get("/me").header(Header::new("Authorization", format!("Bearer {}", token))).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
    }

    #[rocket::async_test]
    async fn missing_or_foreign_token_is_unauthorized() {
        let client = client().await;
        assert_eq!(client.get("/me").dispatch().await.status(), Status::Unauthorized);

        let temp = tokens().issue_temp_session(&Uuid::new_v4()).unwrap();
        let response = client.get("/me").cookie(Cookie::new("auth_token", temp)).dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[rocket::async_test]
    async fn admin_requires_role() {
        let client = client().await;
        let user = tokens().issue_session(&Uuid::new_v4(), "user@example.com", 0).unwrap();
        let admin = tokens().issue_session(&Uuid::new_v4(), "admin@example.com", ADMIN_ROLE).unwrap();

        let response = client.get("/admin").cookie(Cookie::new("auth_token", user)).dispatch().await;
        assert_eq!(response.status(), Status::Forbidden);

        let response = client.get("/admin").cookie(Cookie::new("auth_token", admin)).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
    }

    #[rocket::async_test]
    async fn optional_user_never_rejects() {
        let client = client().await;
        let response = client.get("/maybe").cookie(Cookie::new("auth_token", "garbage")).dispatch().await;
        assert_eq!(response.into_string().await.unwrap(), "anonymous");
    }

    #[rocket::async_test]
    async fn page_access_requires_fresh_page_token() {
        let client = client().await;
        assert_eq!(client.get("/page").dispatch().await.status(), Status::PaymentRequired);

        let qr_id = Uuid::new_v4();
        let token = tokens().issue_qr_page(&qr_id).unwrap();
        let response = client.get("/page").cookie(Cookie::new("qr_page_token", token)).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.into_string().await.unwrap(), qr_id.to_string());

        let session = tokens().issue_session(&qr_id, "owner@example.com", 0).unwrap();
        let response = client.get("/page").cookie(Cookie::new("qr_page_token", session)).dispatch().await;
        assert_eq!(response.status(), Status::PaymentRequired);
    }
}
