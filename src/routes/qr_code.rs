use crate::auth::{AdminUser, CurrentUser, OptionalUser, QrPageAccess, http_only_cookie};
use crate::config::Config;
use crate::database::postgres_repository::PostgresRepository;
use crate::database::qr_code::QrCodeRepository;
use crate::error::app_error::AppError;
use crate::error::json::JsonBody;
use crate::middleware::rate_limit::{AuthRateLimit, RateLimit};
use crate::models::qr_code::{
    GenerateQrCodeResponse, PageTokenResponse, QrCode, QrCodeFields, QrCodeResponse, UpdateQrCodeRequest, VerifyQrPasswordRequest, VerifyQrPasswordResponse,
};
use crate::service::qr_code::{QrCodeFactory, check_qr_password, update_qr_code};
use crate::service::storage::ObjectStorage;
use crate::service::token::TokenService;
use rocket::http::{CookieJar, Status};
use rocket::serde::json::Json;
use rocket::{State, get, patch, post};
use rocket_okapi::openapi;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

fn parse_qr_id(id: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(id.trim()).map_err(|e| AppError::uuid("Invalid QR code id", e))
}

async fn find_qr_code(repo: &PostgresRepository, id: &Uuid) -> Result<QrCode, AppError> {
    repo.get_qr_code(id)
        .await?
        .ok_or_else(|| AppError::NotFound("QR-Code nicht gefunden".to_string()))
}

/// Create a named tag owned by the signed-in user. The password is only shown in this response.
#[openapi(tag = "QR Codes")]
#[post("/generate", data = "<payload>")]
pub async fn generate_qr_code(
    pool: &State<PgPool>,
    storage: &State<Arc<dyn ObjectStorage>>,
    config: &State<Config>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    payload: JsonBody<QrCodeFields>,
) -> Result<(Status, Json<GenerateQrCodeResponse>), AppError> {
    payload.validate()?;

    let repo = Arc::new(PostgresRepository { pool: pool.inner().clone() });
    let factory = QrCodeFactory::new(repo, storage.inner().clone(), config);
    let generated = factory.create_named(&current_user.id, payload.into_inner()).await?;

    Ok((
        Status::Created,
        Json(GenerateQrCodeResponse {
            success: true,
            message: "QR-Code erfolgreich erstellt".to_string(),
            id: generated.id,
            pet_page_url: config.frontend.pet_page_url(&generated.id),
            image_url: generated.image_url,
            password: generated.password,
        }),
    ))
}

/// Called by the pet page right after a scan; the short-lived cookie unlocks the page data.
#[openapi(tag = "QR Codes")]
#[get("/page-token?<qr_id>")]
pub fn get_page_token(
    tokens: &State<TokenService>,
    config: &State<Config>,
    cookies: &CookieJar<'_>,
    _rate_limit: RateLimit,
    qr_id: &str,
) -> Result<Json<PageTokenResponse>, AppError> {
    let qr_id = parse_qr_id(qr_id)?;
    let page_token = tokens.issue_qr_page(&qr_id)?;

    cookies.add(http_only_cookie(
        config.session.qr_page_cookie_name.clone(),
        page_token.clone(),
        tokens.qr_page_ttl_seconds(),
        config.session.cookie_secure,
    ));

    Ok(Json(PageTokenResponse { success: true, page_token }))
}

/// Public view of the scanned tag.
#[openapi(tag = "QR Codes")]
#[get("/")]
pub async fn get_scanned_qr_code(pool: &State<PgPool>, _rate_limit: RateLimit, access: QrPageAccess) -> Result<Json<QrCodeResponse>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let qr_code = find_qr_code(&repo, &access.qr_id).await?;
    Ok(Json(QrCodeResponse { success: true, data: qr_code }))
}

#[openapi(tag = "QR Codes")]
#[get("/admin/<id>")]
pub async fn get_qr_code_as_admin(pool: &State<PgPool>, _rate_limit: RateLimit, _admin: AdminUser, id: &str) -> Result<Json<QrCodeResponse>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let qr_code = find_qr_code(&repo, &parse_qr_id(id)?).await?;
    Ok(Json(QrCodeResponse { success: true, data: qr_code }))
}

#[openapi(tag = "QR Codes")]
#[post("/verify-password", data = "<payload>")]
pub async fn verify_qr_password(
    pool: &State<PgPool>,
    _rate_limit: AuthRateLimit,
    payload: JsonBody<VerifyQrPasswordRequest>,
) -> Result<Json<VerifyQrPasswordResponse>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    check_qr_password(&repo, &payload.qr_id, &payload.password).await?;

    Ok(Json(VerifyQrPasswordResponse {
        success: true,
        editable: true,
        message: "Passwort korrekt".to_string(),
    }))
}

/// Edit a tag with its password. A signed-in editor becomes the owner of an unclaimed tag.
#[openapi(tag = "QR Codes")]
#[patch("/<id>", data = "<payload>")]
pub async fn patch_qr_code(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    editor: OptionalUser,
    id: &str,
    payload: JsonBody<UpdateQrCodeRequest>,
) -> Result<Json<QrCodeResponse>, AppError> {
    payload.validate()?;
    let id = parse_qr_id(id)?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let editor_id = editor.0.map(|user| user.id);
    let qr_code = update_qr_code(&repo, &id, &payload.password, &payload.fields, editor_id).await?;

    Ok(Json(QrCodeResponse { success: true, data: qr_code }))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![
        generate_qr_code,
        get_page_token,
        get_scanned_qr_code,
        get_qr_code_as_admin,
        verify_qr_password,
        patch_qr_code
    ]
}
