use crate::auth::{CurrentUser, QrPageAccess};
use crate::database::postgres_repository::PostgresRepository;
use crate::database::qr_code::QrCodeRepository;
use crate::error::app_error::AppError;
use crate::error::json::JsonBody;
use crate::middleware::rate_limit::RateLimit;
use crate::models::profile::{OwnerContact, OwnerContactResponse, ProfileResponse, ProfileUpdateRequest};
use crate::service::search::Searchable;
use rocket::serde::json::Json;
use rocket::{State, get, put};
use rocket_okapi::openapi;
use sqlx::PgPool;
use validator::Validate;

fn profile_not_found() -> AppError {
    AppError::NotFound("Profil nicht gefunden".to_string())
}

/// Profile of the signed-in user.
#[openapi(tag = "Profile")]
#[get("/")]
pub async fn get_profile(pool: &State<PgPool>, _rate_limit: RateLimit, current_user: CurrentUser) -> Result<Json<ProfileResponse>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let profile = repo.get_profile_by_user(&current_user.id).await?.ok_or_else(profile_not_found)?;

    Ok(Json(ProfileResponse { success: true, data: profile }))
}

/// Replaces all profile fields; omitted fields are cleared.
#[openapi(tag = "Profile")]
#[put("/", data = "<payload>")]
pub async fn put_profile(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    current_user: CurrentUser,
    payload: JsonBody<ProfileUpdateRequest>,
) -> Result<Json<ProfileResponse>, AppError> {
    payload.validate()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let profile = repo
        .update_profile(&current_user.id, &payload, &payload.search_index())
        .await?
        .ok_or_else(profile_not_found)?;

    tracing::info!(user_id = %current_user.id, "profile updated");
    Ok(Json(ProfileResponse { success: true, data: profile }))
}

/// Contact details of the owner of the scanned tag. `data` is null for unclaimed tags.
#[openapi(tag = "Profile")]
#[get("/by-qr")]
pub async fn get_owner_by_qr(pool: &State<PgPool>, _rate_limit: RateLimit, access: QrPageAccess) -> Result<Json<OwnerContactResponse>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let qr_code = repo
        .get_qr_code(&access.qr_id)
        .await?
        .ok_or_else(|| AppError::NotFound("QR-Code nicht gefunden".to_string()))?;

    let data = match qr_code.user_id {
        Some(owner) => repo.get_profile_by_user(&owner).await?.map(OwnerContact::from),
        None => None,
    };

    Ok(Json(OwnerContactResponse { success: true, data }))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![get_profile, put_profile, get_owner_by_qr]
}
