use crate::auth::AdminUser;
use crate::config::Config;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::error::json::JsonBody;
use crate::middleware::rate_limit::RateLimit;
use crate::models::dashboard::{
    BatchImagesResponse, BatchRequest, BatchResponse, DashboardRecord, RecordFilter, RecordOrder, RecordSortField, RecordsResponse, ResetQrPasswordRequest,
    ResetQrPasswordResponse, SortDirection,
};
use crate::models::pagination::RecordWindow;
use crate::service::batch::generate_batch;
use crate::service::qr_code::{QrCodeFactory, reset_qr_password};
use crate::service::storage::{ObjectStorage, list_batch_images};
use rocket::serde::json::Json;
use rocket::{State, get, patch, post};
use rocket_okapi::openapi;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use validator::Validate;

/// Paged, searchable listing of all QR records joined with their owner's profile.
///
/// `start_index`/`end_index` select the half-open window. Unknown `field` values fall back
/// to sorting by name. `search_text` matches case-insensitively against record and owner data.
#[openapi(tag = "Dashboard")]
#[get("/records?<start_index>&<end_index>&<field>&<sort>&<search_text>&<user_id>")]
#[allow(clippy::too_many_arguments)]
pub async fn get_records(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    _admin: AdminUser,
    start_index: Option<i64>,
    end_index: Option<i64>,
    field: Option<RecordSortField>,
    sort: Option<SortDirection>,
    search_text: Option<String>,
    user_id: Option<String>,
) -> Result<Json<RecordsResponse>, AppError> {
    let window = RecordWindow::from_query(start_index, end_index)?;
    let user_id = user_id
        .filter(|id| !id.trim().is_empty())
        .map(|id| Uuid::parse_str(id.trim()).map_err(|e| AppError::uuid("Invalid user id", e)))
        .transpose()?;

    let filter = RecordFilter::new(search_text, user_id);
    let order = RecordOrder {
        field: field.unwrap_or_default(),
        direction: sort.unwrap_or_default(),
    };

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let (rows, total, counts) = tokio::try_join!(
        repo.list_dashboard_records(&filter, order, window),
        repo.count_dashboard_records(&filter),
        repo.qr_status_counts(),
    )?;

    let records: Vec<DashboardRecord> = rows.into_iter().map(DashboardRecord::from).collect();

    Ok(Json(RecordsResponse {
        success: true,
        message: format!("{} Datensätze gefunden", records.len()),
        records,
        total,
        inactive_count: counts.inactive_count,
        active_count: counts.active_count,
    }))
}

#[openapi(tag = "Dashboard")]
#[patch("/reset-qrcode-password", data = "<payload>")]
pub async fn patch_reset_qr_password(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    admin: AdminUser,
    payload: JsonBody<ResetQrPasswordRequest>,
) -> Result<Json<ResetQrPasswordResponse>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let new_password = reset_qr_password(&repo, &payload.qr_id).await?;

    tracing::info!(admin_id = %admin.0.id, qr_id = %payload.qr_id, "qr code password reset by admin");
    Ok(Json(ResetQrPasswordResponse {
        success: true,
        message: "Passwort erfolgreich zurückgesetzt".to_string(),
        new_password,
    }))
}

/// Generate many unnamed tags at once. Partial failure still answers 200; check `failed`.
#[openapi(tag = "Dashboard")]
#[post("/batch", data = "<payload>")]
pub async fn post_batch(
    pool: &State<PgPool>,
    storage: &State<Arc<dyn ObjectStorage>>,
    config: &State<Config>,
    _rate_limit: RateLimit,
    admin: AdminUser,
    payload: JsonBody<BatchRequest>,
) -> Result<Json<BatchResponse>, AppError> {
    let count = payload.count(config.qr_code.max_batch_size)?;
    payload.template.validate()?;

    let repo = Arc::new(PostgresRepository { pool: pool.inner().clone() });
    let factory = QrCodeFactory::new(repo, storage.inner().clone(), config);

    tracing::info!(admin_id = %admin.0.id, count, "qr batch requested");
    let outcome = generate_batch(&factory, count, config.qr_code.batch_concurrency, payload.user_id, &payload.template).await;

    Ok(Json(BatchResponse::from_outcome(outcome, count)))
}

/// Rendered tag images in the bucket, each with a temporary download link.
#[openapi(tag = "Dashboard")]
#[get("/batch/images")]
pub async fn get_batch_images(
    storage: &State<Arc<dyn ObjectStorage>>,
    config: &State<Config>,
    _rate_limit: RateLimit,
    _admin: AdminUser,
) -> Result<Json<BatchImagesResponse>, AppError> {
    let prefix = &config.storage.key_prefix;
    let link_ttl = Duration::from_secs(config.storage.presign_ttl_seconds);
    let images = list_batch_images(storage.inner().as_ref(), prefix, link_ttl).await?;

    Ok(Json(BatchImagesResponse {
        success: true,
        total: images.len(),
        images,
        directory: prefix.clone(),
        bucket: storage.bucket().to_string(),
    }))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![get_records, patch_reset_qr_password, post_batch, get_batch_images]
}

#[cfg(test)]
mod tests {
    use crate::models::user::ADMIN_ROLE;
    use crate::service::token::TokenService;
    use crate::test_utils::{test_client, test_jwt_config};
    use rocket::http::{ContentType, Cookie, Status};
    use serde_json::Value;
    use uuid::Uuid;

    fn session(role: i16) -> Cookie<'static> {
        let token = TokenService::new(&test_jwt_config())
            .issue_session(&Uuid::new_v4(), "admin@example.com", role)
            .unwrap();
        Cookie::new("auth_token", token)
    }

    #[rocket::async_test]
    async fn dashboard_is_admin_only() {
        let client = test_client().await;
        assert_eq!(client.get("/api/dashboard/batch/images").dispatch().await.status(), Status::Unauthorized);

        let response = client.get("/api/dashboard/batch/images").cookie(session(0)).dispatch().await;
        assert_eq!(response.status(), Status::Forbidden);
    }

    #[rocket::async_test]
    async fn batch_images_are_listed_with_presigned_links() {
        let client = test_client().await;
        let response = client.get("/api/dashboard/batch/images").cookie(session(ADMIN_ROLE)).dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["bucket"], "test-bucket");
        assert_eq!(body["directory"], "uploads/qr-codes/");
        assert_eq!(body["total"], 2);
        assert!(body["images"][0]["url"].as_str().unwrap().starts_with("https://presigned.example.com/"));
    }

    #[rocket::async_test]
    async fn invalid_batch_counts_are_rejected_before_generation() {
        let client = test_client().await;
        for count in [r#"0"#, r#"-3"#, r#""many""#, r#"2.5"#] {
            let response = client
                .post("/api/dashboard/batch")
                .cookie(session(ADMIN_ROLE))
                .header(ContentType::JSON)
                .body(format!(r#"{{"qr_code_count":{}}}"#, count))
                .dispatch()
                .await;
            assert_eq!(response.status(), Status::BadRequest, "count {}", count);
        }
    }

    #[rocket::async_test]
    async fn records_require_a_window() {
        let client = test_client().await;
        let response = client.get("/api/dashboard/records").cookie(session(ADMIN_ROLE)).dispatch().await;
        assert_eq!(response.status(), Status::BadRequest);

        let response = client
            .get("/api/dashboard/records?start_index=0&end_index=500")
            .cookie(session(ADMIN_ROLE))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
    }
}
