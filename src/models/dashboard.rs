use crate::error::app_error::AppError;
use crate::models::profile::OwnerContact;
use crate::models::qr_code::{GeneratedQrCode, QrCode, QrCodeFields};
use crate::service::batch::BatchOutcome;
use chrono::{DateTime, Utc};
use rocket::FromFormField;
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use serde_json::Value;
use uuid::Uuid;

/// Columns the record listing may be ordered by.
#[derive(FromFormField, Debug, Clone, Copy, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecordSortField {
    #[default]
    #[field(value = "name")]
    Name,
    #[field(value = "animal_name")]
    AnimalName,
    #[field(value = "status")]
    Status,
    #[field(value = "created_at")]
    CreatedAt,
    #[field(value = "updated_at")]
    UpdatedAt,
}

impl RecordSortField {
    pub fn column(self) -> &'static str {
        match self {
            RecordSortField::Name => "q.name",
            RecordSortField::AnimalName => "q.animal_name",
            RecordSortField::Status => "q.status",
            RecordSortField::CreatedAt => "q.created_at",
            RecordSortField::UpdatedAt => "q.updated_at",
        }
    }
}

#[derive(FromFormField, Debug, Clone, Copy, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    #[field(value = "asc")]
    Asc,
    #[field(value = "desc")]
    Desc,
}

impl SortDirection {
    pub fn keyword(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub search_text: Option<String>,
    pub user_id: Option<Uuid>,
}

impl RecordFilter {
    pub fn new(search_text: Option<String>, user_id: Option<Uuid>) -> Self {
        let search_text = search_text.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Self { search_text, user_id }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecordOrder {
    pub field: RecordSortField,
    pub direction: SortDirection,
}

/// One listing row: the QR record plus whatever the owner's profile holds.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DashboardRecordRow {
    #[sqlx(flatten)]
    pub qr_code: QrCode,
    pub owner_first_name: Option<String>,
    pub owner_last_name: Option<String>,
    pub owner_email: Option<String>,
    pub owner_phone: Option<String>,
    pub owner_street: Option<String>,
    pub owner_postal_code: Option<String>,
    pub owner_city: Option<String>,
    pub owner_country: Option<String>,
    pub has_profile: bool,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct DashboardRecord {
    #[serde(flatten)]
    pub qr_code: QrCode,
    pub profile: Option<OwnerContact>,
}

impl From<DashboardRecordRow> for DashboardRecord {
    fn from(row: DashboardRecordRow) -> Self {
        let profile = row.has_profile.then(|| OwnerContact {
            first_name: row.owner_first_name,
            last_name: row.owner_last_name,
            email: row.owner_email,
            phone: row.owner_phone,
            street: row.owner_street,
            postal_code: row.owner_postal_code,
            city: row.owner_city,
            country: row.owner_country,
        });

        Self {
            qr_code: row.qr_code,
            profile,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, JsonSchema)]
pub struct StatusCounts {
    pub inactive_count: i64,
    pub active_count: i64,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct RecordsResponse {
    pub success: bool,
    pub message: String,
    pub records: Vec<DashboardRecord>,
    pub total: i64,
    pub inactive_count: i64,
    pub active_count: i64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ResetQrPasswordRequest {
    pub qr_id: Uuid,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ResetQrPasswordResponse {
    pub success: bool,
    pub message: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BatchRequest {
    /// Number of codes to create. Accepts a number or a numeric string; defaults to 1.
    #[serde(default)]
    pub qr_code_count: Option<Value>,
    /// Owner assigned to every generated record.
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub template: QrCodeFields,
}

impl BatchRequest {
    /// Resolves the requested count; zero, negative, fractional and non-numeric values are rejected.
    pub fn count(&self, max_batch_size: u32) -> Result<usize, AppError> {
        let invalid = || AppError::BadRequest("qr_code_count muss eine positive Zahl sein".to_string());

        let count = match &self.qr_code_count {
            None => 1,
            Some(Value::Number(number)) => match number.as_u64() {
                Some(value) => value,
                None => match number.as_f64() {
                    Some(value) if value > 0.0 && value.fract() == 0.0 && value <= u64::MAX as f64 => value as u64,
                    _ => return Err(invalid()),
                },
            },
            Some(Value::String(text)) => text.trim().parse::<u64>().map_err(|_| invalid())?,
            Some(_) => return Err(invalid()),
        };

        if count == 0 {
            return Err(invalid());
        }

        if count > u64::from(max_batch_size) {
            return Err(AppError::BadRequest(format!("Es können höchstens {} QR-Codes auf einmal erstellt werden", max_batch_size)));
        }

        usize::try_from(count).map_err(|_| invalid())
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct BatchResponse {
    pub success: bool,
    pub message: String,
    pub items: Vec<GeneratedQrCode>,
    pub count: usize,
    pub failed: usize,
}

impl BatchResponse {
    /// `success` only when nothing failed; `count` is what was actually created.
    pub fn from_outcome(outcome: BatchOutcome<GeneratedQrCode>, requested: usize) -> Self {
        let success = outcome.is_complete_success();
        let created = outcome.items.len();
        let message = if success {
            format!("{} QR-Codes erfolgreich erstellt", created)
        } else {
            format!("{} von {} QR-Codes erstellt, {} fehlgeschlagen", created, requested, outcome.failed)
        };

        Self {
            success,
            message,
            count: created,
            failed: outcome.failed,
            items: outcome.items,
        }
    }
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct BatchImage {
    pub key: String,
    pub url: String,
    pub name: String,
    pub identifier: String,
    pub size: i64,
    pub last_modified: Option<DateTime<Utc>>,
    pub file_type: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct BatchImagesResponse {
    pub success: bool,
    pub images: Vec<BatchImage>,
    pub total: usize,
    pub directory: String,
    pub bucket: String,
}
