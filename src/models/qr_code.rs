use crate::error::app_error::AppError;
use crate::models::profile::PHONE_RE;
use crate::service::search::{Searchable, build_search_index};
use chrono::{DateTime, Utc};
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use uuid::Uuid;
use validator::Validate;

/// Freshly generated, not yet edited by its owner.
pub const STATUS_PENDING: i16 = 0;
pub const STATUS_ACTIVE: i16 = 1;

#[derive(Debug, Clone, Serialize, sqlx::FromRow, JsonSchema)]
pub struct QrCode {
    pub id: Uuid,
    pub name: Option<String>,
    pub user_id: Option<Uuid>,
    #[serde(skip)]
    pub password_hash: String,
    pub image_url: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub contact_options: Vec<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub animal_name: Option<String>,
    pub animal_species: Option<String>,
    pub animal_breed: Option<String>,
    pub animal_feature: Option<String>,
    pub status: i16,
    #[serde(skip)]
    pub search_index: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QrCode {
    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }
}

/// Caller editable fields of a QR record. Anything else in a request body is rejected.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct QrCodeFields {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    #[serde(default)]
    pub contact_options: Vec<String>,
    #[schemars(regex(path = "PHONE_RE"))]
    #[validate(regex(path = *PHONE_RE))]
    pub phone_number: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 100))]
    pub animal_name: Option<String>,
    #[validate(length(max = 100))]
    pub animal_species: Option<String>,
    #[validate(length(max = 100))]
    pub animal_breed: Option<String>,
    #[validate(length(max = 500))]
    pub animal_feature: Option<String>,
}

impl QrCodeFields {
    /// Trimmed name, required when a signed-in user creates a single code.
    pub fn required_name(&self) -> Result<String, AppError> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AppError::BadRequest("Name ist erforderlich".to_string()))
    }
}

/// Index stored with a record: the editable fields plus its id and image URL, so admins can
/// search by either.
pub fn record_search_index(fields: &QrCodeFields, id: &Uuid, image_url: &str) -> String {
    let mut terms = fields.search_terms();
    terms.push(id.to_string());
    terms.push(image_url.to_string());
    build_search_index(terms)
}

impl Searchable for QrCodeFields {
    fn search_terms(&self) -> Vec<String> {
        let mut terms: Vec<String> = [
            &self.name,
            &self.description,
            &self.category,
            &self.phone_number,
            &self.email,
            &self.animal_name,
            &self.animal_species,
            &self.animal_breed,
            &self.animal_feature,
        ]
        .into_iter()
        .flatten()
        .cloned()
        .collect();
        terms.extend(self.contact_options.iter().cloned());
        terms
    }
}

/// Everything needed to insert one QR record.
#[derive(Debug, Clone)]
pub struct NewQrCode {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub password_hash: String,
    pub image_url: String,
    pub fields: QrCodeFields,
    pub search_index: String,
}

/// Outcome of one generation unit; the plaintext password is only ever returned here.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct GeneratedQrCode {
    pub id: Uuid,
    pub image_url: String,
    pub password: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct GenerateQrCodeResponse {
    pub success: bool,
    pub message: String,
    pub id: Uuid,
    pub pet_page_url: String,
    pub image_url: String,
    pub password: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct PageTokenResponse {
    pub success: bool,
    pub page_token: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct VerifyQrPasswordRequest {
    pub qr_id: Uuid,
    pub password: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct VerifyQrPasswordResponse {
    pub success: bool,
    pub editable: bool,
    pub message: String,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateQrCodeRequest {
    pub password: String,
    #[validate(nested)]
    pub fields: QrCodeFields,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct QrCodeResponse {
    pub success: bool,
    pub data: QrCode,
}
