use crate::service::search::Searchable;
use chrono::{DateTime, Utc};
use regex::Regex;
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use std::sync::LazyLock;
use uuid::Uuid;
use validator::Validate;

/// Digits with the usual separators and an optional leading `+`.
pub static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\+?[0-9][0-9 ()/\-]{2,31}$").expect("valid phone regex"));

#[derive(Debug, Clone, Serialize, sqlx::FromRow, JsonSchema)]
pub struct Profile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub street: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    #[serde(skip)]
    pub search_index: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Contact details of a tag owner, shown to whoever scanned the tag.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct OwnerContact {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub street: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

impl From<Profile> for OwnerContact {
    fn from(profile: Profile) -> Self {
        Self {
            first_name: profile.first_name,
            last_name: profile.last_name,
            email: profile.email,
            phone: profile.phone,
            street: profile.street,
            postal_code: profile.postal_code,
            city: profile.city,
            country: profile.country,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ProfileUpdateRequest {
    #[validate(length(max = 100))]
    pub first_name: Option<String>,
    #[validate(length(max = 100))]
    pub last_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[schemars(regex(path = "PHONE_RE"))]
    #[validate(regex(path = *PHONE_RE))]
    pub phone: Option<String>,
    #[validate(length(max = 200))]
    pub street: Option<String>,
    #[validate(length(max = 20))]
    pub postal_code: Option<String>,
    #[validate(length(max = 100))]
    pub city: Option<String>,
    #[validate(length(max = 100))]
    pub country: Option<String>,
}

impl Searchable for ProfileUpdateRequest {
    fn search_terms(&self) -> Vec<String> {
        [
            &self.first_name,
            &self.last_name,
            &self.email,
            &self.phone,
            &self.street,
            &self.postal_code,
            &self.city,
            &self.country,
        ]
        .into_iter()
        .flatten()
        .cloned()
        .collect()
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ProfileResponse {
    pub success: bool,
    pub data: Profile,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct OwnerContactResponse {
    pub success: bool,
    pub data: Option<OwnerContact>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_fields_are_rejected() {
        let parsed = serde_json::from_str::<ProfileUpdateRequest>(r#"{"first_name":"Anna","role":1}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn search_terms_cover_all_set_fields() {
        let request = ProfileUpdateRequest {
            first_name: Some("Anna".to_string()),
            city: Some("München".to_string()),
            postal_code: Some("80331".to_string()),
            ..ProfileUpdateRequest::default()
        };
        let index = request.search_index();
        assert!(index.contains("anna"));
        assert!(index.contains("münchen"));
        assert!(index.contains("80331"));
    }

    #[test]
    fn phone_format_is_validated() {
        let valid = ProfileUpdateRequest {
            phone: Some("+49 (0)89 123-456".to_string()),
            ..ProfileUpdateRequest::default()
        };
        assert!(valid.validate().is_ok());

        let invalid = ProfileUpdateRequest {
            phone: Some("call me".to_string()),
            ..ProfileUpdateRequest::default()
        };
        assert!(invalid.validate().is_err());
    }
}
