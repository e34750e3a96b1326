use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::profile::{Profile, ProfileUpdateRequest};
use uuid::Uuid;

const PROFILE_COLUMNS: &str = "id, user_id, first_name, last_name, email, phone, street, postal_code, city, country, search_index, created_at, updated_at";

impl PostgresRepository {
    pub async fn get_profile_by_user(&self, user_id: &Uuid) -> Result<Option<Profile>, AppError> {
        let profile = sqlx::query_as::<_, Profile>(&format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = $1"))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(profile)
    }

    /// Overwrites every profile field with the request's values.
    pub async fn update_profile(&self, user_id: &Uuid, request: &ProfileUpdateRequest, search_index: &str) -> Result<Option<Profile>, AppError> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            r#"
            UPDATE profiles
            SET first_name = $2,
                last_name = $3,
                email = $4,
                phone = $5,
                street = $6,
                postal_code = $7,
                city = $8,
                country = $9,
                search_index = $10,
                updated_at = now()
            WHERE user_id = $1
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(&request.first_name)
        .bind(&request.last_name)
        .bind(&request.email)
        .bind(&request.phone)
        .bind(&request.street)
        .bind(&request.postal_code)
        .bind(&request.city)
        .bind(&request.country)
        .bind(search_index)
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile)
    }
}
