use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::qr_code::{NewQrCode, QrCode, QrCodeFields, STATUS_ACTIVE, STATUS_PENDING};
use uuid::Uuid;

pub(crate) const QR_CODE_COLUMNS: &str = r#"
    id, name, user_id, password_hash, image_url, description, category, contact_options,
    phone_number, email, animal_name, animal_species, animal_breed, animal_feature,
    status, search_index, created_at, updated_at
"#;

#[async_trait::async_trait]
pub trait QrCodeRepository: Send + Sync {
    async fn create_qr_code(&self, new_qr_code: &NewQrCode) -> Result<QrCode, AppError>;
    async fn get_qr_code(&self, id: &Uuid) -> Result<Option<QrCode>, AppError>;
    async fn qr_code_name_taken(&self, name: &str, user_id: &Uuid) -> Result<bool, AppError>;
    /// Replaces the editable fields and activates the record. `claim_owner` is only applied
    /// to records that have no owner yet.
    async fn update_qr_code(&self, id: &Uuid, fields: &QrCodeFields, search_index: &str, claim_owner: Option<Uuid>) -> Result<QrCode, AppError>;
    /// Returns `false` when no record has this id.
    async fn set_qr_password(&self, id: &Uuid, password_hash: &str) -> Result<bool, AppError>;
}

#[async_trait::async_trait]
impl QrCodeRepository for PostgresRepository {
    async fn create_qr_code(&self, new_qr_code: &NewQrCode) -> Result<QrCode, AppError> {
        let fields = &new_qr_code.fields;
        let qr_code = sqlx::query_as::<_, QrCode>(&format!(
            r#"
            INSERT INTO qr_codes (
                id, name, user_id, password_hash, image_url, description, category, contact_options,
                phone_number, email, animal_name, animal_species, animal_breed, animal_feature,
                status, search_index
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING {QR_CODE_COLUMNS}
            "#
        ))
        .bind(new_qr_code.id)
        .bind(fields.name.as_deref().map(str::trim))
        .bind(new_qr_code.user_id)
        .bind(&new_qr_code.password_hash)
        .bind(&new_qr_code.image_url)
        .bind(&fields.description)
        .bind(&fields.category)
        .bind(&fields.contact_options)
        .bind(&fields.phone_number)
        .bind(&fields.email)
        .bind(&fields.animal_name)
        .bind(&fields.animal_species)
        .bind(&fields.animal_breed)
        .bind(&fields.animal_feature)
        .bind(STATUS_PENDING)
        .bind(&new_qr_code.search_index)
        .fetch_one(&self.pool)
        .await?;

        Ok(qr_code)
    }

    async fn get_qr_code(&self, id: &Uuid) -> Result<Option<QrCode>, AppError> {
        let qr_code = sqlx::query_as::<_, QrCode>(&format!("SELECT {QR_CODE_COLUMNS} FROM qr_codes WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(qr_code)
    }

    async fn qr_code_name_taken(&self, name: &str, user_id: &Uuid) -> Result<bool, AppError> {
        let taken: (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM qr_codes WHERE name = $1 AND user_id = $2)")
            .bind(name)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(taken.0)
    }

    async fn update_qr_code(&self, id: &Uuid, fields: &QrCodeFields, search_index: &str, claim_owner: Option<Uuid>) -> Result<QrCode, AppError> {
        let qr_code = sqlx::query_as::<_, QrCode>(&format!(
            r#"
            UPDATE qr_codes
            SET name = $2,
                description = $3,
                category = $4,
                contact_options = $5,
                phone_number = $6,
                email = $7,
                animal_name = $8,
                animal_species = $9,
                animal_breed = $10,
                animal_feature = $11,
                search_index = $12,
                user_id = COALESCE(user_id, $13),
                status = $14,
                updated_at = now()
            WHERE id = $1
            RETURNING {QR_CODE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(fields.name.as_deref().map(str::trim))
        .bind(&fields.description)
        .bind(&fields.category)
        .bind(&fields.contact_options)
        .bind(&fields.phone_number)
        .bind(&fields.email)
        .bind(&fields.animal_name)
        .bind(&fields.animal_species)
        .bind(&fields.animal_breed)
        .bind(&fields.animal_feature)
        .bind(search_index)
        .bind(claim_owner)
        .bind(STATUS_ACTIVE)
        .fetch_optional(&self.pool)
        .await?;

        qr_code.ok_or_else(|| AppError::NotFound("QR-Code nicht gefunden".to_string()))
    }

    async fn set_qr_password(&self, id: &Uuid, password_hash: &str) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE qr_codes SET password_hash = $1, updated_at = now() WHERE id = $2")
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
