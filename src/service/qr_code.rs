use crate::config::{Config, FrontendConfig, StorageConfig};
use crate::database::qr_code::QrCodeRepository;
use crate::database::user::{hash_password_blocking, verify_password_blocking};
use crate::error::app_error::AppError;
use crate::models::qr_code::{GeneratedQrCode, NewQrCode, QrCode, QrCodeFields, record_search_index};
use crate::service::codes::generate_six_digit_code;
use crate::service::qr_image::QrImageRenderer;
use crate::service::storage::ObjectStorage;
use std::sync::Arc;
use uuid::Uuid;

/// One unit of QR generation: id, rendered tag, upload, persisted record.
///
/// Cheap to clone; batch workers each hold their own handle.
#[derive(Clone)]
pub struct QrCodeFactory {
    pub repo: Arc<dyn QrCodeRepository>,
    pub storage: Arc<dyn ObjectStorage>,
    pub renderer: QrImageRenderer,
    pub frontend: FrontendConfig,
    pub storage_config: StorageConfig,
}

impl QrCodeFactory {
    pub fn new(repo: Arc<dyn QrCodeRepository>, storage: Arc<dyn ObjectStorage>, config: &Config) -> Self {
        Self {
            repo,
            storage,
            renderer: QrImageRenderer::from_config(&config.qr_code),
            frontend: config.frontend.clone(),
            storage_config: config.storage.clone(),
        }
    }

    pub async fn create(&self, owner: Option<Uuid>, fields: QrCodeFields) -> Result<GeneratedQrCode, AppError> {
        let id = Uuid::new_v4();
        let password = generate_six_digit_code();

        let renderer = self.renderer;
        let page_url = self.frontend.pet_page_url(&id);
        let caption = password.clone();
        let image = tokio::task::spawn_blocking(move || renderer.render_tag(&page_url, &caption)).await??;

        let key = self.storage_config.qr_image_key(&id, image.extension);
        let image_url = self.storage.put_object(&key, image.bytes, image.content_type).await?;

        let (_, password_hash) = hash_password_blocking(password.clone()).await?;
        let search_index = record_search_index(&fields, &id, &image_url);

        let record = NewQrCode {
            id,
            user_id: owner,
            password_hash,
            image_url: image_url.clone(),
            fields,
            search_index,
        };
        if let Err(e) = self.repo.create_qr_code(&record).await {
            // the uploaded image has no record now; leave the key for manual cleanup
            tracing::error!(qr_id = %id, key = %key, error = %e, "qr code insert failed after image upload");
            return Err(e);
        }

        tracing::info!(qr_id = %id, owner = ?owner, "qr code generated");
        Ok(GeneratedQrCode { id, image_url, password })
    }

    /// Single generation for a signed-in owner; names are unique per owner.
    pub async fn create_named(&self, owner: &Uuid, mut fields: QrCodeFields) -> Result<GeneratedQrCode, AppError> {
        let name = fields.required_name()?;
        if self.repo.qr_code_name_taken(&name, owner).await? {
            return Err(AppError::QrCodeExists(name));
        }

        fields.name = Some(name);
        self.create(Some(*owner), fields).await
    }
}

pub async fn check_qr_password(repo: &dyn QrCodeRepository, id: &Uuid, password: &str) -> Result<QrCode, AppError> {
    let qr_code = repo
        .get_qr_code(id)
        .await?
        .ok_or_else(|| AppError::NotFound("QR-Code nicht gefunden".to_string()))?;

    if !verify_password_blocking(qr_code.password_hash.clone(), password.trim().to_string()).await? {
        return Err(AppError::BadRequest("Falsches Passwort".to_string()));
    }

    Ok(qr_code)
}

/// Replaces the editable fields after re-checking the password. An unowned record is
/// claimed by `editor` when one is signed in.
pub async fn update_qr_code(
    repo: &dyn QrCodeRepository,
    id: &Uuid,
    password: &str,
    fields: &QrCodeFields,
    editor: Option<Uuid>,
) -> Result<QrCode, AppError> {
    let current = check_qr_password(repo, id, password).await?;

    let search_index = record_search_index(fields, id, &current.image_url);
    let updated = repo.update_qr_code(id, fields, &search_index, editor).await?;
    if current.is_active() {
        tracing::info!(qr_id = %id, "qr code updated");
    } else {
        tracing::info!(qr_id = %id, owner = ?updated.user_id, "qr code activated on first edit");
    }
    Ok(updated)
}

/// Issues a fresh password; the plaintext is only returned here.
pub async fn reset_qr_password(repo: &dyn QrCodeRepository, id: &Uuid) -> Result<String, AppError> {
    let password = generate_six_digit_code();
    let (_, password_hash) = hash_password_blocking(password.clone()).await?;

    if !repo.set_qr_password(id, &password_hash).await? {
        return Err(AppError::NotFound("QR-Code nicht gefunden".to_string()));
    }

    tracing::info!(qr_id = %id, "qr code password reset");
    Ok(password)
}
