use crate::config::{Config, FrontendConfig, JwtConfig, SessionConfig, StorageConfig};
use crate::database::qr_code::QrCodeRepository;
use crate::database::user::{UserRepository, password_hash};
use crate::error::app_error::AppError;
use crate::models::password_reset::PasswordResetTarget;
use crate::models::qr_code::{NewQrCode, QrCode, QrCodeFields, STATUS_ACTIVE, STATUS_PENDING};
use crate::models::user::User;
use crate::service::email::{Mailer, OutgoingEmail};
use crate::service::qr_code::QrCodeFactory;
use crate::service::qr_image::QrImageRenderer;
use crate::service::storage::{ObjectStorage, StoredObject};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// Strong enough for the password policy.
pub const TEST_PASSWORD: &str = "Kater-Felix-schläft-2024!";

pub fn test_jwt_config() -> JwtConfig {
    JwtConfig {
        secret: "test-secret-key-for-unit-tests".to_string(),
        ..JwtConfig::default()
    }
}

pub fn test_factory(repo: Arc<MockQrCodeRepository>, storage: Arc<MockStorage>) -> QrCodeFactory {
    QrCodeFactory {
        repo,
        storage,
        renderer: QrImageRenderer::new(4, 1),
        frontend: FrontendConfig::default(),
        storage_config: StorageConfig::default(),
    }
}

/// Full API under `/api` with in-memory mail and storage. The pool connects lazily, so only
/// requests that fail before touching the database can be exercised without Postgres.
pub async fn test_client() -> rocket::local::asynchronous::Client {
    let config = Config {
        jwt: test_jwt_config(),
        session: SessionConfig {
            cookie_secure: false,
            ..SessionConfig::default()
        },
        ..Config::default()
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect_lazy(&config.database.url)
        .expect("lazy pool");
    let mailer: Arc<dyn Mailer> = Arc::new(MockMailer::default());
    let storage: Arc<dyn ObjectStorage> = Arc::new(MockStorage::with_objects(&[
        "uploads/qr-codes/",
        "uploads/qr-codes/a.png",
        "uploads/qr-codes/b.jpg",
        "uploads/qr-codes/notes.txt",
    ]));

    let rocket = rocket::build().manage(pool).manage(mailer).manage(storage);
    let rocket = crate::mount_application(rocket, &config);

    rocket::local::asynchronous::Client::tracked(rocket).await.expect("valid rocket instance")
}

#[derive(Default)]
pub struct MockMailer {
    sent: tokio::sync::Mutex<Vec<OutgoingEmail>>,
    fail: bool,
}

impl MockMailer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub async fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl Mailer for MockMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), AppError> {
        if self.fail {
            return Err(AppError::email("smtp relay unreachable"));
        }
        self.sent.lock().await.push(email);
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct MockUserRecord {
    user: User,
    reset_token_hash: Option<String>,
    reset_token_expires_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct MockUserRepository {
    users: Mutex<Vec<MockUserRecord>>,
    profiles: AtomicUsize,
    lookups_fail: AtomicBool,
}

impl MockUserRepository {
    pub fn insert_user(&self, email: &str, password: &str, is_verified: bool) -> User {
        let (_, hash) = password_hash(password).unwrap();
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: hash,
            is_verified,
            role: 0,
            created_at: Utc::now(),
        };
        self.users.lock().unwrap().push(MockUserRecord {
            user: user.clone(),
            reset_token_hash: None,
            reset_token_expires_at: None,
        });
        self.profiles.fetch_add(1, Ordering::SeqCst);
        user
    }

    /// While set, lookups by id answer with a database error.
    pub fn fail_lookups(&self, fail: bool) {
        self.lookups_fail.store(fail, Ordering::SeqCst);
    }

    pub fn profile_count(&self) -> usize {
        self.profiles.load(Ordering::SeqCst)
    }

    fn with_record<T>(&self, id: &Uuid, f: impl FnOnce(&mut MockUserRecord) -> T) -> Option<T> {
        let mut users = self.users.lock().unwrap();
        users.iter_mut().find(|record| record.user.id == *id).map(f)
    }
}

#[async_trait::async_trait]
impl UserRepository for MockUserRepository {
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|record| record.user.email == email).map(|record| record.user.clone()))
    }

    async fn get_user_by_id(&self, id: &Uuid) -> Result<Option<User>, AppError> {
        if self.lookups_fail.load(Ordering::SeqCst) {
            return Err(AppError::db("user lookup failed", sqlx::Error::PoolTimedOut));
        }
        Ok(self.with_record(id, |record| record.user.clone()))
    }

    async fn create_user_with_profile(&self, email: &str, _salt: &str, password_hash: &str) -> Result<User, AppError> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|record| record.user.email == email) {
            return Err(AppError::UserAlreadyExists(email.to_string()));
        }

        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            is_verified: false,
            role: 0,
            created_at: Utc::now(),
        };
        users.push(MockUserRecord {
            user: user.clone(),
            reset_token_hash: None,
            reset_token_expires_at: None,
        });
        self.profiles.fetch_add(1, Ordering::SeqCst);
        Ok(user)
    }

    async fn mark_verified(&self, id: &Uuid) -> Result<bool, AppError> {
        Ok(self
            .with_record(id, |record| !std::mem::replace(&mut record.user.is_verified, true))
            .unwrap_or(false))
    }

    async fn set_reset_token(&self, id: &Uuid, token_hash: &str, expires_at: DateTime<Utc>) -> Result<(), AppError> {
        self.with_record(id, |record| {
            record.reset_token_hash = Some(token_hash.to_string());
            record.reset_token_expires_at = Some(expires_at);
        });
        Ok(())
    }

    async fn get_user_by_reset_token(&self, token_hash: &str) -> Result<Option<PasswordResetTarget>, AppError> {
        let users = self.users.lock().unwrap();
        Ok(users
            .iter()
            .find(|record| record.reset_token_hash.as_deref() == Some(token_hash))
            .map(|record| PasswordResetTarget {
                id: record.user.id,
                reset_token_expires_at: record.reset_token_expires_at,
            }))
    }

    async fn reset_password(&self, id: &Uuid, _salt: &str, password_hash: &str) -> Result<(), AppError> {
        self.with_record(id, |record| {
            record.user.password_hash = password_hash.to_string();
            record.reset_token_hash = None;
            record.reset_token_expires_at = None;
        });
        Ok(())
    }
}

/// In-memory QR records. `failing_inserts()` rejects every insert.
#[derive(Default)]
pub struct MockQrCodeRepository {
    records: Mutex<HashMap<Uuid, QrCode>>,
    fail_inserts: bool,
}

impl MockQrCodeRepository {
    pub fn failing_inserts() -> Self {
        Self {
            fail_inserts: true,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

fn apply_fields(qr_code: &mut QrCode, fields: &QrCodeFields) {
    qr_code.name = fields.name.as_deref().map(str::trim).map(str::to_string);
    qr_code.description = fields.description.clone();
    qr_code.category = fields.category.clone();
    qr_code.contact_options = fields.contact_options.clone();
    qr_code.phone_number = fields.phone_number.clone();
    qr_code.email = fields.email.clone();
    qr_code.animal_name = fields.animal_name.clone();
    qr_code.animal_species = fields.animal_species.clone();
    qr_code.animal_breed = fields.animal_breed.clone();
    qr_code.animal_feature = fields.animal_feature.clone();
}

#[async_trait::async_trait]
impl QrCodeRepository for MockQrCodeRepository {
    async fn create_qr_code(&self, new_qr_code: &NewQrCode) -> Result<QrCode, AppError> {
        if self.fail_inserts {
            return Err(AppError::db("insert rejected", sqlx::Error::PoolTimedOut));
        }
        let now = Utc::now();
        let mut qr_code = QrCode {
            id: new_qr_code.id,
            name: None,
            user_id: new_qr_code.user_id,
            password_hash: new_qr_code.password_hash.clone(),
            image_url: new_qr_code.image_url.clone(),
            description: None,
            category: None,
            contact_options: Vec::new(),
            phone_number: None,
            email: None,
            animal_name: None,
            animal_species: None,
            animal_breed: None,
            animal_feature: None,
            status: STATUS_PENDING,
            search_index: new_qr_code.search_index.clone(),
            created_at: now,
            updated_at: now,
        };
        apply_fields(&mut qr_code, &new_qr_code.fields);

        self.records.lock().unwrap().insert(qr_code.id, qr_code.clone());
        Ok(qr_code)
    }

    async fn get_qr_code(&self, id: &Uuid) -> Result<Option<QrCode>, AppError> {
        Ok(self.records.lock().unwrap().get(id).cloned())
    }

    async fn qr_code_name_taken(&self, name: &str, user_id: &Uuid) -> Result<bool, AppError> {
        let records = self.records.lock().unwrap();
        Ok(records
            .values()
            .any(|record| record.user_id == Some(*user_id) && record.name.as_deref() == Some(name)))
    }

    async fn update_qr_code(&self, id: &Uuid, fields: &QrCodeFields, search_index: &str, claim_owner: Option<Uuid>) -> Result<QrCode, AppError> {
        let mut records = self.records.lock().unwrap();
        let qr_code = records
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound("QR-Code nicht gefunden".to_string()))?;

        apply_fields(qr_code, fields);
        qr_code.user_id = qr_code.user_id.or(claim_owner);
        qr_code.search_index = search_index.to_string();
        qr_code.status = STATUS_ACTIVE;
        qr_code.updated_at = Utc::now();
        Ok(qr_code.clone())
    }

    async fn set_qr_password(&self, id: &Uuid, password_hash: &str) -> Result<bool, AppError> {
        let mut records = self.records.lock().unwrap();
        Ok(records
            .get_mut(id)
            .map(|record| record.password_hash = password_hash.to_string())
            .is_some())
    }
}

#[derive(Debug, Clone)]
pub struct MockUpload {
    pub key: String,
    pub content_type: String,
    pub size: usize,
}

/// In-memory bucket. `failing_every(n)` rejects every n-th upload.
#[derive(Default)]
pub struct MockStorage {
    uploads: Mutex<Vec<MockUpload>>,
    attempts: AtomicUsize,
    fail_every: Option<usize>,
}

impl MockStorage {
    pub fn failing_every(n: usize) -> Self {
        Self {
            fail_every: Some(n.max(1)),
            ..Self::default()
        }
    }

    pub fn with_objects(keys: &[&str]) -> Self {
        let storage = Self::default();
        storage.uploads.lock().unwrap().extend(keys.iter().map(|key| MockUpload {
            key: key.to_string(),
            content_type: "application/octet-stream".to_string(),
            size: 42,
        }));
        storage
    }

    pub fn uploads(&self) -> Vec<MockUpload> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ObjectStorage for MockStorage {
    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<String, AppError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_every.is_some_and(|n| attempt % n == 0) {
            return Err(AppError::storage(format!("upload of {} rejected", key)));
        }

        self.uploads.lock().unwrap().push(MockUpload {
            key: key.to_string(),
            content_type: content_type.to_string(),
            size: body.len(),
        });
        Ok(StorageConfig::default().object_url(key))
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<StoredObject>, AppError> {
        let uploads = self.uploads.lock().unwrap();
        Ok(uploads
            .iter()
            .filter(|upload| upload.key.starts_with(prefix))
            .map(|upload| StoredObject {
                key: upload.key.clone(),
                size: upload.size as i64,
                last_modified: Some(Utc::now()),
            })
            .collect())
    }

    async fn presigned_url(&self, key: &str, expires_in: Duration) -> Result<String, AppError> {
        Ok(format!("https://presigned.example.com/{}?expires={}", key, expires_in.as_secs()))
    }

    fn bucket(&self) -> &str {
        "test-bucket"
    }
}
