use rocket::figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE_PATH: &str = "/api";
pub const DEFAULT_JWT_SECRET: &str = "change-me-in-production";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub cors: CorsConfig,
    pub api: ApiConfig,
    pub rate_limit: RateLimitConfig,
    pub session: SessionConfig,
    pub jwt: JwtConfig,
    pub email: EmailConfig,
    pub frontend: FrontendConfig,
    pub storage: StorageConfig,
    pub qr_code: QrCodeConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: u64,
    pub run_migrations: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub address: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json_format: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiConfig {
    pub base_path: String,
    pub additional_base_paths: Vec<String>,
    pub enable_swagger: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RateLimitConfig {
    pub read_limit: u32,
    pub mutation_limit: u32,
    pub auth_limit: u32,
    pub window_seconds: u64,
    pub cleanup_interval_seconds: u64,
    pub require_client_ip: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub qr_page_cookie_name: String,
    pub cookie_secure: bool,
}

/// Lifetimes are in seconds.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub code_challenge_ttl: i64,
    pub temp_session_ttl: i64,
    pub session_ttl: i64,
    pub qr_page_ttl: i64,
    pub email_verification_ttl: i64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_address: String,
    pub from_name: String,
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FrontendConfig {
    pub base_url: String,
    pub language: String,
    pub password_reset_ttl_seconds: i64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    pub region: String,
    pub key_prefix: String,
    pub public_base_url: Option<String>,
    pub presign_ttl_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct QrCodeConfig {
    pub batch_concurrency: usize,
    pub max_batch_size: u32,
    pub module_scale: u32,
    pub margin_modules: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/pet_tag_db".to_string(),
            max_connections: 16,
            min_connections: 4,
            acquire_timeout: 5,
            run_migrations: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            address: "0.0.0.0".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["https://deinetierfamilie.com".to_string()],
            allow_credentials: true,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_API_BASE_PATH.to_string(),
            additional_base_paths: Vec::new(),
            enable_swagger: true,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            read_limit: 300,
            mutation_limit: 60,
            auth_limit: 10,
            window_seconds: 60,
            cleanup_interval_seconds: 300,
            require_client_ip: false,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "auth_token".to_string(),
            qr_page_cookie_name: "qr_page_token".to_string(),
            cookie_secure: true,
        }
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: DEFAULT_JWT_SECRET.to_string(),
            code_challenge_ttl: 60,
            temp_session_ttl: 15 * 60,
            session_ttl: 30 * 24 * 60 * 60,
            qr_page_ttl: 10,
            email_verification_ttl: 24 * 60 * 60,
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: "localhost".to_string(),
            smtp_port: 587,
            smtp_username: String::new(),
            smtp_password: String::new(),
            from_address: "noreply@identqr.de".to_string(),
            from_name: "Haustier-Service-Support".to_string(),
            enabled: false,
        }
    }
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            base_url: "https://deinetierfamilie.com".to_string(),
            language: "de".to_string(),
            password_reset_ttl_seconds: 3600,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: "pet-tag-uploads".to_string(),
            region: "eu-central-1".to_string(),
            key_prefix: "uploads/qr-codes/".to_string(),
            public_base_url: None,
            presign_ttl_seconds: 3600,
        }
    }
}

impl Default for QrCodeConfig {
    fn default() -> Self {
        Self {
            batch_concurrency: 10,
            max_batch_size: 1000,
            module_scale: 10,
            margin_modules: 1,
        }
    }
}

impl FrontendConfig {
    pub fn trimmed_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Public page a scanned pet tag opens.
    pub fn pet_page_url(&self, qr_id: &uuid::Uuid) -> String {
        format!("{}/{}/pet?id={}", self.trimmed_base_url(), self.language, qr_id)
    }

    pub fn email_verification_url(&self, token: &str) -> String {
        format!("{}/auth/verify-email?token={}", self.trimmed_base_url(), urlencoding::encode(token))
    }

    pub fn password_reset_url(&self, token: &str) -> String {
        format!("{}/auth/reset-password?oobCode={}", self.trimmed_base_url(), urlencoding::encode(token))
    }
}

impl StorageConfig {
    /// Externally addressable URL of an uploaded object.
    pub fn object_url(&self, key: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), key),
            None => format!("https://{}.s3.{}.amazonaws.com/{}", self.bucket, self.region, key),
        }
    }

    pub fn qr_image_key(&self, qr_id: &uuid::Uuid, extension: &str) -> String {
        format!("{}{}.{}", self.key_prefix, qr_id, extension)
    }
}

impl Config {
    /// Load configuration from multiple sources in priority order:
    /// 1. PetTag.toml (base configuration file)
    /// 2. Environment variables (prefixed with PETTAG_)
    /// 3. DATABASE_URL and JWT_SECRET environment variables
    pub fn load() -> Result<Self, figment::Error> {
        let defaults = toml::to_string(&Config::default()).map_err(|e| figment::Error::from(e.to_string()))?;

        let figment = Figment::new()
            .merge(Toml::string(&defaults).nested())
            .merge(Toml::file("PetTag.toml").nested())
            .merge(Env::prefixed("PETTAG_").split("__"))
            .merge(Env::raw().only(&["DATABASE_URL"]).map(|_| "database.url".into()))
            .merge(Env::raw().only(&["JWT_SECRET"]).map(|_| "jwt.secret".into()));

        figment.extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn default_token_lifetimes() {
        let jwt = JwtConfig::default();
        assert_eq!(jwt.code_challenge_ttl, 60);
        assert_eq!(jwt.temp_session_ttl, 900);
        assert_eq!(jwt.session_ttl, 2_592_000);
        assert_eq!(jwt.qr_page_ttl, 10);
        assert_eq!(jwt.email_verification_ttl, 86_400);
    }

    #[test]
    fn pet_page_url_includes_language_and_id() {
        let frontend = FrontendConfig {
            base_url: "https://example.com/".to_string(),
            ..FrontendConfig::default()
        };
        let id = Uuid::new_v4();
        assert_eq!(frontend.pet_page_url(&id), format!("https://example.com/de/pet?id={}", id));
    }

    #[test]
    fn object_url_defaults_to_bucket_host() {
        let storage = StorageConfig::default();
        let id = Uuid::new_v4();
        let key = storage.qr_image_key(&id, "png");
        assert_eq!(key, format!("uploads/qr-codes/{}.png", id));
        assert_eq!(
            storage.object_url(&key),
            format!("https://pet-tag-uploads.s3.eu-central-1.amazonaws.com/uploads/qr-codes/{}.png", id)
        );
    }

    #[test]
    fn object_url_uses_public_base_when_set() {
        let storage = StorageConfig {
            public_base_url: Some("https://cdn.example.com/".to_string()),
            ..StorageConfig::default()
        };
        assert_eq!(storage.object_url("a/b.png"), "https://cdn.example.com/a/b.png");
    }

    #[test]
    fn reset_url_encodes_token() {
        let frontend = FrontendConfig::default();
        assert_eq!(
            frontend.password_reset_url("abc def"),
            "https://deinetierfamilie.com/auth/reset-password?oobCode=abc%20def"
        );
    }
}
