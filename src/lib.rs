mod auth;
mod config;
mod database;
mod db;
mod error;
mod middleware;
mod models;
mod routes;
mod service;

#[cfg(test)]
pub mod test_utils;

pub use config::Config;

use crate::db::stage_db;
use crate::middleware::RequestLogger;
use crate::middleware::rate_limit::RateLimiter;
use crate::routes as app_routes;
use crate::service::challenge::ChallengeLedger;
use crate::service::email::{EmailService, Mailer};
use crate::service::storage::stage_storage;
use crate::service::token::TokenService;
use rocket::fairing::AdHoc;
use rocket::{Build, Rocket, http::Method};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_okapi::swagger_ui::{SwaggerUIConfig, make_swagger_ui};
use rocket_okapi::{get_openapi_route, okapi::merge::marge_spec_list};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn init_tracing(log_level: &str, json_format: bool) {
    // Configure logging with environment variable support
    // RUST_LOG environment variable can be used for fine-grained control per module:
    // Examples:
    //   RUST_LOG=debug                       - Set all to debug
    //   RUST_LOG=pet_tag::service=debug      - Token and batch internals
    //   RUST_LOG=info,pet_tag::routes=trace  - Global info, routes at trace
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_line_number(true);

    if json_format {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Outside the debug profile the signing secret must be set explicitly.
fn ensure_production_secrets(jwt: &config::JwtConfig) {
    let profile = std::env::var("ROCKET_PROFILE").unwrap_or_else(|_| "debug".to_string());
    if profile == "debug" {
        return;
    }

    if std::env::var("ROCKET_SECRET_KEY").is_err() {
        panic!(
            "ROCKET_SECRET_KEY is required for profile '{}'. Generate one with: openssl rand -base64 32",
            profile
        );
    }

    if jwt.secret == config::DEFAULT_JWT_SECRET || jwt.secret.trim().is_empty() {
        panic!("JWT_SECRET must be set for profile '{}'", profile);
    }
}

fn build_cors(cors_config: &config::CorsConfig) -> CorsOptions {
    let is_wildcard = cors_config.allowed_origins.len() == 1 && cors_config.allowed_origins[0] == "*";

    // Validate that wildcard origins are not combined with credentials
    if is_wildcard && cors_config.allow_credentials {
        panic!(
            "Invalid CORS configuration: Cannot use wildcard origins (*) with credentials enabled. \
            Either set specific origins or disable credentials."
        );
    }

    let allowed_origins = if cors_config.allowed_origins.is_empty() {
        AllowedOrigins::some_exact::<&str>(&[])
    } else if is_wildcard {
        AllowedOrigins::all()
    } else {
        AllowedOrigins::some_exact(&cors_config.allowed_origins.iter().map(String::as_str).collect::<Vec<_>>())
    };

    CorsOptions {
        allowed_origins,
        allowed_methods: vec![
            Method::Get,
            Method::Post,
            Method::Put,
            Method::Delete,
            Method::Patch,
            Method::Options,
            Method::Head,
        ]
        .into_iter()
        .map(From::from)
        .collect(),
        allowed_headers: rocket_cors::AllowedHeaders::some(&["Content-Type", "Authorization", "Accept"]),
        allow_credentials: cors_config.allow_credentials,
        ..Default::default()
    }
}

fn get_swagger_config(openapi_url: &str) -> SwaggerUIConfig {
    SwaggerUIConfig {
        url: openapi_url.to_string(),
        ..Default::default()
    }
}

fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return config::DEFAULT_API_BASE_PATH.to_string();
    }

    let mut normalized = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    };

    while normalized.ends_with('/') && normalized.len() > 1 {
        normalized.pop();
    }

    normalized
}

fn join_base_path(base_path: &str, path: &str) -> String {
    let base = base_path.trim_end_matches('/');
    let suffix = path.trim_start_matches('/');

    if base.is_empty() {
        format!("/{}", suffix)
    } else {
        format!("{}/{}", base, suffix)
    }
}

fn collect_base_paths(api_config: &config::ApiConfig) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::new();
    let mut push_unique = |path: String| {
        if !normalized.contains(&path) {
            normalized.push(path);
        }
    };

    push_unique(normalize_base_path(&api_config.base_path));

    for extra in &api_config.additional_base_paths {
        let normalized_extra = normalize_base_path(extra);
        if !normalized_extra.is_empty() {
            push_unique(normalized_extra);
        }
    }

    normalized
}

struct RouteSpec {
    path: &'static str,
    routes: Vec<rocket::Route>,
    openapi: rocket_okapi::okapi::openapi3::OpenApi,
}

fn collect_route_specs() -> Vec<RouteSpec> {
    let (auth_routes, auth_openapi) = app_routes::auth::routes();
    let (profile_routes, profile_openapi) = app_routes::profile::routes();
    let (qr_code_routes, qr_code_openapi) = app_routes::qr_code::routes();
    let (dashboard_routes, dashboard_openapi) = app_routes::dashboard::routes();
    let (health_routes, health_openapi) = app_routes::health::routes();

    vec![
        RouteSpec {
            path: "/auth",
            routes: auth_routes,
            openapi: auth_openapi,
        },
        RouteSpec {
            path: "/profile",
            routes: profile_routes,
            openapi: profile_openapi,
        },
        RouteSpec {
            path: "/qrcode",
            routes: qr_code_routes,
            openapi: qr_code_openapi,
        },
        RouteSpec {
            path: "/dashboard",
            routes: dashboard_routes,
            openapi: dashboard_openapi,
        },
        RouteSpec {
            path: "/health",
            routes: health_routes,
            openapi: health_openapi,
        },
    ]
}

fn mount_api_routes(mut rocket: Rocket<Build>, base_path: &str, enable_swagger: bool) -> Rocket<Build> {
    let route_specs = collect_route_specs();

    if enable_swagger {
        let mut openapi_list = Vec::new();
        for spec in route_specs {
            rocket = rocket.mount(format!("{}{}", base_path, spec.path), spec.routes);
            openapi_list.push((spec.path, spec.openapi));
        }

        let openapi_docs = match marge_spec_list(&openapi_list) {
            Ok(docs) => docs,
            Err(err) => panic!("Could not merge OpenAPI spec: {}", err),
        };

        let settings = rocket_okapi::settings::OpenApiSettings::default();
        rocket = rocket.mount(base_path, vec![get_openapi_route(openapi_docs, &settings)]);

        let docs_path = join_base_path(base_path, "docs");
        let openapi_url = join_base_path(base_path, "openapi.json");
        rocket = rocket.mount(docs_path, make_swagger_ui(&get_swagger_config(&openapi_url)));
    } else {
        for spec in route_specs {
            rocket = rocket.mount(format!("{}{}", base_path, spec.path), spec.routes);
        }
    }

    rocket.register(base_path, app_routes::error::catchers())
}

/// Rocket's own settings with the listen address taken from `server`.
fn rocket_figment(server: &config::ServerConfig) -> rocket::figment::Figment {
    rocket::Config::figment()
        .merge(("port", server.port))
        .merge(("address", server.address.as_str()))
}

fn stage_rate_limiter(rate_limit_config: config::RateLimitConfig) -> AdHoc {
    AdHoc::on_ignite("Rate Limiter", move |rocket| {
        let limiter = Arc::new(RateLimiter::new(rate_limit_config.clone()));
        limiter.clone().spawn_cleanup_task();

        Box::pin(async move { rocket.manage(limiter) })
    })
}

/// Consumed login challenges are remembered until their tokens expire.
fn stage_challenge_ledger(code_challenge_ttl: i64) -> AdHoc {
    AdHoc::on_ignite("Challenge Ledger", move |rocket| {
        let ledger = Arc::new(ChallengeLedger::new());
        let interval = Duration::from_secs(code_challenge_ttl.max(1) as u64);
        ledger.clone().spawn_cleanup_task(interval);

        Box::pin(async move { rocket.manage(ledger) })
    })
}

/// Routes, catchers and the in-process services every handler relies on. Database, storage
/// and mail are attached separately so tests can substitute them.
pub(crate) fn mount_application(rocket: Rocket<Build>, config: &Config) -> Rocket<Build> {
    let base_paths = collect_base_paths(&config.api);
    let enable_swagger = config.api.enable_swagger;

    let mut rocket = rocket
        .manage(config.clone())
        .manage(TokenService::new(&config.jwt))
        .attach(stage_challenge_ledger(config.jwt.code_challenge_ttl));

    for base_path in &base_paths {
        rocket = mount_api_routes(rocket, base_path, enable_swagger);
    }

    rocket
}

pub fn build_rocket(config: Config) -> Rocket<Build> {
    init_tracing(&config.logging.level, config.logging.json_format);
    ensure_production_secrets(&config.jwt);

    let cors = match build_cors(&config.cors).to_cors() {
        Ok(cors) => cors,
        Err(err) => panic!("Failed to create CORS fairing: {}", err),
    };

    if !config.email.enabled {
        tracing::warn!("email delivery disabled; verification and login codes will not be sent");
    }
    let mailer: Arc<dyn Mailer> = Arc::new(EmailService::new(config.email.clone()));

    tracing::info!(address = %config.server.address, port = config.server.port, "binding server");
    let rocket = rocket::custom(rocket_figment(&config.server))
        .attach(stage_rate_limiter(config.rate_limit.clone()))
        .attach(cors)
        .attach(RequestLogger)
        .attach(stage_db(config.database.clone()))
        .attach(stage_storage(config.storage.clone()))
        .manage(mailer);

    mount_application(rocket, &config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_paths_are_normalized_and_deduplicated() {
        let api = config::ApiConfig {
            base_path: "api/".to_string(),
            additional_base_paths: vec!["/api".to_string(), "/v1//".to_string()],
            enable_swagger: false,
        };
        assert_eq!(collect_base_paths(&api), vec!["/api".to_string(), "/v1".to_string()]);
    }

    #[test]
    fn empty_base_path_falls_back_to_default() {
        assert_eq!(normalize_base_path("  "), config::DEFAULT_API_BASE_PATH);
    }

    #[test]
    fn docs_path_is_joined_without_double_slashes() {
        assert_eq!(join_base_path("/api/", "/docs"), "/api/docs");
        assert_eq!(join_base_path("", "openapi.json"), "/openapi.json");
    }

    #[test]
    #[should_panic(expected = "wildcard origins")]
    fn wildcard_origins_with_credentials_are_rejected() {
        build_cors(&config::CorsConfig {
            allowed_origins: vec!["*".to_string()],
            allow_credentials: true,
        });
    }

    #[test]
    fn server_settings_reach_rocket() {
        let server = config::ServerConfig {
            port: 8081,
            address: "127.0.0.1".to_string(),
        };
        let rocket_config: rocket::Config = rocket_figment(&server).extract().unwrap();
        assert_eq!(rocket_config.port, 8081);
        assert_eq!(rocket_config.address, std::net::IpAddr::from([127, 0, 0, 1]));
    }

    #[test]
    fn every_api_area_is_mounted() {
        let paths: Vec<&str> = collect_route_specs().iter().map(|spec| spec.path).collect();
        assert_eq!(paths, vec!["/auth", "/profile", "/qrcode", "/dashboard", "/health"]);
    }
}
