//! Fixed-window request limiting per client address and, when a session is present, per account.

use crate::auth::session_user_id;
use crate::config::RateLimitConfig;
use rocket::http::{Method, Status};
use rocket::request::{FromRequest, Outcome, Request};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{RefOr, Response as OpenApiResponse, Responses};
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Bucket {
    Read,
    Mutation,
    /// Credential and code checks; far tighter than the other two.
    Auth,
}

impl Bucket {
    fn for_method(method: Method) -> Self {
        match method {
            Method::Get | Method::Head | Method::Options => Bucket::Read,
            _ => Bucket::Mutation,
        }
    }

    fn limit(self, config: &RateLimitConfig) -> u32 {
        match self {
            Bucket::Read => config.read_limit,
            Bucket::Mutation => config.mutation_limit,
            Bucket::Auth => config.auth_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ClientKey {
    Address(IpAddr),
    Account(Uuid),
    /// Shared key for requests without a resolvable peer address.
    Unknown,
}

#[derive(Debug, Clone, Copy)]
struct FixedWindow {
    opened_at: Instant,
    hits: u32,
}

impl FixedWindow {
    fn is_stale(&self, now: Instant, length: Duration) -> bool {
        now.duration_since(self.opened_at) >= length
    }

    fn remaining(&self, now: Instant, length: Duration) -> Duration {
        length.saturating_sub(now.duration_since(self.opened_at))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Admitted,
    Rejected { retry_after: Duration },
}

#[derive(Debug)]
pub(crate) struct RateLimiter {
    config: RateLimitConfig,
    window: Duration,
    windows: Mutex<HashMap<(ClientKey, Bucket), FixedWindow>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            window: Duration::from_secs(config.window_seconds.max(1)),
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn spawn_cleanup_task(self: Arc<Self>) {
        let period = Duration::from_secs(self.config.cleanup_interval_seconds.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let removed = self.purge_stale().await;
                if removed > 0 {
                    tracing::debug!(removed, "expired rate limit windows dropped");
                }
            }
        });
    }

    async fn purge_stale(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, window| !window.is_stale(now, self.window));
        before - windows.len()
    }

    /// A request is admitted only if every key it maps to still has room; a rejected
    /// request consumes nothing.
    async fn admit(&self, keys: &[ClientKey], bucket: Bucket) -> Admission {
        let limit = bucket.limit(&self.config);
        let now = Instant::now();
        let mut windows = self.windows.lock().await;

        let mut retry_after: Option<Duration> = None;
        for key in keys {
            let window = windows.entry((key.clone(), bucket)).or_insert(FixedWindow { opened_at: now, hits: 0 });
            if window.is_stale(now, self.window) {
                *window = FixedWindow { opened_at: now, hits: 0 };
            }
            if window.hits >= limit {
                let wait = window.remaining(now, self.window);
                retry_after = Some(retry_after.map_or(wait, |longest| longest.max(wait)));
            }
        }

        if let Some(retry_after) = retry_after {
            return Admission::Rejected { retry_after };
        }

        for key in keys {
            if let Some(window) = windows.get_mut(&(key.clone(), bucket)) {
                window.hits += 1;
            }
        }
        Admission::Admitted
    }
}

/// Read or mutation budget, chosen by request method.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RateLimit;

/// Budget for endpoints that check passwords or one-time codes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AuthRateLimit;

/// Seconds until the client may retry; read back by the 429 catcher.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RateLimitRetryAfter(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RateLimitError {
    TooManyRequests,
    MissingClientIp,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RateLimit {
    type Error = RateLimitError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        enforce(request, Bucket::for_method(request.method())).await.map(|_| RateLimit)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthRateLimit {
    type Error = RateLimitError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        enforce(request, Bucket::Auth).await.map(|_| AuthRateLimit)
    }
}

impl<'a> OpenApiFromRequest<'a> for RateLimit {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        Ok(too_many_requests_responses())
    }
}

impl<'a> OpenApiFromRequest<'a> for AuthRateLimit {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        Ok(too_many_requests_responses())
    }
}

fn client_keys(request: &Request<'_>) -> Vec<ClientKey> {
    let mut keys = Vec::with_capacity(2);
    if let Some(ip) = request.client_ip() {
        keys.push(ClientKey::Address(ip));
    }
    if let Some(user_id) = session_user_id(request) {
        keys.push(ClientKey::Account(user_id));
    }
    keys
}

async fn enforce(request: &Request<'_>, bucket: Bucket) -> Outcome<(), RateLimitError> {
    // Without a managed limiter (unit-test rockets) nothing is limited.
    let Some(limiter) = request.rocket().state::<Arc<RateLimiter>>() else {
        return Outcome::Success(());
    };

    let request_id = request
        .local_cache(|| None::<crate::middleware::RequestId>)
        .as_ref()
        .map(|r| r.0.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let mut keys = client_keys(request);
    if request.client_ip().is_none() {
        if limiter.config.require_client_ip {
            warn!(request_id = %request_id, uri = %request.uri(), "rejecting request without client ip");
            return Outcome::Error((Status::BadRequest, RateLimitError::MissingClientIp));
        }
        if keys.is_empty() {
            keys.push(ClientKey::Unknown);
        }
    }

    match limiter.admit(&keys, bucket).await {
        Admission::Admitted => Outcome::Success(()),
        Admission::Rejected { retry_after } => {
            let seconds = retry_after.as_secs().max(1);
            request.local_cache(|| Some(RateLimitRetryAfter(seconds)));
            warn!(
                request_id = %request_id,
                method = %request.method(),
                uri = %request.uri(),
                bucket = ?bucket,
                retry_after_secs = seconds,
                "rate limit exceeded"
            );
            Outcome::Error((Status::TooManyRequests, RateLimitError::TooManyRequests))
        }
    }
}

fn too_many_requests_responses() -> Responses {
    let mut responses = Responses::default();
    responses.responses.insert(
        "429".to_string(),
        RefOr::Object(OpenApiResponse {
            description: "Too Many Requests".to_string(),
            ..Default::default()
        }),
    );
    responses
}
