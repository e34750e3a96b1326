use crate::error::app_error::{AppError, ErrorBody};
use crate::middleware::rate_limit::RateLimitRetryAfter;
use rocket::http::{ContentType, Header, Status};
use rocket::response::{self, Responder, Response};
use rocket::{Request, catch};
use std::io::Cursor;

/// JSON body for requests that never reached a handler (failed guards, unknown routes,
/// unparsable input), shaped like every other error response.
pub struct CatcherError {
    status: Status,
    body: ErrorBody,
    retry_after: Option<u64>,
}

impl CatcherError {
    fn new(status: Status, error: &'static str, message: &str) -> Self {
        Self {
            status,
            body: ErrorBody {
                success: false,
                message: message.to_string(),
                error,
            },
            retry_after: None,
        }
    }

    /// Guard failures keep the wording handlers would have produced.
    fn from_app_error(error: &AppError) -> Self {
        Self {
            status: Status::from(error),
            body: ErrorBody {
                success: false,
                message: error.user_message(),
                error: error.code(),
            },
            retry_after: None,
        }
    }
}

impl<'r> Responder<'r, 'static> for CatcherError {
    fn respond_to(self, _req: &'r Request<'_>) -> response::Result<'static> {
        let body = serde_json::to_string(&self.body).unwrap_or_else(|_| r#"{"success":false}"#.to_string());

        let mut response = Response::build();
        response.status(self.status).header(ContentType::JSON).sized_body(body.len(), Cursor::new(body));
        if let Some(seconds) = self.retry_after {
            response.header(Header::new("Retry-After", seconds.to_string()));
        }
        response.ok()
    }
}

#[catch(400)]
pub fn bad_request(_: &Request) -> CatcherError {
    CatcherError::new(Status::BadRequest, "bad_request", "Ungültige Anfrage")
}

#[catch(401)]
pub fn unauthorized(_: &Request) -> CatcherError {
    CatcherError::from_app_error(&AppError::Unauthorized)
}

#[catch(402)]
pub fn qr_page_token_required(_: &Request) -> CatcherError {
    CatcherError::from_app_error(&AppError::QrPageTokenRequired)
}

#[catch(403)]
pub fn forbidden(_: &Request) -> CatcherError {
    CatcherError::from_app_error(&AppError::Forbidden)
}

#[catch(404)]
pub fn not_found(_: &Request) -> CatcherError {
    CatcherError::new(Status::NotFound, "not_found", "Nicht gefunden")
}

#[catch(409)]
pub fn conflict(_: &Request) -> CatcherError {
    CatcherError::new(Status::Conflict, "conflict", "Konflikt")
}

#[catch(422)]
pub fn unprocessable_entity(_: &Request) -> CatcherError {
    CatcherError::new(Status::UnprocessableEntity, "validation_error", "Ungültige Eingabe")
}

#[catch(429)]
pub fn too_many_requests(req: &Request) -> CatcherError {
    let retry_after = req.local_cache(|| None::<RateLimitRetryAfter>).as_ref().map(|r| r.0);
    CatcherError {
        retry_after,
        ..CatcherError::new(
            Status::TooManyRequests,
            "too_many_requests",
            "Zu viele Anfragen. Bitte versuchen Sie es später erneut.",
        )
    }
}

#[catch(500)]
pub fn internal_error(_: &Request) -> CatcherError {
    CatcherError::new(Status::InternalServerError, "internal_error", "Interner Serverfehler")
}

pub fn catchers() -> Vec<rocket::Catcher> {
    rocket::catchers![
        bad_request,
        unauthorized,
        qr_page_token_required,
        forbidden,
        not_found,
        conflict,
        unprocessable_entity,
        too_many_requests,
        internal_error
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::local::asynchronous::Client;
    use rocket::{get, routes};
    use serde_json::Value;

    #[get("/status/<code>")]
    fn status(code: u16) -> Status {
        Status::from_code(code).unwrap_or(Status::Ok)
    }

    #[rocket::async_test]
    async fn every_catcher_answers_with_json() {
        let rocket = rocket::build().mount("/", routes![status]).register("/", catchers());
        let client = Client::tracked(rocket).await.unwrap();

        for code in [400, 401, 402, 403, 404, 409, 422, 429, 500] {
            let response = client.get(format!("/status/{}", code)).dispatch().await;
            assert_eq!(response.status().code, code);
            assert_eq!(response.content_type(), Some(ContentType::JSON));

            let body: Value = response.into_json().await.unwrap();
            assert_eq!(body["success"], false, "code {}", code);
            assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));
        }
    }

    #[rocket::async_test]
    async fn guard_statuses_match_handler_errors() {
        let client = Client::tracked(rocket::build().mount("/", routes![status]).register("/", catchers()))
            .await
            .unwrap();

        let body: Value = client.get("/status/402").dispatch().await.into_json().await.unwrap();
        assert_eq!(body["error"], AppError::QrPageTokenRequired.code());
        assert_eq!(body["message"], AppError::QrPageTokenRequired.user_message());
    }

    #[rocket::async_test]
    async fn unknown_route_is_json_not_found() {
        let client = Client::tracked(rocket::build().register("/", catchers())).await.unwrap();
        let response = client.get("/does-not-exist").dispatch().await;
        assert_eq!(response.status(), Status::NotFound);

        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["error"], "not_found");
    }

    #[rocket::async_test]
    async fn too_many_requests_omits_retry_after_without_limiter_state() {
        let client = Client::tracked(rocket::build().mount("/", routes![status]).register("/", catchers()))
            .await
            .unwrap();
        let response = client.get("/status/429").dispatch().await;
        assert!(response.headers().get_one("Retry-After").is_none());
    }
}
