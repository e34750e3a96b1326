use crate::error::app_error::AppError;
use rocket::serde::{Deserialize, Serialize};

/// Half-open `[start_index, end_index)` slice of an ordered listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct RecordWindow {
    pub start_index: i64,
    pub end_index: i64,
}

impl RecordWindow {
    /// Largest number of rows a single request may ask for.
    pub const MAX_WINDOW: i64 = 200;

    pub fn from_query(start_index: Option<i64>, end_index: Option<i64>) -> Result<Self, AppError> {
        let (Some(start_index), Some(end_index)) = (start_index, end_index) else {
            return Err(AppError::BadRequest("start_index und end_index sind erforderlich".to_string()));
        };

        if start_index < 0 || end_index <= start_index {
            return Err(AppError::BadRequest("end_index muss größer als start_index sein".to_string()));
        }

        if end_index - start_index > Self::MAX_WINDOW {
            return Err(AppError::BadRequest(format!("Es können höchstens {} Datensätze abgefragt werden", Self::MAX_WINDOW)));
        }

        Ok(Self { start_index, end_index })
    }

    pub fn offset(&self) -> i64 {
        self.start_index
    }

    pub fn limit(&self) -> i64 {
        self.end_index - self.start_index
    }
}
