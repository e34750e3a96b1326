use crate::models::user::UserResponse;
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;

/// Result of a successful password check: a code was mailed, no session exists yet.
#[derive(Debug, Serialize, JsonSchema)]
pub struct LoginChallengeResponse {
    pub success: bool,
    pub message: String,
    pub code_challenge_token: String,
    pub temp_session_token: String,
    pub user: UserResponse,
    pub code_sent: bool,
}

/// The one-time code as typed by the user. Clients send it either as text or as a number.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum SubmittedCode {
    Text(String),
    Number(u64),
}

impl SubmittedCode {
    pub fn normalized(&self) -> String {
        match self {
            SubmittedCode::Text(text) => text.trim().to_string(),
            SubmittedCode::Number(number) => number.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct VerifyCodeRequest {
    pub code_challenge_token: String,
    pub temp_session_token: String,
    pub code: SubmittedCode,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ResendCodeRequest {
    pub temp_session_token: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ResendCodeResponse {
    pub success: bool,
    pub message: String,
    pub code_challenge_token: String,
    pub code_sent: bool,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct SessionResponse {
    pub success: bool,
    pub message: String,
    pub token: String,
    pub user: UserResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_accepts_string_and_number() {
        let text: VerifyCodeRequest = serde_json::from_str(r#"{"code_challenge_token":"a","temp_session_token":"b","code":" 123456 "}"#).unwrap();
        assert_eq!(text.code.normalized(), "123456");

        let number: VerifyCodeRequest = serde_json::from_str(r#"{"code_challenge_token":"a","temp_session_token":"b","code":654321}"#).unwrap();
        assert_eq!(number.code.normalized(), "654321");
    }
}
