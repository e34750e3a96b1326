pub mod auth;
pub mod dashboard;
pub mod error;
pub mod health;
pub mod profile;
pub mod qr_code;
