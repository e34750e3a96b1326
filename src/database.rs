pub mod dashboard;
pub mod postgres_repository;
pub mod profile;
pub mod qr_code;
pub mod user;
