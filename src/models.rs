pub mod dashboard;
pub mod health;
pub mod pagination;
pub mod password_reset;
pub mod profile;
pub mod qr_code;
pub mod two_factor;
pub mod user;
