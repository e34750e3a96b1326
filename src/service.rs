pub mod auth;
pub mod batch;
pub mod challenge;
pub mod codes;
pub mod email;
pub mod qr_code;
pub mod qr_image;
pub mod search;
pub mod storage;
pub mod token;
