use rand::RngExt;
use sha2::{Digest, Sha256};
use std::ops::RangeInclusive;

/// Range of every 6-digit code: login challenges and QR access passwords.
pub const SIX_DIGIT_RANGE: RangeInclusive<u32> = 100_000..=999_999;

const RESET_TOKEN_BYTES: usize = 20;

pub fn generate_six_digit_code() -> String {
    let mut rng = rand::rng();
    rng.random_range(SIX_DIGIT_RANGE).to_string()
}

/// Returns `(plain_token, sha256_hex)`; only the hash is persisted.
pub fn generate_reset_token() -> (String, String) {
    let mut rng = rand::rng();
    let token_bytes: [u8; RESET_TOKEN_BYTES] = std::array::from_fn(|_| rng.random::<u8>());
    let token = hex::encode(token_bytes);
    let token_hash = hash_reset_token(&token);

    (token, token_hash)
}

pub fn hash_reset_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
