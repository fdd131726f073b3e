use rand::Rng;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

// Get current timestamp in milliseconds
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

// Random string over a fixed alphabet
fn random_string<R: Rng + ?Sized>(rng: &mut R, alphabet: &[u8], len: usize) -> String {
    (0..len)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

/// Uppercase alphanumeric lobby code.
pub fn generate_code<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    random_string(rng, CODE_ALPHABET, len)
}

/// Opaque player identifier for clients that did not bring their own.
pub fn generate_player_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    random_string(rng, ID_ALPHABET, 21)
}

/// Lobby codes are case-insensitive and stored uppercase.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
