//! Secret token helpers
//!
//! Session ids, magic-link tokens, password reset tokens and admin API keys
//! are random hex strings. Everything except session ids is persisted only
//! as an HMAC-SHA256 digest keyed with `auth.secret`.

use anyhow::{anyhow, Result};
use argon2::password_hash::rand_core::{OsRng, RngCore};
use data_encoding::HEXLOWER;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Random bytes used for session and magic-link tokens
pub const TOKEN_BYTES: usize = 32;

/// `bytes` random bytes from the OS RNG, hex encoded
pub fn generate_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buf);
    HEXLOWER.encode(&buf)
}

/// Hex HMAC-SHA256 of `token` keyed with `secret`
pub fn hash_token(secret: &str, token: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow!("Invalid HMAC key: {}", e))?;
    mac.update(token.as_bytes());
    Ok(HEXLOWER.encode(&mac.finalize().into_bytes()))
}

/// Compare two digests without short-circuiting on the first difference
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
