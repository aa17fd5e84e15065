// src/core/crypto/secrets.rs
use std::num::NonZeroU32;

use ring::{constant_time, pbkdf2, rand::{SecureRandom, SystemRandom}};
use sha3::{Digest, Sha3_256};

use crate::utils::error::{AuthError, Result};

const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;
const HASH_SCHEME: &str = "pbkdf2_sha256";

pub fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let mut bytes = vec![0u8; len];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| AuthError::Crypto("system randomness unavailable".into()))?;
    Ok(bytes)
}

/// A fresh code of the form `XXXX-XXXX` (upper-case hex).
pub fn generate_backup_code() -> Result<String> {
    let digits = hex::encode_upper(random_bytes(4)?);
    Ok(format!("{}-{}", &digits[..4], &digits[4..]))
}

pub fn normalize_backup_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Salted PBKDF2-HMAC-SHA256 hash of the normalized code, encoded as
/// `pbkdf2_sha256$<iterations>$<salt hex>$<hash hex>`.
pub fn hash_backup_code(code: &str, iterations: u32) -> Result<String> {
    let rounds = NonZeroU32::new(iterations)
        .ok_or_else(|| AuthError::Crypto("iteration count must be non-zero".into()))?;
    let salt = random_bytes(SALT_LEN)?;

    let mut hash = [0u8; HASH_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        rounds,
        &salt,
        normalize_backup_code(code).as_bytes(),
        &mut hash,
    );

    Ok(format!("{HASH_SCHEME}${iterations}${}${}", hex::encode(salt), hex::encode(hash)))
}

/// Malformed stored hashes never verify.
pub fn verify_backup_code(stored: &str, candidate: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(HASH_SCHEME), Some(iterations), Some(salt), Some(hash), None) =
        (parts.next(), parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };

    let Some(rounds) = iterations.parse().ok().and_then(NonZeroU32::new) else {
        return false;
    };
    let (Ok(salt), Ok(hash)) = (hex::decode(salt), hex::decode(hash)) else {
        return false;
    };

    pbkdf2::verify(
        pbkdf2::PBKDF2_HMAC_SHA256,
        rounds,
        &salt,
        normalize_backup_code(candidate).as_bytes(),
        &hash,
    )
    .is_ok()
}

/// Hex SHA3-256 digest of the keystroke passphrase.
pub fn passphrase_digest(passphrase: &str) -> String {
    hex::encode(Sha3_256::digest(passphrase.as_bytes()))
}

/// Exact, case-sensitive comparison performed on digests in constant time.
pub fn passphrase_matches(stored_digest: &str, candidate: &str) -> bool {
    constant_time::verify_slices_are_equal(
        stored_digest.as_bytes(),
        passphrase_digest(candidate).as_bytes(),
    )
    .is_ok()
}
