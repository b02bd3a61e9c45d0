//! Salted one-way password hashing.
//!
//! Encoding is `hex(salt) + ":" + hex(digest)` with a fresh 16-byte salt
//! per call and a 256-bit BLAKE3 digest of `salt || password`.

use rand::RngCore;
use subtle::ConstantTimeEq;

/// Salt length in bytes.
const SALT_LEN: usize = 16;
/// Digest length in bytes.
const DIGEST_LEN: usize = 32;

/// Hash a password with a freshly generated random salt.
///
/// Two calls with the same password produce different encodings.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);

    let digest = digest(&salt, password);
    format!("{}:{}", hex::encode(salt), hex::encode(digest))
}

/// Verify a candidate password against a stored encoding.
///
/// Fails closed: any malformed encoding (missing separator, wrong hex
/// lengths, non-hex characters) returns `false` rather than erroring.
pub fn verify_password(password: &str, encoded: &str) -> bool {
    let Some((salt_hex, digest_hex)) = encoded.split_once(':') else {
        return false;
    };
    if salt_hex.len() != SALT_LEN * 2 || digest_hex.len() != DIGEST_LEN * 2 {
        return false;
    }

    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    let Ok(stored) = hex::decode(digest_hex) else {
        return false;
    };

    let computed = digest(&salt, password);
    computed.ct_eq(stored.as_slice()).into()
}

fn digest(salt: &[u8], password: &str) -> [u8; DIGEST_LEN] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    *hasher.finalize().as_bytes()
}
