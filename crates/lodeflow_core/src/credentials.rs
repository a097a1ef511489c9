//! Deterministic per-user database password derivation.
//!
//! The derived password is never stored: it is recomputed from the user's
//! base secret and id whenever a connection is opened. Rotating the base
//! secret rotates every derived password with no migration step.

use crate::error::CredentialError;
use lodeflow_catalog::UserId;
use sha2::{Digest, Sha256};

/// Offset and width of the slice taken from the base secret.
const SECRET_SLICE: (usize, usize) = (2, 3);
/// Offset and width of the slice taken from the hex digest.
const DIGEST_SLICE: (usize, usize) = (4, 5);

/// Derive the database password for one user.
///
/// Pure and deterministic: same secret and id always produce the same
/// output. The result combines a slice of the base secret with a slice of
/// `hex(sha256(user_id || base_secret))`, so the base secret alone is not
/// enough to reconstruct the password without the scheme.
pub fn derive_db_password(
    base_secret: &str,
    user_id: UserId,
) -> Result<String, CredentialError> {
    if base_secret.is_empty() {
        return Err(CredentialError::EmptySecret);
    }
    let secret_chars: Vec<char> = base_secret.chars().collect();
    let (secret_off, secret_len) = SECRET_SLICE;
    if secret_chars.len() < secret_off + secret_len {
        return Err(CredentialError::SecretTooShort(secret_chars.len()));
    }

    let mut hasher = Sha256::new();
    hasher.update(user_id.to_string().as_bytes());
    hasher.update(base_secret.as_bytes());
    let digest = hex::encode(hasher.finalize());

    let (digest_off, digest_len) = DIGEST_SLICE;
    let mut password: String = secret_chars[secret_off..secret_off + secret_len]
        .iter()
        .collect();
    password.push_str(&digest[digest_off..digest_off + digest_len]);

    Ok(password)
}
