//! Password hashing and private-key sealing
//!
//! Passwords are stored as PBKDF2-SHA256 PHC strings. Private keys are
//! sealed with ChaCha20-Poly1305 under a key derived from the account
//! password, so a wrong password fails authentication instead of yielding
//! garbage.
//!
//! Sealed format: base64 of `salt(16) || nonce(12) || ciphertext+tag`

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, Key, KeyInit as _, Nonce};
use pbkdf2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Params, Pbkdf2,
};
use sha2::Sha256;

use crate::types::{Result, TradingError};

pub const PBKDF2_ITERATIONS: u32 = 100_000;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
/// Poly1305 tag appended by the cipher
const TAG_LEN: usize = 16;

// ============================================================================
// Passwords
// ============================================================================

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::encode_b64(&rand::random::<[u8; SALT_LEN]>())
        .map_err(|e| TradingError::Keystore(format!("Failed to encode salt: {}", e)))?;
    let params = Params {
        rounds: PBKDF2_ITERATIONS,
        output_length: KEY_LEN,
    };

    let hash = Pbkdf2
        .hash_password_customized(password.as_bytes(), None, None, params, &salt)
        .map_err(|e| TradingError::Keystore(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

/// Check a password against a stored hash. Malformed hashes never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Pbkdf2.verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

// ============================================================================
// Sealing
// ============================================================================

fn cipher(password: &str, salt: &[u8]) -> ChaCha20Poly1305 {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
    ChaCha20Poly1305::new(Key::from_slice(&key))
}

/// Encrypt and authenticate `secret` under `password`
pub fn seal(secret: &[u8], password: &str) -> Result<String> {
    let salt: [u8; SALT_LEN] = rand::random();
    let nonce: [u8; NONCE_LEN] = rand::random();

    let mut ciphertext = cipher(password, &salt)
        .encrypt(Nonce::from_slice(&nonce), secret)
        .map_err(|e| TradingError::Keystore(format!("Failed to seal key: {}", e)))?;

    let mut blob = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&salt);
    blob.extend_from_slice(&nonce);
    blob.append(&mut ciphertext);
    Ok(STANDARD.encode(blob))
}

/// Reverse [`seal`]. A wrong password fails with `InvalidCredentials`.
pub fn open(sealed: &str, password: &str) -> Result<Vec<u8>> {
    let blob = STANDARD
        .decode(sealed)
        .map_err(|e| TradingError::Keystore(format!("Sealed key is not valid base64: {}", e)))?;
    if blob.len() < SALT_LEN + NONCE_LEN + TAG_LEN {
        return Err(TradingError::Keystore("Sealed key is truncated".to_string()));
    }

    let (salt, rest) = blob.split_at(SALT_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    cipher(password, salt)
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| TradingError::InvalidCredentials)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_verifies() {
        let stored = hash_password("hunter22").unwrap();
        assert!(stored.starts_with("$pbkdf2-sha256$i=100000,l=32$"));
        assert!(verify_password("hunter22", &stored));
        assert!(!verify_password("hunter23", &stored));
        assert!(!verify_password("hunter22", "not-a-hash"));
    }

    #[test]
    fn test_hashes_are_salted() {
        assert_ne!(hash_password("same").unwrap(), hash_password("same").unwrap());
    }

    #[test]
    fn test_seal_and_open() {
        let secret = b"0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
        let sealed = seal(secret, "correct horse").unwrap();

        let blob = STANDARD.decode(&sealed).unwrap();
        assert_eq!(blob.len(), SALT_LEN + NONCE_LEN + secret.len() + TAG_LEN);
        assert!(!sealed.contains("ac0974"));

        assert_eq!(open(&sealed, "correct horse").unwrap(), secret.to_vec());
        assert!(matches!(open(&sealed, "wrong horse"), Err(TradingError::InvalidCredentials)));
    }

    #[test]
    fn test_sealing_is_randomized() {
        assert_ne!(seal(b"secret", "pw").unwrap(), seal(b"secret", "pw").unwrap());
    }

    #[test]
    fn test_open_rejects_tampering() {
        let sealed = seal(b"secret", "pw").unwrap();
        let mut blob = STANDARD.decode(&sealed).unwrap();
        blob[SALT_LEN + NONCE_LEN] ^= 1;
        let tampered = STANDARD.encode(blob);

        assert!(matches!(open(&tampered, "pw"), Err(TradingError::InvalidCredentials)));
        assert!(matches!(open("AAAA", "pw"), Err(TradingError::Keystore(_))));
    }
}
