//! Password hashing and verification using Argon2id.
//!
//! Stored format: `<base64url(salt)>:<base64url(derived key)>`, both
//! unpadded. Parameters are fixed, so a stored hash carries everything
//! verification needs.

use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use subtle::ConstantTimeEq;

use crate::error::AuthError;

const TIME_COST: u32 = 3;
const MEMORY_COST_KIB: u32 = 64 * 1024;
const PARALLELISM: u32 = 2;
const OUTPUT_LEN: usize = 32;
const SALT_LEN: usize = 16;
const DELIMITER: char = ':';

/// Well-formed hash that no password derives to. Verifying against it
/// costs one full derivation, so a lookup miss takes as long as a
/// wrong password.
pub const DECOY_HASH: &str =
    "AAAAAAAAAAAAAAAAAAAAAA:AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// Stateless password hasher.
///
/// If a pepper is configured it is prepended to the password before
/// derivation; it must match between hashing and verification.
#[derive(Clone, Default)]
pub struct CredentialHasher {
    pepper: Option<String>,
}

impl CredentialHasher {
    pub fn new(pepper: Option<String>) -> Self {
        Self { pepper }
    }

    /// Hash a password under a fresh random salt.
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        let mut rng = rand::rng();
        let salt: [u8; SALT_LEN] = rand::Rng::random(&mut rng);
        let key = self.derive(password, &salt)?;

        Ok(format!(
            "{}{DELIMITER}{}",
            URL_SAFE_NO_PAD.encode(salt),
            URL_SAFE_NO_PAD.encode(key)
        ))
    }

    /// Check a password against a stored hash.
    ///
    /// Any malformed or undecodable hash verifies as `false`.
    pub fn verify(&self, password: &str, encoded: &str) -> bool {
        let Some((salt_b64, key_b64)) = encoded.split_once(DELIMITER) else {
            return false;
        };
        if key_b64.contains(DELIMITER) {
            return false;
        }
        let (Ok(salt), Ok(stored)) = (
            URL_SAFE_NO_PAD.decode(salt_b64),
            URL_SAFE_NO_PAD.decode(key_b64),
        ) else {
            return false;
        };

        match self.derive(password, &salt) {
            Ok(derived) => derived.as_slice().ct_eq(stored.as_slice()).into(),
            Err(_) => false,
        }
    }

    fn derive(&self, password: &str, salt: &[u8]) -> Result<[u8; OUTPUT_LEN], AuthError> {
        let peppered: String;
        let input = match self.pepper.as_deref() {
            Some(p) => {
                peppered = format!("{p}{password}");
                peppered.as_bytes()
            }
            None => password.as_bytes(),
        };

        let params = Params::new(MEMORY_COST_KIB, TIME_COST, PARALLELISM, Some(OUTPUT_LEN))
            .map_err(|e| AuthError::Crypto(format!("argon2 params: {e}")))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut out = [0u8; OUTPUT_LEN];
        argon2
            .hash_password_into(input, salt, &mut out)
            .map_err(|e| AuthError::Crypto(format!("argon2 derive: {e}")))?;
        Ok(out)
    }
}
