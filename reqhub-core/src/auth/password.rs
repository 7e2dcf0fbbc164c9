//! Argon2id password hashing

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::config::KdfConfig;
use crate::error::{Error, Result};

/// Minimum password length accepted on create and change
pub const MIN_PASSWORD_LEN: usize = 8;

/// Password hasher configured from [`KdfConfig`]
#[derive(Clone)]
pub struct Kdf {
    params: Params,
    /// Verified against when the user does not exist, so unknown and
    /// known usernames cost the same
    dummy_hash: String,
}

impl Kdf {
    pub fn new(config: &KdfConfig) -> Result<Self> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| Error::Internal(format!("invalid KDF parameters: {}", e)))?;
        let mut kdf = Self {
            params,
            dummy_hash: String::new(),
        };
        kdf.dummy_hash = kdf.hash("reqhub-dummy-password")?;
        Ok(kdf)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hashes `password` into a PHC string
    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| Error::Internal(format!("password hashing failed: {}", e)))
    }

    /// Checks `password` against a stored PHC string
    ///
    /// The parameters embedded in the PHC string win over the configured
    /// ones, so changing the config does not lock anybody out.
    pub fn verify(&self, password: &str, phc: &str) -> bool {
        match PasswordHash::new(phc) {
            Ok(parsed) => self
                .argon2()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    /// Burns one verification; always false
    pub fn dummy_verify(&self, password: &str) -> bool {
        let _ = self.verify(password, &self.dummy_hash);
        false
    }
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::Validation(
            crate::error::ValidationError::new(
                "INVALID_PASSWORD",
                format!("password must be at least {} characters", MIN_PASSWORD_LEN),
            )
            .field("password"),
        ));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_kdf() -> Kdf {
    Kdf::new(&KdfConfig {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    })
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let kdf = test_kdf();
        let hash = kdf.hash("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(kdf.verify("correct horse", &hash));
        assert!(!kdf.verify("correct horsf", &hash));
        assert!(!kdf.verify("correct horse", "not a phc string"));
    }

    #[test]
    fn test_salts_differ() {
        let kdf = test_kdf();
        assert_ne!(kdf.hash("same").unwrap(), kdf.hash("same").unwrap());
    }

    #[test]
    fn test_short_password_rejected() {
        assert!(validate_password("short").is_err());
        validate_password("long enough").unwrap();
    }
}
