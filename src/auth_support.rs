//! Agent-secret hashing (Argon2id).
//!
//! Spec.md leaves "how the per-agent secret is stored" as an implementation
//! detail (§4.2's Open Question list doesn't raise it, but storing secrets
//! in plaintext would be an obvious defect); SPEC_FULL.md §4.2 resolves it
//! to Argon2id, reusing the hashing approach production Rust services use
//! for password-at-rest storage generally.

use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::rngs::OsRng;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct SecretHasher {
    argon2: Argon2<'static>,
}

impl SecretHasher {
    pub fn new() -> Self {
        Self { argon2: Argon2::default() }
    }

    pub fn hash(&self, secret: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(secret.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| Error::Internal(format!("secret hashing failed: {e}")))
    }

    pub fn verify(&self, secret: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self.argon2.verify_password(secret.as_bytes(), &parsed).is_ok(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_roundtrips() {
        let hasher = SecretHasher::new();
        let hash = hasher.hash("s3cr3t").unwrap();
        assert!(hasher.verify("s3cr3t", &hash));
        assert!(!hasher.verify("wrong", &hash));
    }
}
