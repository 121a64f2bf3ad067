//! # Credentials
//!
//! One-way salted password hashing (scrypt, PHC string format). Stored
//! credentials are only ever verified, never decoded or compared in clear.

use crate::primitives::CREDENTIAL_HASH_LEN;
use crate::{CampusError, CampusResult};
use scrypt::{
    Params, Scrypt,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

/// Hashes and verifies passwords with a fixed scrypt cost.
#[derive(Debug, Clone, Copy)]
pub struct CredentialHasher {
    params: Params,
}

impl CredentialHasher {
    /// Build a hasher with cost `log2(N) = cost`.
    pub fn new(cost: u8) -> CampusResult<Self> {
        let params = Params::new(cost, 8, 1, CREDENTIAL_HASH_LEN)
            .map_err(|e| CampusError::Validation(format!("invalid password cost: {}", e)))?;
        Ok(Self { params })
    }

    /// Hash `password` with a fresh random salt.
    pub fn hash(&self, password: &str) -> CampusResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hashed = Scrypt
            .hash_password_customized(password.as_bytes(), None, None, self.params, &salt)
            .map_err(|e| CampusError::Serialization(format!("password hash: {}", e)))?;
        Ok(hashed.to_string())
    }

    /// Whether `password` matches the stored PHC string.
    ///
    /// A malformed stored credential never verifies.
    pub fn verify(&self, password: &str, stored: &str) -> bool {
        match PasswordHash::new(stored) {
            Ok(parsed) => Scrypt.verify_password(password.as_bytes(), &parsed).is_ok(),
            Err(e) => {
                tracing::warn!(event = "credential_unparseable", error = %e);
                false
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn hash_verifies_and_is_salted() {
        let hasher = CredentialHasher::new(4).unwrap();
        let a = hasher.hash("hunter22").unwrap();
        let b = hasher.hash("hunter22").unwrap();

        assert_ne!(a, b);
        assert!(!a.contains("hunter22"));
        assert!(a.starts_with("$scrypt$"));
        assert!(hasher.verify("hunter22", &a));
        assert!(hasher.verify("hunter22", &b));
        assert!(!hasher.verify("hunter23", &a));
    }

    #[test]
    fn malformed_credential_never_verifies() {
        let hasher = CredentialHasher::new(4).unwrap();
        assert!(!hasher.verify("anything", "aHVudGVyMjI="));
        assert!(!hasher.verify("", ""));
    }

    #[test]
    fn rejects_invalid_cost() {
        assert!(CredentialHasher::new(70).is_err());
    }
}
