//! Slow, salted hashing for passwords and PINs.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};

use crate::{EngineError, ResultEngine};

/// Hashing collaborator used for both passwords and PINs.
///
/// `verify` must compare in constant time; a mismatch is `Ok(false)`, only a
/// malformed stored hash is an error.
pub trait SecretHasher: Send + Sync {
    fn hash(&self, plaintext: &str) -> ResultEngine<String>;
    fn verify(&self, hash: &str, plaintext: &str) -> ResultEngine<bool>;
}

/// Argon2id in PHC string format.
#[derive(Clone, Debug)]
pub struct Argon2Hasher {
    params: Params,
}

impl Argon2Hasher {
    /// Custom cost parameters (memory in KiB, iterations, lanes).
    pub fn with_params(m_cost: u32, t_cost: u32, p_cost: u32) -> ResultEngine<Self> {
        let params = Params::new(m_cost, t_cost, p_cost, None)
            .map_err(|err| EngineError::Internal(format!("invalid argon2 params: {err}")))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

impl SecretHasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> ResultEngine<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| EngineError::Internal(format!("hashing failed: {err}")))
    }

    fn verify(&self, hash: &str, plaintext: &str) -> ResultEngine<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|err| EngineError::Internal(format!("stored hash is malformed: {err}")))?;
        match self.argon2().verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(err) => Err(EngineError::Internal(format!("verification failed: {err}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> Argon2Hasher {
        Argon2Hasher::with_params(8, 1, 1).unwrap()
    }

    #[test]
    fn hash_then_verify() {
        let hasher = cheap();
        let hash = hasher.hash("1234").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify(&hash, "1234").unwrap());
        assert!(!hasher.verify(&hash, "4321").unwrap());
    }

    #[test]
    fn hashes_are_salted() {
        let hasher = cheap();
        assert_ne!(hasher.hash("1234").unwrap(), hasher.hash("1234").unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(cheap().verify("plaintext", "1234").is_err());
    }
}
