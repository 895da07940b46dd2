use crate::error::{Error, Result};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use rand::Rng;

/// Opaque hash/verify capability for staff PINs. Verification must not
/// leak timing differences between unknown-alias and wrong-pin paths.
pub trait SecretHasher: Send + Sync {
    fn hash(&self, secret: &str) -> Result<String>;
    fn verify(&self, secret: &str, hashed: &str) -> bool;
}

pub struct Argon2Hasher;

impl SecretHasher for Argon2Hasher {
    fn hash(&self, secret: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hashed = Argon2::default()
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| Error::Infrastructure(anyhow::anyhow!("failed to hash secret: {}", e)))?
            .to_string();
        Ok(hashed)
    }

    fn verify(&self, secret: &str, hashed: &str) -> bool {
        let parsed = match PasswordHash::new(hashed) {
            Ok(parsed) => parsed,
            Err(_) => return false,
        };
        Argon2::default()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok()
    }
}

/// Fresh numeric PIN for the self-service `pin` admin action.
pub fn generate_pin(digits: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..digits.clamp(4, 6))
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}
