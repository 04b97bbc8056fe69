use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::{Params, Pbkdf2};
use rand_core::OsRng;

use crate::err::Error;

/// Salted PBKDF2-SHA256. The PHC string it produces carries the algorithm,
/// the round count and the salt, so verification needs nothing else.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasherService {
    rounds: u32,
}

impl PasswordHasherService {
    pub fn new(rounds: u32) -> Self {
        Self { rounds }
    }

    pub fn hash(&self, plaintext: &str) -> Result<String, Error> {
        let salt = SaltString::generate(&mut OsRng);
        let params = Params {
            rounds: self.rounds,
            ..Params::default()
        };
        let hash = Pbkdf2.hash_password_customized(plaintext.as_bytes(), None, None, params, &salt)?;
        Ok(hash.to_string())
    }

    /// A stored hash that does not parse counts as a mismatch.
    pub fn verify(&self, plaintext: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => Pbkdf2
                .verify_password(plaintext.as_bytes(), &parsed)
                .is_ok(),
            Err(err) => {
                log::warn!("Stored password hash is unreadable: {}", err);
                false
            }
        }
    }
}
