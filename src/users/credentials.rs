use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use tracing::error;

use crate::config::CryptoConfig;

use super::error::UserError;

/// Hashing and token minting for account credentials. The work factor
/// comes from `CryptoConfig`, never from constants in this file.
#[derive(Clone)]
pub struct CredentialEngine {
    argon2: Argon2<'static>,
    token_bytes: usize,
}

impl CredentialEngine {
    pub fn new(cfg: &CryptoConfig) -> Result<Self, UserError> {
        let params = Params::new(
            cfg.argon2_memory_kib,
            cfg.argon2_iterations,
            cfg.argon2_parallelism,
            None,
        )
        .map_err(|e| UserError::Crypto(e.to_string()))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            token_bytes: cfg.token_bytes,
        })
    }

    /// Salted one-way hash. Two calls with the same input produce two
    /// different PHC strings; both verify against the input.
    pub fn hash(&self, plain: &str) -> Result<String, UserError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                UserError::Crypto(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    /// A wrong password is `Ok(false)`; only a malformed hash is an error.
    pub fn verify(&self, plain: &str, hash: &str) -> Result<bool, UserError> {
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            UserError::Crypto(e.to_string())
        })?;
        Ok(self
            .argon2
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    }

    /// URL-safe random token for activation and password-reset links.
    pub fn generate_token(&self) -> Result<String, UserError> {
        let mut buf = vec![0u8; self.token_bytes];
        OsRng
            .try_fill_bytes(&mut buf)
            .map_err(|e| UserError::Crypto(e.to_string()))?;
        Ok(Base64UrlUnpadded::encode_string(&buf))
    }
}
