//! At-rest encryption of analysis text
//!
//! Keys are standard Fernet keys (url-safe base64 of 32 bytes) stored alone in
//! a file, so existing key files keep working.

use crate::utils::error::CryptoError;
use std::path::Path;

pub struct Encryptor {
    fernet: fernet::Fernet,
}

impl Encryptor {
    pub fn from_key(key: &str) -> Result<Self, CryptoError> {
        let fernet = fernet::Fernet::new(key.trim()).ok_or(CryptoError::InvalidKey)?;
        Ok(Self { fernet })
    }

    pub fn from_key_file(path: &Path) -> Result<Self, CryptoError> {
        let key = std::fs::read_to_string(path).map_err(|source| CryptoError::KeyFile {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_key(&key)
    }

    pub fn encrypt(&self, plaintext: &str) -> String {
        self.fernet.encrypt(plaintext.as_bytes())
    }

    pub fn decrypt(&self, token: &str) -> Result<String, CryptoError> {
        let bytes = self
            .fernet
            .decrypt(token)
            .map_err(|_| CryptoError::Decrypt)?;
        String::from_utf8(bytes).map_err(|_| CryptoError::Decrypt)
    }
}

/// Fresh random Fernet key
pub fn generate_key() -> String {
    fernet::Fernet::generate_key()
}
