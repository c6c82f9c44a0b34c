use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use keyring::Entry;
use rand::RngCore;
use tracing::{debug, info};

use super::SecretError;

const SERVICE_NAME: &str = "storefront-session";

/// Keychain user name under which the signing key is kept
const SECRET_ENTRY: &str = "signing-key";

/// Environment variable that overrides the keychain (base64url, no padding)
pub const SECRET_ENV_VAR: &str = "STOREFRONT_SESSION_SECRET";

const MIN_KEY_BYTES: usize = 16;

const GENERATED_KEY_BYTES: usize = 32;

/// Secret used to key the token tag.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey {
    bytes: Vec<u8>,
}

impl SigningKey {
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; GENERATED_KEY_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, SecretError> {
        if bytes.len() < MIN_KEY_BYTES {
            return Err(SecretError::TooShort {
                len: bytes.len(),
                min: MIN_KEY_BYTES,
            });
        }
        Ok(Self { bytes })
    }

    pub fn from_encoded(encoded: &str) -> Result<Self, SecretError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .map_err(|_| SecretError::InvalidEncoding)?;
        Self::from_bytes(bytes)
    }

    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

pub struct SecretStore;

impl SecretStore {
    /// Resolve the signing key: environment first, then the OS keychain,
    /// generating and storing a new key when neither has one.
    pub fn load_or_create() -> Result<SigningKey, SecretError> {
        if let Some(key) = Self::from_env()? {
            debug!("Using signing key from environment");
            return Ok(key);
        }
        if let Some(key) = Self::load()? {
            debug!("Using signing key from keychain");
            return Ok(key);
        }

        let key = SigningKey::generate();
        Self::store(&key)?;
        info!("Generated new signing key");
        Ok(key)
    }

    pub fn from_env() -> Result<Option<SigningKey>, SecretError> {
        match std::env::var(SECRET_ENV_VAR) {
            Ok(value) if !value.trim().is_empty() => SigningKey::from_encoded(&value).map(Some),
            _ => Ok(None),
        }
    }

    /// Retrieve the signing key from the OS keychain
    pub fn load() -> Result<Option<SigningKey>, SecretError> {
        let entry = Entry::new(SERVICE_NAME, SECRET_ENTRY)?;
        match entry.get_password() {
            Ok(encoded) => SigningKey::from_encoded(&encoded).map(Some),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Store the signing key in the OS keychain
    pub fn store(key: &SigningKey) -> Result<(), SecretError> {
        let entry = Entry::new(SERVICE_NAME, SECRET_ENTRY)?;
        entry.set_password(&key.encode())?;
        Ok(())
    }
}
