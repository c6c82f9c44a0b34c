use thiserror::Error;

use crate::storage::StorageError;

/// Why a token string could not be turned back into claims.
///
/// Messages never include token contents.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Malformed session token")]
    MalformedToken,

    #[error("Session token payload could not be decoded")]
    DecodeFailure,

    #[error("Session token tag does not match its payload")]
    TagMismatch,
}

/// Why the current session is not usable.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    #[error("No session token found")]
    NoToken,

    #[error("Session token tampered")]
    Tampered,

    #[error("Session expired")]
    Expired,

    #[error("Session storage unavailable")]
    StorageUnavailable,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session could not be persisted: {0}")]
    StorageUnavailable(#[from] StorageError),
}

#[derive(Error, Debug)]
pub enum RefreshError {
    #[error("No active session to refresh")]
    NoActiveSession,

    #[error("Cannot refresh invalid session: {0}")]
    InvalidSession(InvalidReason),

    #[error("Refreshed session could not be persisted: {0}")]
    Storage(StorageError),
}

impl From<SessionError> for RefreshError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::StorageUnavailable(e) => RefreshError::Storage(e),
        }
    }
}

#[derive(Error, Debug)]
pub enum SecretError {
    #[error("Signing key too short: {len} bytes, need at least {min}")]
    TooShort { len: usize, min: usize },

    #[error("Signing key is not valid base64url")]
    InvalidEncoding,

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),
}
