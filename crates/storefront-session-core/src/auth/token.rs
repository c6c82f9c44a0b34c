//! Session token encoding and verification.
//!
//! A token is `payload.tag`:
//! - `payload` is base64url (no padding) JSON:
//!   `{"userId", "email", "issuedAt", "nonce"}`
//! - `tag` is HMAC-SHA256 over the payload fields, base64url encoded and
//!   truncated to the configured length
//!
//! Decoding checks structure and integrity only. Whether the token is still
//! fresh is the session manager's call, so expired and tampered tokens stay
//! distinguishable.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::{DecodeError, SigningKey};
use crate::clock::Clock;
use crate::config::{ConfigError, DEFAULT_TAG_LENGTH, MAX_TAG_LENGTH, MIN_TAG_LENGTH};

type HmacSha256 = Hmac<Sha256>;

const SEPARATOR: char = '.';

/// Length of the random nonce in each token
const NONCE_LENGTH: usize = 13;

#[derive(Debug, Serialize, Deserialize)]
struct TokenPayload {
    #[serde(rename = "userId")]
    user_id: String,
    email: String,
    #[serde(rename = "issuedAt")]
    issued_at: i64,
    nonce: String,
}

/// What a structurally sound, untampered token says about its holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub user_id: String,
    pub email: String,
    pub issued_at: i64,
}

pub struct TokenCodec {
    mac: HmacSha256,
    tag_length: usize,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(
        key: &SigningKey,
        tag_length: usize,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        if !(MIN_TAG_LENGTH..=MAX_TAG_LENGTH).contains(&tag_length) {
            return Err(ConfigError::Invalid(format!(
                "tag length must be between {} and {}, got {}",
                MIN_TAG_LENGTH, MAX_TAG_LENGTH, tag_length
            )));
        }
        let mac = HmacSha256::new_from_slice(key.as_bytes())
            .map_err(|e| ConfigError::Invalid(format!("signing key rejected: {}", e)))?;
        Ok(Self {
            mac,
            tag_length,
            clock,
        })
    }

    pub fn with_default_tag(key: &SigningKey, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        Self::new(key, DEFAULT_TAG_LENGTH, clock)
    }

    /// Issue a token stamped with the current time
    pub fn encode(&self, user_id: &str, email: &str) -> String {
        self.encode_at(user_id, email, self.clock.now_millis())
    }

    /// Issue a token with an explicit issuance time
    pub fn encode_at(&self, user_id: &str, email: &str, issued_at: i64) -> String {
        let payload = TokenPayload {
            user_id: user_id.to_string(),
            email: email.to_string(),
            issued_at,
            nonce: generate_nonce(),
        };
        // A struct of strings and an integer always serializes
        let json = serde_json::to_vec(&payload).unwrap_or_default();
        let tag = self.derive_tag(&payload);
        format!("{}{}{}", URL_SAFE_NO_PAD.encode(json), SEPARATOR, tag)
    }

    pub fn decode(&self, token: &str) -> Result<TokenClaims, DecodeError> {
        let (payload, tag) = split_token(token)?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| DecodeError::DecodeFailure)?;
        let payload: TokenPayload =
            serde_json::from_slice(&json).map_err(|_| DecodeError::DecodeFailure)?;

        let expected = self.derive_tag(&payload);
        if !tags_match(expected.as_bytes(), tag.as_bytes()) {
            return Err(DecodeError::TagMismatch);
        }

        Ok(TokenClaims {
            user_id: payload.user_id,
            email: payload.email,
            issued_at: payload.issued_at,
        })
    }

    fn derive_tag(&self, payload: &TokenPayload) -> String {
        let mut mac = self.mac.clone();
        let issued_at = payload.issued_at.to_string();
        for field in [
            payload.user_id.as_str(),
            payload.email.as_str(),
            issued_at.as_str(),
            payload.nonce.as_str(),
        ] {
            // Length framing keeps ("ab", "c") and ("a", "bc") apart
            mac.update(&(field.len() as u64).to_be_bytes());
            mac.update(field.as_bytes());
        }
        let mut tag = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        tag.truncate(self.tag_length);
        tag
    }
}

fn split_token(token: &str) -> Result<(&str, &str), DecodeError> {
    let mut parts = token.split(SEPARATOR);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(payload), Some(tag), None) if !payload.is_empty() && !tag.is_empty() => {
            Ok((payload, tag))
        }
        _ => Err(DecodeError::MalformedToken),
    }
}

fn tags_match(expected: &[u8], actual: &[u8]) -> bool {
    expected.len() == actual.len()
        && expected
            .iter()
            .zip(actual)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LENGTH)
        .map(char::from)
        .collect()
}
