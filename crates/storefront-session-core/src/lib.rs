//! Client-resident session tokens for the storefront.
//!
//! This crate lets the storefront recognize a signed-in visitor before (or
//! without) a round trip to the identity provider. It provides:
//! - `TokenCodec`: compact `payload.tag` tokens with an HMAC integrity tag
//! - `SessionStore`: a volatile tab-local tier mirrored into a durable tier
//! - `SessionManager`: create, validate, refresh and clear sessions
//! - `AutoRefreshScheduler`: keeps a live session from expiring
//! - `AuthStateSync`: follows identity provider sign-in/sign-out events

pub mod auth;
pub mod clock;
pub mod config;
pub mod models;
pub mod storage;
pub mod utils;

pub use auth::{
    AuthState, AuthStateSync, AutoRefreshScheduler, DecodeError, IdentityProvider, InvalidReason,
    RefreshError, SchedulerHandle, SecretStore, SessionError, SessionManager, SessionOutcome,
    SigningKey, TickOutcome, TokenClaims, TokenCodec,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, SessionConfig};
pub use models::{Identity, SessionRecord, UserSnapshot};
pub use storage::{FileTier, MemoryTier, SessionStore, StorageError, StorageTier, TierKind};
