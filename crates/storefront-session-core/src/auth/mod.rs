//! Session tokens and their lifecycle.
//!
//! This module provides:
//! - `TokenCodec`: encodes identities into `payload.tag` tokens and verifies them
//! - `SessionManager`: creates, validates, refreshes and clears sessions
//! - `AutoRefreshScheduler`: refreshes the session before it expires
//! - `AuthStateSync`: reacts to identity provider sign-in and sign-out
//! - `SecretStore`: keeps the tag signing key in the OS keychain
//!
//! Sessions last 24 hours and are refreshed once less than an hour remains.

pub mod credentials;
pub mod error;
pub mod provider;
pub mod scheduler;
pub mod session;
pub mod token;

pub use credentials::{SecretStore, SigningKey, SECRET_ENV_VAR};
pub use error::{DecodeError, InvalidReason, RefreshError, SecretError, SessionError};
pub use provider::{AuthState, AuthStateSync, IdentityProvider, SyncAction};
pub use scheduler::{AutoRefreshScheduler, SchedulerHandle, SchedulerState, TickOutcome};
pub use session::{SessionManager, SessionOutcome};
pub use token::{TokenClaims, TokenCodec};
