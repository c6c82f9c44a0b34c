//! Data types shared between the codec, the store, and the manager.
//!
//! - `Identity`: the signed-in user as reported by the identity provider
//! - `UserSnapshot`: the persisted copy of an identity
//! - `SessionRecord`: token, expiry and snapshot as stored in each tier

pub mod identity;
pub mod record;

pub use identity::{Identity, UserSnapshot};
pub use record::SessionRecord;
