//! Dual-tier persistence for the session record.
//!
//! This module provides the `SessionStore`, which mirrors the session token,
//! its expiry and the cached user snapshot into two tiers:
//! - a volatile tier scoped to the current client (`MemoryTier`)
//! - a durable tier shared by every client on the machine (`FileTier`)
//!
//! Reads prefer the volatile tier and fall back to the durable tier as a
//! whole; slots are never mixed across tiers.

pub mod error;
pub mod store;
pub mod tier;

pub use error::StorageError;
pub use store::{SessionStore, SlotKeys};
pub use tier::{FileTier, MemoryTier, StorageTier, TierKind};
