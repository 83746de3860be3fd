//! Tiered key/value storage for session state.
//!
//! This module provides:
//! - `EntryStore`: the storage tier contract with per-entry expiration
//! - `MemoryStore`: ephemeral primary tier, wiped when the process ends
//! - `KeychainStore`: durable tier in the OS keychain
//! - `DurableMirror`: best-effort credential copies across tiers
//!
//! Expired entries read as absent everywhere; expiration is lazy.

pub mod entry;
pub mod keychain;
pub mod memory;
pub mod mirror;

pub use entry::{default_ttl, keys, EntryStore, DEFAULT_TTL_HOURS};
pub use keychain::KeychainStore;
pub use memory::MemoryStore;
pub use mirror::DurableMirror;
