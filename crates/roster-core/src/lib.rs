//! Foundational persistence utilities shared across roster crates.
//!
//! Provides the atomic file-write helper and the durable key/value store the
//! activity ledger mirrors its collections into.

pub mod atomic_io;
pub mod durable_store;

pub use atomic_io::write_text_atomic;
pub use durable_store::{
    load_or_default, save_or_log, DurableStore, JsonFileStore, MemoryStore, StoreKey,
};
