//! Session keys and the session activity index.
//!
//! The index is a single JSON file mapping session key to its most recent
//! inbound activity. It is used to compute the elapsed time shown in message
//! envelopes.

pub mod error;
pub mod key;
pub mod metadata;
pub mod store;

pub use {
    error::{Error, Result},
    key::SessionKey,
    metadata::{SessionEntry, SessionMetadata},
    store::{FileSessionStore, SessionStore},
};
