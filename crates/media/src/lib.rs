//! Media pipeline: bounded download, inline decode, content-type detection,
//! and on-disk storage.

pub mod error;
pub mod fetch;
pub mod mime;
pub mod store;

pub use {
    error::{Error, Result},
    fetch::{FetchedMedia, decode_inline, fetch_remote, load_reference},
    store::{MediaStore, SavedMedia},
};

/// Default per-item size ceiling.
pub const DEFAULT_MAX_BYTES: u64 = 20 * 1024 * 1024;

/// Convert a megabyte setting into a byte ceiling.
#[must_use]
pub fn mb_to_bytes(mb: u64) -> u64 {
    mb.saturating_mul(1024 * 1024)
}
