//! Shared types and error helpers used across all hookrelay crates.

pub mod error;
pub mod types;

pub use error::FromMessage;
