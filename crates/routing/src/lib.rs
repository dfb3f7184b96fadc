//! Route inbound messages to agents and build session keys.
//!
//! Binding cascade (precedence):
//! 1. Peer binding (channel + exact peer ID)
//! 2. Account binding (channel + account)
//! 3. Channel binding (channel, any account)
//! 4. Default agent

pub mod error;
pub mod resolve;

pub use {
    error::{Error, Result},
    resolve::{AgentRouter, DefaultRouter, ResolvedRoute, RouteInput},
};
