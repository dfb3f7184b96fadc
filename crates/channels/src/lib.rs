//! Channel plugin system.
//!
//! A channel (currently only the HTTP webhook bridge) implements
//! [`ChannelPlugin`] with adapters for outbound delivery and status probes.
//! The traits a channel consumes from the rest of the system (reply
//! dispatch, pairing) live here too so channel crates never depend on
//! concrete backends.

pub mod dispatch;
pub mod error;
pub mod gating;
pub mod pairing;
pub mod plugin;

pub use {
    dispatch::{InboundContext, ReplyDispatcher, ReplyKind, ReplySink},
    error::{Error, Result},
    gating::{DmPolicy, is_allowed},
    pairing::{FilePairingStore, PairingRequest, PairingStore, PairingUpsert},
    plugin::{ChannelHealthSnapshot, ChannelOutbound, ChannelPlugin, ChannelStatus},
};
