use std::collections::HashMap;

use {async_trait::async_trait, hookrelay_sessions::SessionKey, tracing::debug};

use crate::error::{Error, Result};

/// Who sent a message, and where.
#[derive(Debug, Clone, Copy)]
pub struct RouteInput<'a> {
    pub channel: &'a str,
    pub account_id: &'a str,
    pub peer_id: &'a str,
}

/// Resolved route: which agent handles this message and the session key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    pub agent_id: String,
    pub session_key: SessionKey,
}

/// Picks the agent and session for an inbound message.
#[async_trait]
pub trait AgentRouter: Send + Sync {
    async fn resolve(&self, input: RouteInput<'_>) -> Result<ResolvedRoute>;
}

/// Static binding table with a default agent.
#[derive(Debug, Clone, Default)]
pub struct DefaultRouter {
    default_agent: Option<String>,
    peers: HashMap<(String, String), String>,
    accounts: HashMap<(String, String), String>,
    channels: HashMap<String, String>,
}

impl DefaultRouter {
    pub fn new(default_agent: impl Into<String>) -> Self {
        Self {
            default_agent: Some(default_agent.into()),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn bind_peer(mut self, channel: &str, peer_id: &str, agent: &str) -> Self {
        self.peers
            .insert((channel.to_string(), peer_id.to_string()), agent.to_string());
        self
    }

    #[must_use]
    pub fn bind_account(mut self, channel: &str, account_id: &str, agent: &str) -> Self {
        self.accounts
            .insert((channel.to_string(), account_id.to_string()), agent.to_string());
        self
    }

    #[must_use]
    pub fn bind_channel(mut self, channel: &str, agent: &str) -> Self {
        self.channels.insert(channel.to_string(), agent.to_string());
        self
    }

    fn agent_for(&self, input: RouteInput<'_>) -> Option<&str> {
        let channel = input.channel.to_string();
        self.peers
            .get(&(channel.clone(), input.peer_id.to_string()))
            .or_else(|| self.accounts.get(&(channel.clone(), input.account_id.to_string())))
            .or_else(|| self.channels.get(&channel))
            .or(self.default_agent.as_ref())
            .map(String::as_str)
    }
}

#[async_trait]
impl AgentRouter for DefaultRouter {
    async fn resolve(&self, input: RouteInput<'_>) -> Result<ResolvedRoute> {
        let agent_id = self.agent_for(input).ok_or_else(|| Error::NoAgent {
            channel: input.channel.to_string(),
        })?;
        debug!(channel = input.channel, peer = input.peer_id, agent_id, "route resolved");
        Ok(ResolvedRoute {
            agent_id: agent_id.to_string(),
            session_key: SessionKey::direct(agent_id, input.channel, input.peer_id),
        })
    }
}
