use {
    anyhow::{Result, bail},
    clap::Subcommand,
    hookrelay_channels::{FilePairingStore, PairingStore},
    hookrelay_common::types::now_ms,
    hookrelay_config::HookrelayConfig,
    hookrelay_webhook::CHANNEL_ID,
};

#[derive(Subcommand)]
pub enum PairingAction {
    /// List pending pairing requests.
    List,
    /// Approve a pairing code, adding its sender to the allowlist.
    Approve { code: String },
}

pub async fn handle_pairing(config: &HookrelayConfig, action: PairingAction) -> Result<()> {
    let store = FilePairingStore::new(config.data_dir().join("pairing"));
    match action {
        PairingAction::List => list(&store).await,
        PairingAction::Approve { code } => approve(&store, &code).await,
    }
}

async fn list(store: &dyn PairingStore) -> Result<()> {
    let requests = store.list_requests(CHANNEL_ID).await?;
    if requests.is_empty() {
        println!("No pending pairing requests.");
        return Ok(());
    }
    let now = now_ms();
    for req in &requests {
        let age_min = now.saturating_sub(req.created_at) / 60_000;
        let name = req.sender_name.as_deref().unwrap_or("-");
        println!("  {}  {} ({name})  {age_min}m ago", req.code, req.sender_id);
    }
    Ok(())
}

async fn approve(store: &dyn PairingStore, code: &str) -> Result<()> {
    match store.approve(CHANNEL_ID, code).await? {
        Some(req) => {
            println!("Approved {} for {CHANNEL_ID} DMs.", req.sender_id);
            Ok(())
        },
        None => bail!("no pending pairing request with code {code} (it may have expired)"),
    }
}
