use std::time::Duration;

use {
    anyhow::Result,
    clap::Subcommand,
    hookrelay_config::HookrelayConfig,
    hookrelay_usage::{LoadOutcome, Period, TokenUsageData, TokenUsageTracker},
};

#[derive(Subcommand)]
pub enum UsageAction {
    /// Print the counters for every window.
    Show {
        /// Print the raw snapshot as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Clear one window (allTime, monthly, weekly, daily), or all of them.
    Reset { period: Option<Period> },
}

pub async fn handle_usage(config: &HookrelayConfig, action: UsageAction) -> Result<()> {
    let tracker = TokenUsageTracker::new(
        config.usage_path(),
        Duration::from_secs(config.usage.autosave_secs),
    );
    let outcome = tracker.load().await;

    match action {
        UsageAction::Show { json } => {
            if outcome == LoadOutcome::Missing {
                eprintln!("No usage recorded yet ({}).", tracker.path().display());
            }
            let data = tracker.get_data();
            if json {
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                print!("{}", render(&data));
            }
        },
        UsageAction::Reset { period } => {
            tracker.reset(period).await?;
            let scope = period.map_or("all windows", Period::as_str);
            println!("Reset {scope}.");
        },
    }
    Ok(())
}

fn started(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ms.to_string())
}

/// One block per window: totals, then a line per provider/model.
fn render(data: &TokenUsageData) -> String {
    let mut out = String::new();
    for period in Period::ALL {
        let slot = data.period(period);
        let totals = slot.totals();
        out.push_str(&format!(
            "{period} (since {}): {} tokens, {} requests\n",
            started(slot.started_at),
            totals.total_tokens,
            totals.request_count
        ));
        for (provider, models) in &slot.providers {
            for (model, c) in models {
                out.push_str(&format!(
                    "  {provider}/{model}: in {} out {} cache r/w {}/{} total {}\n",
                    c.input_tokens,
                    c.output_tokens,
                    c.cache_read_tokens,
                    c.cache_write_tokens,
                    c.total_tokens
                ));
            }
        }
    }
    out
}
