use std::path::Path;

use {
    anyhow::{Result, bail},
    hookrelay_config::{
        HookrelayConfig,
        validate::{self, Severity},
    },
    hookrelay_webhook::{
        IssueLevel, OutboundClient, OutboundMessage, StatusIssue, WebhookAccountConfig,
        collect_status_issues,
    },
};

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn print_issue(issue: &StatusIssue) {
    let (color, label) = match issue.level {
        IssueLevel::Error => (RED, "error"),
        IssueLevel::Warning => (YELLOW, "warning"),
    };
    eprintln!("  {BOLD}{color}{label}{RESET} channels.webhook: {}", issue.message);
    if let Some(ref fix) = issue.fix {
        eprintln!("        fix: {fix}");
    }
}

/// Webhook account issues for a parsed config, or an error when the section
/// does not deserialize.
fn webhook_issues(config: &HookrelayConfig) -> Result<Vec<StatusIssue>> {
    let Some(raw) = config.channels.webhook.clone() else {
        return Ok(Vec::new());
    };
    let account = WebhookAccountConfig::from_value(raw)?;
    Ok(collect_status_issues(&account))
}

pub fn check(path: Option<&Path>, verbose: bool) -> Result<()> {
    let result = validate::validate(path);

    if let Some(ref path) = result.config_path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found; checking defaults.\n");
    }

    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }

        let (color, label) = match d.severity {
            Severity::Error => (RED, "error"),
            Severity::Warning => (YELLOW, "warning"),
            Severity::Info => (CYAN, "info"),
        };

        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{label}{RESET} {}", d.message);
        } else {
            eprintln!("  {BOLD}{color}{label}{RESET} {}: {}", d.path, d.message);
        }
        shown += 1;
    }

    let mut errors = result.count(Severity::Error);
    let mut warnings = result.count(Severity::Warning);

    // Account-level checks only make sense once the file itself parses.
    if !result.has_errors() {
        let config = match result.config_path {
            Some(ref path) => hookrelay_config::load_config(path)?,
            None => HookrelayConfig::default(),
        };
        match webhook_issues(&config) {
            Ok(issues) => {
                for issue in &issues {
                    print_issue(issue);
                    match issue.level {
                        IssueLevel::Error => errors += 1,
                        IssueLevel::Warning => warnings += 1,
                    }
                    shown += 1;
                }
            },
            Err(e) => {
                eprintln!("  {BOLD}{RED}error{RESET} channels.webhook: {e}");
                errors += 1;
                shown += 1;
            },
        }
    }

    if shown > 0 {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }

    Ok(())
}

/// Validate the outbound settings and, with `send`, deliver one text message.
pub async fn probe(config: &HookrelayConfig, send: Option<String>, to: &str) -> Result<()> {
    let Some(raw) = config.channels.webhook.clone() else {
        bail!("no [channels.webhook] section in the config");
    };
    let account = WebhookAccountConfig::from_value(raw)?;

    let url = OutboundClient::probe(&account.outbound)?;
    println!("outbound url:  {url}");
    println!("timeout:       {}s", account.outbound.timeout_seconds);

    let Some(text) = send else {
        return Ok(());
    };
    let receipt = OutboundClient::default()
        .send(&account.outbound, &OutboundMessage::text(to, text))
        .await?;
    match receipt.message_id {
        Some(id) => println!("delivered, message id {id}"),
        None => println!("delivered"),
    }
    Ok(())
}
