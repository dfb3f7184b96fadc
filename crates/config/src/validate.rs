//! Configuration validation engine.
//!
//! Parses the file, flags unknown or misspelled keys against the known schema,
//! type-checks the result, and runs semantic checks on the webhook channel.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use serde_json::Value;

use crate::{loader, schema::HookrelayConfig};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// "syntax", "unknown-field", "type-error", "security", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "channels.webhook.dm.policy"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result of validating a configuration file.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

// ── Schema tree for unknown-field detection ─────────────────────────────────

enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    Array(Box<KnownKeys>),
    Leaf,
}

fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Array, Leaf, Struct};

    let inbound = Struct(HashMap::from([
        ("host", Leaf),
        ("port", Leaf),
        ("path", Leaf),
        ("token", Leaf),
        ("maxConcurrent", Leaf),
    ]));
    let outbound = Struct(HashMap::from([
        ("url", Leaf),
        ("token", Leaf),
        ("timeoutSeconds", Leaf),
        ("includeUsage", Leaf),
    ]));
    let dm = Struct(HashMap::from([
        ("enabled", Leaf),
        ("policy", Leaf),
        ("allowFrom", Array(Box::new(Leaf))),
    ]));
    let webhook = Struct(HashMap::from([
        ("accountId", Leaf),
        ("mediaMaxMb", Leaf),
        ("textChunkLimit", Leaf),
        ("inbound", inbound),
        ("outbound", outbound),
        ("dm", dm),
    ]));

    Struct(HashMap::from([
        ("channels", Struct(HashMap::from([("webhook", webhook)]))),
        (
            "usage",
            Struct(HashMap::from([("path", Leaf), ("autosaveSecs", Leaf)])),
        ),
        ("storage", Struct(HashMap::from([("dataDir", Leaf)]))),
        (
            "metrics",
            Struct(HashMap::from([
                ("enabled", Leaf),
                ("prometheusEndpoint", Leaf),
                ("listen", Leaf),
                ("labels", Leaf),
            ])),
        ),
    ]))
}

// ── Levenshtein distance ────────────────────────────────────────────────────

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

/// Closest candidate within `max_distance` edits, ignoring exact matches.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|&c| (c, levenshtein(&needle.to_ascii_lowercase(), &c.to_ascii_lowercase())))
        .filter(|&(c, d)| d <= max_distance && c != needle)
        .min_by_key(|&(_, d)| d)
        .map(|(c, _)| c)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a config file at the given path, or the discovered default.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let Some(config_path) = path.map(Path::to_path_buf).or_else(loader::find_config_file) else {
        return ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Info,
                "file-ref",
                "",
                "no config file found; using defaults",
            )],
            config_path: None,
        };
    };

    let mut result = match loader::load_config_value(&config_path) {
        Ok(value) => validate_value(&value),
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic::new(Severity::Error, "syntax", "", e.to_string())],
            config_path: None,
        },
    };
    result.config_path = Some(config_path);
    result
}

/// Validate a raw document in the format implied by `format` ("toml", "yaml",
/// "yml", "json"). No env substitution, no filesystem access.
#[must_use]
pub fn validate_str(raw: &str, format: &str) -> ValidationResult {
    let pseudo = PathBuf::from(format!("hookrelay.{format}"));
    match loader::parse_config_value(raw, &pseudo) {
        Ok(value) => validate_value(&value),
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic::new(Severity::Error, "syntax", "", e.to_string())],
            config_path: None,
        },
    }
}

/// Validate an already-parsed document.
#[must_use]
pub fn validate_value(value: &Value) -> ValidationResult {
    let mut diagnostics = Vec::new();

    check_unknown_fields(value, &build_schema_map(), "", &mut diagnostics);

    match serde_json::from_value::<HookrelayConfig>(value.clone()) {
        Ok(config) => check_semantics(&config, &mut diagnostics),
        Err(e) => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "type-error",
            "",
            format!("type error: {e}"),
        )),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn check_unknown_fields(
    value: &Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match (value, schema) {
        (Value::Object(table), KnownKeys::Struct(fields)) => {
            let known: Vec<&str> = fields.keys().copied().collect();
            for (key, child) in table {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                if let Some(child_schema) = fields.get(key.as_str()) {
                    check_unknown_fields(child, child_schema, &path, diagnostics);
                    continue;
                }
                let message = match suggest(key, &known, 3) {
                    Some(s) => format!("unknown field (did you mean \"{s}\"?)"),
                    None => "unknown field".to_string(),
                };
                diagnostics.push(Diagnostic::new(
                    Severity::Error,
                    "unknown-field",
                    path,
                    message,
                ));
            }
        },
        (Value::Array(items), KnownKeys::Array(item_schema)) => {
            for (i, item) in items.iter().enumerate() {
                check_unknown_fields(item, item_schema, &format!("{prefix}[{i}]"), diagnostics);
            }
        },
        _ => {},
    }
}

fn check_semantics(config: &HookrelayConfig, diagnostics: &mut Vec<Diagnostic>) {
    if config.usage.autosave_secs == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "type-error",
            "usage.autosaveSecs",
            "autosave interval of 0 is clamped to a few milliseconds",
        ));
    }

    let Some(webhook) = config.channels.webhook.as_ref() else {
        return;
    };
    let dm = webhook.get("dm");
    let policy = dm
        .and_then(|d| d.get("policy"))
        .and_then(Value::as_str)
        .unwrap_or("pairing");
    let allow_from: Vec<&str> = dm
        .and_then(|d| d.get("allowFrom"))
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    if policy == "open" && !allow_from.contains(&"*") {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "security",
            "channels.webhook.dm.allowFrom",
            "dm.policy = \"open\" requires \"*\" in allowFrom",
        ));
    }
    if policy == "allowlist" && allow_from.is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "security",
            "channels.webhook.dm.allowFrom",
            "allowlist policy with an empty allowFrom admits only paired senders",
        ));
    }

    let inbound_token = webhook
        .pointer("/inbound/token")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if inbound_token.contains("${") {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "file-ref",
            "channels.webhook.inbound.token",
            "token still contains an unresolved ${...} placeholder",
        ));
    }
}
