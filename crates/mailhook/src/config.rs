//! Validated configuration for the mail plug-in and its hooks.
//!
//! The global `[smtp]` block describes the outgoing mail server and is
//! shared by every hook. Each `[hooks.<name>]` block names a sender, a
//! recipient and optional template overrides.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use lettre::transport::smtp::{SMTP_PORT, SUBMISSIONS_PORT};
use serde_json::{Map, Value};

use crate::templates::TemplateSet;
use crate::validation::{self, ConfigError};

// ── Validated blocks ────────────────────────────────────────────────

/// Outgoing SMTP server settings.
#[derive(Clone, PartialEq, Eq)]
pub struct SmtpConfig {
    pub host: String,
    /// `0` selects the protocol default for the connection mode.
    pub port: u16,
    /// Use an implicitly TLS-wrapped connection.
    pub tls: bool,
    pub user: Option<String>,
    pub password: String,
}

impl SmtpConfig {
    /// The port to connect to, resolving `0` to 465 (TLS) or 25 (plain).
    pub fn effective_port(&self) -> u16 {
        match (self.port, self.tls) {
            (0, true) => SUBMISSIONS_PORT,
            (0, false) => SMTP_PORT,
            (port, _) => port,
        }
    }

    /// Login user when authentication is required.
    pub fn login_user(&self) -> Option<&str> {
        self.user.as_deref().filter(|user| !user.is_empty())
    }
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Global plug-in settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginConfig {
    pub smtp: SmtpConfig,
}

/// One side of an email: display name plus address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Party {
    /// Display name, possibly empty.
    pub name: String,
    pub address: String,
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            f.write_str(&self.address)
        } else {
            write!(f, "{} <{}>", self.name, self.address)
        }
    }
}

/// Settings of a single notification hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookConfig {
    pub from: Party,
    pub to: Party,
    pub templates: TemplateSet,
}

// ── Config file ─────────────────────────────────────────────────────

/// A complete mail configuration file.
///
/// ```toml
/// [smtp]
/// host = "smtp.example.com"
/// tls = true
///
/// [hooks.ops-mail]
/// from = { address = "loudml@example.com" }
/// to = { name = "Ops", address = "ops@example.com" }
/// ```
#[derive(Debug, Clone)]
pub struct MailConfig {
    /// `None` when the file has no `[smtp]` table.
    pub smtp: Option<Arc<SmtpConfig>>,
    pub hooks: IndexMap<String, HookConfig>,
}

impl MailConfig {
    /// Parse and validate config from a TOML string.
    ///
    /// Environment overrides are applied before validation.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut doc: Value = toml::from_str(toml_str)?;
        apply_env_overrides(&mut doc);
        Self::from_value(&doc)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Validate an already-parsed configuration document.
    pub fn from_value(doc: &Value) -> Result<Self, ConfigError> {
        validation::validate_document(doc)
    }

    /// Look up a hook by name.
    pub fn hook(&self, name: &str) -> Option<&HookConfig> {
        self.hooks.get(name)
    }
}

// ── Environment variable overrides ──────────────────────────────────

/// Apply environment variable overrides to the raw document.
///
/// - `MAILHOOK_SMTP_HOST` → `smtp.host`
/// - `MAILHOOK_SMTP_PORT` → `smtp.port`
/// - `MAILHOOK_SMTP_USER` → `smtp.user`
/// - `MAILHOOK_SMTP_PASSWORD` → `smtp.password`
///
/// Overrides only touch an existing `[smtp]` table, unless
/// `MAILHOOK_SMTP_HOST` is set, which creates it. A port that is not a
/// number is kept as text so validation reports it.
fn apply_env_overrides(doc: &mut Value) {
    apply_overrides(doc, |var| std::env::var(var).ok());
}

/// Apply overrides resolved through `lookup`, keyed by variable name.
fn apply_overrides(doc: &mut Value, lookup: impl Fn(&str) -> Option<String>) {
    let overrides: Vec<(&str, Value)> = [
        ("host", "MAILHOOK_SMTP_HOST"),
        ("port", "MAILHOOK_SMTP_PORT"),
        ("user", "MAILHOOK_SMTP_USER"),
        ("password", "MAILHOOK_SMTP_PASSWORD"),
    ]
    .into_iter()
    .filter_map(|(key, var)| {
        let raw = lookup(var)?;
        let value = match key {
            "port" => raw
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or(Value::String(raw)),
            _ => Value::String(raw),
        };
        Some((key, value))
    })
    .collect();

    if overrides.is_empty() {
        return;
    }
    let Some(root) = doc.as_object_mut() else {
        return;
    };
    let creates_table = overrides.iter().any(|(key, _)| *key == "host");
    if !creates_table && !root.contains_key("smtp") {
        return;
    }
    let smtp = root
        .entry("smtp")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Some(smtp) = smtp.as_object_mut() {
        for (key, value) in overrides {
            smtp.insert(key.to_string(), value);
        }
    }
}
