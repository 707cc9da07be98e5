//! Schema validation for raw configuration blocks.
//!
//! Turns untyped configuration (`serde_json::Value`) into the typed blocks
//! in [`crate::config`], applying documented defaults. Every problem found
//! in a block is collected with a dotted field path; a block either
//! validates completely or yields [`ConfigError::Invalid`].

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{HookConfig, MailConfig, Party, PluginConfig, SmtpConfig};
use crate::render::MessageRenderer;
use crate::templates::{EventKind, TemplateOverrides, TemplateSet};

// ── Error types ─────────────────────────────────────────────────────

/// A single failed constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Dotted location, e.g. `"smtp.port"` or `"templates.anomaly_end.subject"`.
    pub path: String,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {}", join_errors(.0))]
    Invalid(Vec<FieldError>),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Field errors of an [`ConfigError::Invalid`] error, empty otherwise.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            ConfigError::Invalid(errors) => errors.as_slice(),
            _ => &[],
        }
    }
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ── Collector ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ValidationResult {
    errors: Vec<FieldError>,
}

impl ValidationResult {
    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn into_error(self) -> ConfigError {
        ConfigError::Invalid(self.errors)
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(n) if n.is_f64() => "a float",
        Value::Number(_) => "an integer",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a table",
    }
}

// ── Field helpers ───────────────────────────────────────────────────

fn as_table<'a>(
    value: &'a Value,
    path: &str,
    allowed: &[&str],
    result: &mut ValidationResult,
) -> Option<&'a Map<String, Value>> {
    let Some(map) = value.as_object() else {
        result.error(path, format!("expected a table, got {}", type_name(value)));
        return None;
    };
    for key in map.keys() {
        if !allowed.contains(&key.as_str()) {
            result.error(
                join_path(path, key),
                format!("unknown field, expected one of: {}", allowed.join(", ")),
            );
        }
    }
    Some(map)
}

fn required<'a>(
    map: &'a Map<String, Value>,
    path: &str,
    key: &str,
    result: &mut ValidationResult,
) -> Option<&'a Value> {
    let value = map.get(key);
    if value.is_none() {
        result.error(join_path(path, key), "required field is missing");
    }
    value
}

fn string_value(value: &Value, path: String, result: &mut ValidationResult) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        other => {
            result.error(path, format!("expected a string, got {}", type_name(other)));
            None
        }
    }
}

fn optional_string(
    map: &Map<String, Value>,
    path: &str,
    key: &str,
    result: &mut ValidationResult,
) -> Option<String> {
    map.get(key)
        .and_then(|value| string_value(value, join_path(path, key), result))
}

fn required_string(
    map: &Map<String, Value>,
    path: &str,
    key: &str,
    result: &mut ValidationResult,
) -> Option<String> {
    required(map, path, key, result)
        .and_then(|value| string_value(value, join_path(path, key), result))
}

fn optional_bool(
    map: &Map<String, Value>,
    path: &str,
    key: &str,
    result: &mut ValidationResult,
) -> Option<bool> {
    match map.get(key)? {
        Value::Bool(b) => Some(*b),
        other => {
            result.error(
                join_path(path, key),
                format!("expected a boolean, got {}", type_name(other)),
            );
            None
        }
    }
}

fn optional_port(
    map: &Map<String, Value>,
    path: &str,
    result: &mut ValidationResult,
) -> Option<u16> {
    let value = map.get("port")?;
    let field = join_path(path, "port");
    match value {
        Value::Number(n) if n.is_f64() => {
            result.error(field, format!("expected an integer, got {n}"));
            None
        }
        Value::Number(n) => match n.as_u64().and_then(|p| u16::try_from(p).ok()) {
            Some(port) => Some(port),
            None => {
                result.error(field, format!("value {n} is out of range 0..=65535"));
                None
            }
        },
        other => {
            result.error(field, format!("expected an integer, got {}", type_name(other)));
            None
        }
    }
}

/// Check `local@domain` syntax, then let lettre parse the address.
fn check_address(address: &str) -> Result<(), String> {
    if address.matches('@').count() != 1 {
        return Err(format!(
            "'{address}' must contain exactly one '@' between local part and domain"
        ));
    }
    if address.starts_with('@') || address.ends_with('@') {
        return Err(format!("'{address}' has an empty local part or domain"));
    }
    address
        .parse::<lettre::Address>()
        .map(|_| ())
        .map_err(|e| format!("'{address}' is not a valid email address: {e}"))
}

// ── Blocks ──────────────────────────────────────────────────────────

fn check_smtp(value: &Value, path: &str, result: &mut ValidationResult) -> Option<SmtpConfig> {
    let map = as_table(value, path, &["host", "port", "tls", "user", "password"], result)?;

    let host = required_string(map, path, "host", result);
    if matches!(host.as_deref(), Some(h) if h.trim().is_empty()) {
        result.error(join_path(path, "host"), "must not be empty");
    }
    let port = optional_port(map, path, result);
    let tls = optional_bool(map, path, "tls", result);
    let user = optional_string(map, path, "user", result);
    let password = optional_string(map, path, "password", result);

    // Fields that failed are `None` here; the caller discards the block.
    Some(SmtpConfig {
        host: host.unwrap_or_default(),
        port: port.unwrap_or(0),
        tls: tls.unwrap_or(false),
        user,
        password: password.unwrap_or_default(),
    })
}

fn check_party(value: &Value, path: &str, result: &mut ValidationResult) -> Option<Party> {
    let map = as_table(value, path, &["name", "address"], result)?;

    let name = optional_string(map, path, "name", result).unwrap_or_default();
    let address = required_string(map, path, "address", result)?;
    if let Err(message) = check_address(&address) {
        result.error(join_path(path, "address"), message);
        return None;
    }
    Some(Party { name, address })
}

fn check_templates(value: &Value, path: &str, result: &mut ValidationResult) -> TemplateSet {
    let kinds: Vec<&str> = EventKind::ALL.iter().map(EventKind::as_str).collect();
    let mut overrides = TemplateOverrides::default();
    let Some(map) = as_table(value, path, &kinds, result) else {
        return TemplateSet::default();
    };

    let renderer = MessageRenderer::new();
    for kind in EventKind::ALL {
        let Some(pair) = map.get(kind.as_str()) else {
            continue;
        };
        let pair_path = join_path(path, kind.as_str());
        let Some(pair) = as_table(pair, &pair_path, &["subject", "content"], result) else {
            continue;
        };
        let subject = optional_string(pair, &pair_path, "subject", result);
        let content = optional_string(pair, &pair_path, "content", result);
        for (field, text) in [("subject", &subject), ("content", &content)] {
            if let Some(Err(e)) = text.as_deref().map(|t| renderer.validate(t)) {
                result.error(join_path(&pair_path, field), format!("invalid template: {e}"));
            }
        }

        let slot = overrides.slot_mut(kind);
        slot.subject = subject;
        slot.content = content;
    }

    TemplateSet::merged(overrides)
}

fn check_hook(value: &Value, path: &str, result: &mut ValidationResult) -> Option<HookConfig> {
    let map = as_table(value, path, &["from", "to", "templates"], result)?;

    let from = required(map, path, "from", result)
        .and_then(|v| check_party(v, &join_path(path, "from"), result));
    let to = required(map, path, "to", result)
        .and_then(|v| check_party(v, &join_path(path, "to"), result));
    let templates = match map.get("templates") {
        Some(v) => check_templates(v, &join_path(path, "templates"), result),
        None => TemplateSet::default(),
    };

    Some(HookConfig {
        from: from?,
        to: to?,
        templates,
    })
}

// ── Public API ──────────────────────────────────────────────────────

/// Validate a global SMTP block (`host`, `port`, `tls`, `user`, `password`).
pub fn validate_transport(value: &Value) -> Result<SmtpConfig, ConfigError> {
    let mut result = ValidationResult::default();
    match check_smtp(value, "", &mut result) {
        Some(smtp) if result.errors.is_empty() => Ok(smtp),
        _ => Err(result.into_error()),
    }
}

/// Validate the global plug-in block, which requires an `smtp` table.
pub fn validate_plugin(value: &Value) -> Result<PluginConfig, ConfigError> {
    let mut result = ValidationResult::default();
    let smtp = as_table(value, "", &["smtp"], &mut result)
        .and_then(|map| required(map, "", "smtp", &mut result))
        .and_then(|smtp| check_smtp(smtp, "smtp", &mut result));
    match smtp {
        Some(smtp) if result.errors.is_empty() => Ok(PluginConfig { smtp }),
        _ => Err(result.into_error()),
    }
}

/// Validate one hook block (`from`, `to`, optional `templates`).
pub fn validate_hook(value: &Value) -> Result<HookConfig, ConfigError> {
    let mut result = ValidationResult::default();
    match check_hook(value, "", &mut result) {
        Some(hook) if result.errors.is_empty() => Ok(hook),
        _ => Err(result.into_error()),
    }
}

/// Validate a whole configuration document: optional `smtp`, plus `hooks`.
pub(crate) fn validate_document(doc: &Value) -> Result<MailConfig, ConfigError> {
    let mut result = ValidationResult::default();
    let Some(root) = as_table(doc, "", &["smtp", "hooks"], &mut result) else {
        return Err(result.into_error());
    };

    let smtp = root
        .get("smtp")
        .and_then(|v| check_smtp(v, "smtp", &mut result));

    let mut hooks = IndexMap::new();
    match root.get("hooks") {
        None => {}
        Some(Value::Object(entries)) => {
            for (name, hook) in entries {
                if let Some(hook) = check_hook(hook, &join_path("hooks", name), &mut result) {
                    hooks.insert(name.clone(), hook);
                }
            }
        }
        Some(other) => {
            result.error("hooks", format!("expected a table, got {}", type_name(other)));
        }
    }

    if !result.errors.is_empty() {
        return Err(result.into_error());
    }
    Ok(MailConfig {
        smtp: smtp.map(Arc::new),
        hooks,
    })
}
