//! Built-in message templates and per-field user overrides.
//!
//! Each event kind owns a subject/content pair. User configuration may
//! replace any single field; every other slot keeps its built-in text.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::traits::NotifyError;

const START_SUBJECT: &str = "
[LoudML] anomaly detected! (model={model}, score={score})
";

const START_CONTENT: &str = "
Anomaly detected by LoudML!

date={date}
model={model}
score={score}
predicted={predicted}
observed={observed}
reason:
{reason}
";

const END_SUBJECT: &str = "
[LoudML] anomaly end (model={model}, score={score})
";

const END_CONTENT: &str = "
Anomaly end

date={date}
model={model}
score={score}
";

/// Anomaly lifecycle events that produce a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AnomalyStart,
    AnomalyEnd,
}

impl EventKind {
    pub const ALL: [EventKind; 2] = [EventKind::AnomalyStart, EventKind::AnomalyEnd];

    /// Configuration key of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AnomalyStart => "anomaly_start",
            EventKind::AnomalyEnd => "anomaly_end",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = NotifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "anomaly_start" => Ok(EventKind::AnomalyStart),
            "anomaly_end" => Ok(EventKind::AnomalyEnd),
            other => Err(NotifyError::Config(format!(
                "unknown template kind '{other}', expected 'anomaly_start' or 'anomaly_end'"
            ))),
        }
    }
}

/// Subject and content format strings for one event kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplatePair {
    pub subject: String,
    pub content: String,
}

impl TemplatePair {
    fn builtin(kind: EventKind) -> Self {
        let (subject, content) = match kind {
            EventKind::AnomalyStart => (START_SUBJECT, START_CONTENT),
            EventKind::AnomalyEnd => (END_SUBJECT, END_CONTENT),
        };
        Self {
            subject: subject.to_string(),
            content: content.to_string(),
        }
    }
}

/// Optional replacements for the fields of one [`TemplatePair`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairOverride {
    pub subject: Option<String>,
    pub content: Option<String>,
}

impl PairOverride {
    fn apply(self, pair: &mut TemplatePair) {
        if let Some(subject) = self.subject {
            pair.subject = subject;
        }
        if let Some(content) = self.content {
            pair.content = content;
        }
    }
}

/// User-supplied template overrides, keyed by event kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateOverrides {
    pub anomaly_start: PairOverride,
    pub anomaly_end: PairOverride,
}

impl TemplateOverrides {
    /// Mutable access to the override slot for `kind`.
    pub fn slot_mut(&mut self, kind: EventKind) -> &mut PairOverride {
        match kind {
            EventKind::AnomalyStart => &mut self.anomaly_start,
            EventKind::AnomalyEnd => &mut self.anomaly_end,
        }
    }
}

/// Effective templates for every event kind.
///
/// Always complete: defaults fill every slot not overridden.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateSet {
    anomaly_start: TemplatePair,
    anomaly_end: TemplatePair,
}

impl TemplateSet {
    /// Overlay `overrides` on the built-in templates, field by field.
    pub fn merged(overrides: TemplateOverrides) -> Self {
        let mut set = Self::default();
        overrides.anomaly_start.apply(&mut set.anomaly_start);
        overrides.anomaly_end.apply(&mut set.anomaly_end);
        set
    }

    /// The effective pair for `kind`.
    pub fn resolve(&self, kind: EventKind) -> &TemplatePair {
        match kind {
            EventKind::AnomalyStart => &self.anomaly_start,
            EventKind::AnomalyEnd => &self.anomaly_end,
        }
    }

    /// Resolve by configuration key.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Config`] when `key` names no known event kind.
    pub fn resolve_key(&self, key: &str) -> Result<&TemplatePair, NotifyError> {
        let kind: EventKind = key.parse()?;
        Ok(self.resolve(kind))
    }
}

impl Default for TemplateSet {
    fn default() -> Self {
        Self {
            anomaly_start: TemplatePair::builtin(EventKind::AnomalyStart),
            anomaly_end: TemplatePair::builtin(EventKind::AnomalyEnd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_slot() {
        let set = TemplateSet::default();
        for kind in EventKind::ALL {
            let pair = set.resolve(kind);
            assert!(!pair.subject.trim().is_empty(), "{kind} subject");
            assert!(!pair.content.trim().is_empty(), "{kind} content");
        }
    }

    #[test]
    fn single_field_override_keeps_other_slots() {
        let mut overrides = TemplateOverrides::default();
        overrides.anomaly_end.subject = Some("recovered: {model}".to_string());

        let merged = TemplateSet::merged(overrides);
        let defaults = TemplateSet::default();

        assert_eq!(merged.resolve(EventKind::AnomalyEnd).subject, "recovered: {model}");
        assert_eq!(
            merged.resolve(EventKind::AnomalyEnd).content,
            defaults.resolve(EventKind::AnomalyEnd).content
        );
        assert_eq!(
            merged.resolve(EventKind::AnomalyStart),
            defaults.resolve(EventKind::AnomalyStart)
        );
    }

    #[test]
    fn content_override_keeps_subject() {
        let mut overrides = TemplateOverrides::default();
        overrides.slot_mut(EventKind::AnomalyStart).content = Some("{reason}".to_string());

        let merged = TemplateSet::merged(overrides);
        let start = merged.resolve(EventKind::AnomalyStart);
        assert_eq!(start.content, "{reason}");
        assert_eq!(start.subject, START_SUBJECT);
    }

    #[test]
    fn resolve_by_key() {
        let set = TemplateSet::default();
        let pair = set.resolve_key("anomaly_start").unwrap();
        assert!(pair.subject.contains("anomaly detected"));
    }

    #[test]
    fn resolve_unknown_key_is_config_error() {
        let set = TemplateSet::default();
        match set.resolve_key("anomaly_middle") {
            Err(NotifyError::Config(msg)) => assert!(msg.contains("anomaly_middle"), "got: {msg}"),
            other => panic!("expected Config error, got: {other:?}"),
        }
    }

    #[test]
    fn kind_keys_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
    }
}
