//! Email notifications for anomaly detection hooks.
//!
//! This crate provides:
//! - `AnomalyHook` entry points called on anomaly start and end
//! - Schema validation of SMTP and per-hook settings with defaults
//! - Built-in message templates with per-field overrides
//! - `{placeholder}` rendering of subject and body
//! - `MailSender` trait with an SMTP implementation on `lettre`

pub mod config;
pub mod email;
pub mod hook;
pub mod render;
pub mod templates;
pub mod traits;
pub mod validation;

pub use config::{HookConfig, MailConfig, Party, PluginConfig, SmtpConfig};
pub use email::SmtpMailSender;
pub use hook::{AnomalyEnd, AnomalyHook, AnomalyStart, FeatureAnomaly, MailHook};
pub use render::{MessageRenderer, ParamValue, Params};
pub use templates::{EventKind, TemplatePair, TemplateSet};
pub use traits::{DeliveryError, MailSender, Notification, NotifyError, RenderError};
pub use validation::{validate_hook, validate_plugin, validate_transport, ConfigError, FieldError};
