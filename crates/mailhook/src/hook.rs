//! Anomaly lifecycle hooks that deliver email notifications.
//!
//! Each hook call is an independent transaction: build parameters,
//! resolve the template, render, send. Failures are logged and never
//! reach the detection pipeline that invoked the hook.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Local, TimeZone, Timelike, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::config::{HookConfig, SmtpConfig};
use crate::email::SmtpMailSender;
use crate::render::{format_score, MessageRenderer, ParamValue, Params};
use crate::templates::EventKind;
use crate::traits::{MailSender, NotifyError};

/// Per-feature anomaly descriptor supplied by the detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureAnomaly {
    /// Direction of the deviation, e.g. `"high"` or `"low"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub score: f64,
}

/// Data reported when an anomaly starts.
#[derive(Debug, Clone)]
pub struct AnomalyStart {
    pub model: String,
    pub timestamp: DateTime<FixedOffset>,
    pub score: f64,
    pub predicted: Option<serde_json::Value>,
    pub observed: Option<serde_json::Value>,
    /// Feature name → descriptor, in the order the detector reported them.
    pub anomalies: IndexMap<String, FeatureAnomaly>,
    /// Extra template parameters forwarded as-is.
    pub extra: Params,
}

/// Data reported when an anomaly ends.
#[derive(Debug, Clone)]
pub struct AnomalyEnd {
    pub model: String,
    pub timestamp: DateTime<FixedOffset>,
    pub score: f64,
    /// Extra template parameters forwarded as-is.
    pub extra: Params,
}

/// Entry points called by the detection engine.
///
/// Both methods are infallible from the caller's point of view.
#[async_trait::async_trait]
pub trait AnomalyHook: Send + Sync {
    /// Configured name of this hook instance.
    fn name(&self) -> &str;

    /// Called when a model starts reporting an anomaly.
    async fn on_anomaly_start(&self, event: &AnomalyStart);

    /// Called when a previously reported anomaly is over.
    async fn on_anomaly_end(&self, event: &AnomalyEnd);
}

/// Sends one email per anomaly event to a single recipient.
pub struct MailHook {
    name: String,
    config: HookConfig,
    /// `None` when the plug-in has no SMTP block.
    smtp: Option<Arc<SmtpConfig>>,
    sender: Arc<dyn MailSender>,
    renderer: MessageRenderer,
}

impl MailHook {
    /// Create a hook with an explicit mail sender.
    pub fn new(
        name: impl Into<String>,
        config: HookConfig,
        smtp: Option<Arc<SmtpConfig>>,
        sender: Arc<dyn MailSender>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            smtp,
            sender,
            renderer: MessageRenderer::new(),
        }
    }

    /// Create a hook that delivers through [`SmtpMailSender`].
    pub fn from_config(
        name: impl Into<String>,
        config: HookConfig,
        smtp: Option<Arc<SmtpConfig>>,
    ) -> Self {
        Self::new(name, config, smtp, Arc::new(SmtpMailSender::new()))
    }

    /// The validated hook settings.
    pub fn config(&self) -> &HookConfig {
        &self.config
    }

    /// Render the template for `kind` and deliver it.
    ///
    /// # Errors
    ///
    /// - [`NotifyError::Unconfigured`] when no SMTP block exists; nothing is sent.
    /// - [`NotifyError::Template`] when the template cannot be rendered.
    /// - [`NotifyError::Delivery`] when the SMTP exchange fails.
    pub async fn notify(&self, kind: EventKind, params: &Params) -> Result<(), NotifyError> {
        let smtp = self.smtp.as_deref().ok_or(NotifyError::Unconfigured)?;
        let template = self.config.templates.resolve(kind);
        let message = self.renderer.render(template, params)?;

        tracing::info!(
            hook = %self.name,
            kind = %kind,
            to = %self.config.to.address,
            "sending alert"
        );

        self.sender
            .send(&message, &self.config.from, &self.config.to, smtp)
            .await?;
        Ok(())
    }

    /// Deliver a sample `anomaly_start` notification and report the result.
    pub async fn send_test(&self) -> Result<(), NotifyError> {
        let mut anomalies = IndexMap::new();
        anomalies.insert(
            "test_feature".to_string(),
            FeatureAnomaly {
                kind: "high".to_string(),
                score: 99.0,
            },
        );
        let event = AnomalyStart {
            model: "mailhook-test".to_string(),
            timestamp: Utc::now().fixed_offset(),
            score: 99.0,
            predicted: Some(serde_json::json!({ "test_feature": 1.0 })),
            observed: Some(serde_json::json!({ "test_feature": 10.0 })),
            anomalies,
            extra: Params::new(),
        };
        self.notify(EventKind::AnomalyStart, &start_params(&event, &self.name))
            .await
    }

    /// Turn the outcome of one hook call into log lines.
    fn report(&self, kind: EventKind, model: &str, result: Result<(), NotifyError>) {
        match result {
            Ok(()) => {
                tracing::debug!(hook = %self.name, model, kind = %kind, "hook executed");
            }
            Err(NotifyError::Unconfigured) => {
                tracing::warn!(
                    hook = %self.name,
                    model,
                    kind = %kind,
                    "mail plug-in is not configured, notification skipped"
                );
            }
            Err(e) => {
                tracing::error!(
                    hook = %self.name,
                    model,
                    kind = %kind,
                    error = %e,
                    "cannot execute {model}.{} hook",
                    self.name
                );
            }
        }
    }
}

#[async_trait::async_trait]
impl AnomalyHook for MailHook {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_anomaly_start(&self, event: &AnomalyStart) {
        let params = start_params(event, &self.name);
        let result = self.notify(EventKind::AnomalyStart, &params).await;
        self.report(EventKind::AnomalyStart, &event.model, result);
    }

    async fn on_anomaly_end(&self, event: &AnomalyEnd) {
        let params = end_params(event, &self.name);
        let result = self.notify(EventKind::AnomalyEnd, &params).await;
        self.report(EventKind::AnomalyEnd, &event.model, result);
    }
}

// ── Parameter building ──────────────────────────────────────────────

/// One line per feature: `feature '<name>' is too <type> (score = <x.y>)`.
pub fn describe_anomalies(anomalies: &IndexMap<String, FeatureAnomaly>) -> String {
    anomalies
        .iter()
        .map(|(feature, anomaly)| {
            format!(
                "feature '{feature}' is too {} (score = {})",
                anomaly.kind,
                format_score(anomaly.score)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render `timestamp` in the offset of `tz`, e.g. `2026-10-16 14:03:00+02:00`.
///
/// Sub-second time is printed as microseconds, and only when at least one
/// microsecond has elapsed.
pub fn format_date<Tz>(timestamp: &DateTime<FixedOffset>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let format = if timestamp.nanosecond() / 1_000 == 0 {
        "%Y-%m-%d %H:%M:%S%:z"
    } else {
        "%Y-%m-%d %H:%M:%S%.6f%:z"
    };
    timestamp.with_timezone(tz).format(format).to_string()
}

fn json_param(value: Option<&serde_json::Value>) -> ParamValue {
    value.map_or_else(|| ParamValue::Json("null".to_string()), ParamValue::json)
}

/// Parameters for the `anomaly_start` template.
pub fn start_params(event: &AnomalyStart, hook: &str) -> Params {
    let mut params = Params::new();
    params.insert("model".into(), event.model.clone().into());
    params.insert(
        "date".into(),
        format_date(&event.timestamp, &Local).into(),
    );
    params.insert("score".into(), event.score.into());
    params.insert("predicted".into(), json_param(event.predicted.as_ref()));
    params.insert("observed".into(), json_param(event.observed.as_ref()));
    params.insert("reason".into(), describe_anomalies(&event.anomalies).into());
    merge_extra(&mut params, &event.extra, hook);
    params
}

/// Parameters for the `anomaly_end` template.
pub fn end_params(event: &AnomalyEnd, hook: &str) -> Params {
    let mut params = Params::new();
    params.insert("model".into(), event.model.clone().into());
    params.insert(
        "date".into(),
        format_date(&event.timestamp, &Local).into(),
    );
    params.insert("score".into(), event.score.into());
    merge_extra(&mut params, &event.extra, hook);
    params
}

/// Append caller parameters; built-in names are never replaced.
fn merge_extra(params: &mut Params, extra: &Params, hook: &str) {
    for (name, value) in extra {
        if params.contains_key(name) {
            tracing::warn!(hook, param = %name, "ignoring extra parameter that shadows a built-in one");
            continue;
        }
        params.insert(name.clone(), value.clone());
    }
}
