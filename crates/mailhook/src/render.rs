//! Placeholder substitution for notification templates.
//!
//! Templates use `{name}` placeholders; `{{` and `}}` produce literal
//! braces. A numeric placeholder may carry a fixed-point precision,
//! `{score:.2f}`. Rendering is pure: the same template and parameters
//! always produce the same message.

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

use crate::templates::TemplatePair;
use crate::traits::{Notification, RenderError};

/// Named parameters available to a template.
pub type Params = IndexMap<String, ParamValue>;

/// A single template parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Text(String),
    Integer(i64),
    Number(f64),
    /// Structured value already serialized to compact JSON.
    Json(String),
}

impl ParamValue {
    /// Serialize a structured value to its compact JSON text.
    pub fn json(value: &serde_json::Value) -> Self {
        ParamValue::Json(value.to_string())
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Integer(i) => Some(*i as f64),
            ParamValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Text(s) => f.write_str(s.trim()),
            ParamValue::Integer(i) => write!(f, "{i}"),
            ParamValue::Number(n) => f.write_str(&format_number(*n)),
            ParamValue::Json(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Integer(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<&serde_json::Value> for ParamValue {
    fn from(value: &serde_json::Value) -> Self {
        ParamValue::json(value)
    }
}

/// Natural text form of a float; integral values keep one decimal (`1.0`).
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

/// Fixed-point score with exactly one decimal digit.
pub fn format_score(score: f64) -> String {
    format!("{score:.1}")
}

/// Expands template pairs into finished messages.
#[derive(Debug, Default)]
pub struct MessageRenderer {
    _private: (),
}

impl MessageRenderer {
    /// Create a new renderer.
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Render both fields of `pair` with `params`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Undefined`] if a placeholder has no matching
    /// parameter, or [`RenderError::Syntax`] for a malformed template.
    pub fn render(&self, pair: &TemplatePair, params: &Params) -> Result<Notification, RenderError> {
        Ok(Notification {
            subject: self.render_str(&pair.subject, params)?,
            body: self.render_str(&pair.content, params)?,
        })
    }

    /// Render a single template string. Surrounding whitespace is trimmed.
    pub fn render_str(&self, template: &str, params: &Params) -> Result<String, RenderError> {
        expand(template.trim(), |placeholder| {
            let value = params
                .get(placeholder.name)
                .ok_or_else(|| RenderError::Undefined {
                    name: placeholder.name.to_string(),
                })?;
            match placeholder.precision {
                None => Ok(value.to_string()),
                Some(precision) => value
                    .as_f64()
                    .map(|n| format!("{n:.precision$}"))
                    .ok_or_else(|| RenderError::Syntax {
                        position: placeholder.position,
                        message: format!(
                            "precision given for non-numeric parameter '{}'",
                            placeholder.name
                        ),
                    }),
            }
        })
    }

    /// Check that a template string is well-formed without rendering it.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Syntax`] if the template has syntax errors.
    pub fn validate(&self, template: &str) -> Result<(), RenderError> {
        expand(template.trim(), |_| Ok(String::new())).map(|_| ())
    }
}

/// Largest fixed-point precision a placeholder may request.
const MAX_PRECISION: usize = 20;

/// A parsed `{name[:.Nf]}` placeholder.
struct Placeholder<'a> {
    name: &'a str,
    precision: Option<usize>,
    position: usize,
}

fn syntax(position: usize, message: impl Into<String>) -> RenderError {
    RenderError::Syntax {
        position,
        message: message.into(),
    }
}

/// Walk `template`, copying literal text and substituting placeholders.
fn expand<F>(template: &str, mut resolve: F) -> Result<String, RenderError>
where
    F: FnMut(&Placeholder<'_>) -> Result<String, RenderError>,
{
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' => {
                if matches!(chars.peek(), Some((_, '{'))) {
                    chars.next();
                    out.push('{');
                    continue;
                }
                let mut end = None;
                for (i, inner) in chars.by_ref() {
                    match inner {
                        '}' => {
                            end = Some(i);
                            break;
                        }
                        '{' => return Err(syntax(i, "unexpected '{' inside placeholder")),
                        _ => {}
                    }
                }
                let end = end.ok_or_else(|| syntax(pos, "unclosed placeholder"))?;
                let placeholder = parse_placeholder(&template[pos + 1..end], pos)?;
                out.push_str(&resolve(&placeholder)?);
            }
            '}' => {
                if matches!(chars.peek(), Some((_, '}'))) {
                    chars.next();
                    out.push('}');
                    continue;
                }
                return Err(syntax(pos, "single '}' outside a placeholder"));
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

fn parse_placeholder(field: &str, position: usize) -> Result<Placeholder<'_>, RenderError> {
    let (name, spec) = match field.split_once(':') {
        Some((name, spec)) => (name, Some(spec)),
        None => (field, None),
    };

    let mut name_chars = name.chars();
    let valid_name = matches!(name_chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && name_chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_name {
        return Err(syntax(position, format!("invalid placeholder name '{name}'")));
    }

    let precision = match spec {
        None => None,
        Some(spec) => Some(
            spec.strip_prefix('.')
                .and_then(|s| s.strip_suffix('f'))
                .and_then(|digits| digits.parse::<usize>().ok())
                .ok_or_else(|| {
                    syntax(
                        position,
                        format!("unsupported format spec '{spec}', expected '.<digits>f'"),
                    )
                })?,
        ),
    };
    if let Some(precision) = precision.filter(|p| *p > MAX_PRECISION) {
        return Err(syntax(
            position,
            format!("precision {precision} exceeds the maximum of {MAX_PRECISION}"),
        ));
    }

    Ok(Placeholder {
        name,
        precision,
        position,
    })
}
