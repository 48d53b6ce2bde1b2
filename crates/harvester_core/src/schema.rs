use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::FieldValue;

/// A CSS selector scoped to an item, optionally narrowed to matches whose
/// text (or a descendant's text) satisfies a filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub css: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_text: Option<TextFilter>,
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            css: selector.into(),
            has_text: None,
        }
    }

    /// Keep only matches whose own text contains `text`.
    pub fn containing(mut self, text: impl Into<String>) -> Self {
        self.has_text = Some(TextFilter {
            within: None,
            text: text.into(),
            exact: false,
        });
        self
    }

    /// Keep only matches with a descendant matching `within` whose text is exactly `text`.
    pub fn with_descendant_text(
        mut self,
        within: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        self.has_text = Some(TextFilter {
            within: Some(within.into()),
            text: text.into(),
            exact: true,
        });
        self
    }

    pub fn accepts_text(&self, candidate: &str) -> bool {
        self.has_text
            .as_ref()
            .map_or(true, |filter| filter.matches(candidate))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub within: Option<String>,
    pub text: String,
    #[serde(default)]
    pub exact: bool,
}

impl TextFilter {
    pub fn matches(&self, candidate: &str) -> bool {
        let candidate = candidate.trim();
        if self.exact {
            candidate == self.text
        } else {
            candidate.contains(self.text.as_str())
        }
    }
}

/// What to read from each matched element.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Read {
    /// Rendered text content.
    #[default]
    Text,
    /// A raw attribute value.
    Attribute(String),
    /// The `href` attribute resolved against the document URL.
    Href,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    Trim,
    CollapseWhitespace,
    /// Drops a trailing "...more" style marker left by truncated previews.
    StripTruncationMarker,
    StripSuffix(String),
}

impl Transform {
    pub fn apply(&self, value: String) -> String {
        match self {
            Transform::Trim => {
                let trimmed = value.trim();
                if trimmed.len() == value.len() {
                    value
                } else {
                    trimmed.to_string()
                }
            }
            Transform::CollapseWhitespace => value.split_whitespace().collect::<Vec<_>>().join(" "),
            Transform::StripTruncationMarker => strip_truncation_marker(&value).to_string(),
            Transform::StripSuffix(suffix) => match value.strip_suffix(suffix.as_str()) {
                Some(head) => head.trim_end().to_string(),
                None => value,
            },
        }
    }
}

// A marker is "more" preceded by at least three dots (an ellipsis counts as three).
fn strip_truncation_marker(value: &str) -> &str {
    let trimmed = value.trim_end();
    let Some(head) = strip_suffix_ignore_ascii_case(trimmed, "more") else {
        return value;
    };
    let without_dots = head.trim_end_matches(['.', '\u{2026}']);
    let weight: usize = head[without_dots.len()..]
        .chars()
        .map(|c| if c == '\u{2026}' { 3 } else { 1 })
        .sum();
    if weight >= 3 {
        without_dots.trim_end()
    } else {
        value
    }
}

fn strip_suffix_ignore_ascii_case<'a>(value: &'a str, suffix: &str) -> Option<&'a str> {
    let split = value.len().checked_sub(suffix.len())?;
    if !value.is_char_boundary(split) {
        return None;
    }
    let (head, tail) = value.split_at(split);
    tail.eq_ignore_ascii_case(suffix).then_some(head)
}

/// One independent extraction rule: locator, read mode, transforms and the
/// value used when nothing matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    pub locator: Locator,
    #[serde(default)]
    pub read: Read,
    /// Collect every match into a list instead of taking the first.
    #[serde(default)]
    pub multiple: bool,
    #[serde(default = "default_transforms")]
    pub transforms: Vec<Transform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<FieldValue>,
}

fn default_transforms() -> Vec<Transform> {
    vec![Transform::Trim]
}

impl FieldRule {
    pub fn text(locator: Locator) -> Self {
        Self {
            locator,
            read: Read::Text,
            multiple: false,
            transforms: default_transforms(),
            default: None,
        }
    }

    pub fn href(locator: Locator) -> Self {
        Self {
            read: Read::Href,
            ..Self::text(locator)
        }
    }

    pub fn attribute(locator: Locator, name: impl Into<String>) -> Self {
        Self {
            read: Read::Attribute(name.into()),
            ..Self::text(locator)
        }
    }

    pub fn all(mut self) -> Self {
        self.multiple = true;
        self
    }

    pub fn then(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn or(mut self, default: FieldValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn default_value(&self) -> FieldValue {
        match &self.default {
            Some(value) => value.clone(),
            None if self.multiple => FieldValue::List(Vec::new()),
            None => FieldValue::Text(String::new()),
        }
    }

    pub fn transform(&self, raw: String) -> String {
        self.transforms
            .iter()
            .fold(raw, |value, transform| transform.apply(value))
    }

    /// Turns the raw values read for this rule into the field value.
    ///
    /// No raw values means the locator missed, so the default applies. For
    /// list rules, entries that are empty after transforming are dropped.
    pub fn finish(&self, raw: Vec<String>) -> FieldValue {
        if self.multiple {
            let values: Vec<String> = raw
                .into_iter()
                .map(|value| self.transform(value))
                .filter(|value| !value.is_empty())
                .collect();
            if values.is_empty() {
                self.default_value()
            } else {
                FieldValue::List(values)
            }
        } else {
            match raw.into_iter().next() {
                Some(value) => FieldValue::Text(self.transform(value)),
                None => self.default_value(),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Rule(FieldRule),
    /// Independently extracted parts joined into one text value.
    Composite {
        parts: Vec<FieldRule>,
        separator: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    /// Column title for tabular output; defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn rule(name: impl Into<String>, rule: FieldRule) -> Self {
        Self {
            name: name.into(),
            title: None,
            kind: FieldKind::Rule(rule),
        }
    }

    pub fn composite(
        name: impl Into<String>,
        parts: Vec<FieldRule>,
        separator: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            title: None,
            kind: FieldKind::Composite {
                parts,
                separator: separator.into(),
            },
        }
    }

    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }

    /// The value a record carries for this field when nothing was found.
    pub fn default_value(&self) -> FieldValue {
        match &self.kind {
            FieldKind::Rule(rule) => rule.default_value(),
            FieldKind::Composite { parts, separator } => {
                let defaults: Vec<String> = parts
                    .iter()
                    .map(|part| part.default_value().joined(separator))
                    .collect();
                FieldValue::Text(compose(&defaults, separator))
            }
        }
    }
}

/// Joins the non-empty parts with `separator` and trims separator
/// characters left dangling at either end.
pub fn compose<S: AsRef<str>>(parts: &[S], separator: &str) -> String {
    let joined = parts
        .iter()
        .map(|part| part.as_ref().trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(separator);
    let artifacts: Vec<char> = separator.chars().collect();
    joined
        .trim_matches(|c: char| artifacts.contains(&c))
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("schema has no fields")]
    Empty,
    #[error("field name must not be empty")]
    EmptyName,
    #[error("duplicate field name {0:?}")]
    DuplicateField(String),
    #[error("field {field:?} has an empty locator")]
    EmptyLocator { field: String },
    #[error("composite field {field:?} has no parts")]
    EmptyComposite { field: String },
}

/// An ordered list of field specs; every record carries exactly these fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self, SchemaError> {
        let schema = Self { fields };
        schema.validate()?;
        Ok(schema)
    }

    // Built-in presets are covered by tests instead of runtime validation.
    pub(crate) fn builtin(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.name.as_str())
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(FieldSpec::title)
    }

    /// Deserialized schemas skip `new`, so loaders call this explicitly.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.fields.is_empty() {
            return Err(SchemaError::Empty);
        }
        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(SchemaError::EmptyName);
            }
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField(field.name.clone()));
            }
            let rules: &[FieldRule] = match &field.kind {
                FieldKind::Rule(rule) => std::slice::from_ref(rule),
                FieldKind::Composite { parts, .. } => {
                    if parts.is_empty() {
                        return Err(SchemaError::EmptyComposite {
                            field: field.name.clone(),
                        });
                    }
                    parts
                }
            };
            if rules.iter().any(|rule| rule.locator.css.trim().is_empty()) {
                return Err(SchemaError::EmptyLocator {
                    field: field.name.clone(),
                });
            }
        }
        Ok(())
    }
}
