use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl Default for FieldValue {
    fn default() -> Self {
        FieldValue::Text(String::new())
    }
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(text) => text.is_empty(),
            FieldValue::List(items) => items.is_empty(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            FieldValue::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            FieldValue::Text(_) => None,
            FieldValue::List(items) => Some(items),
        }
    }

    /// Flattens to a single string, joining list entries with `delimiter`.
    pub fn joined(&self, delimiter: &str) -> String {
        match self {
            FieldValue::Text(text) => text.clone(),
            FieldValue::List(items) => items.join(delimiter),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        FieldValue::List(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordField {
    pub name: String,
    pub value: FieldValue,
}

/// One harvested item. Fields follow schema order and are never missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    /// Zero-based position of the item in document order.
    pub index: usize,
    fields: Vec<RecordField>,
}

impl ExtractedRecord {
    pub fn new(index: usize, fields: Vec<RecordField>) -> Self {
        Self { index, fields }
    }

    pub fn fields(&self) -> &[RecordField] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| &field.value)
    }

    /// Text of a scalar field; `None` for unknown names and list fields.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }

    /// One cell per field, list values joined with `delimiter`.
    pub fn to_row(&self, delimiter: &str) -> Vec<String> {
        self.fields
            .iter()
            .map(|field| field.value.joined(delimiter))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemErrorKind {
    /// The item handle no longer referred to a live element.
    Stale,
    /// Something unexpected happened while building the record.
    Assembly,
}

/// An item that was dropped from the output, tagged with its position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    pub index: usize,
    pub kind: ItemErrorKind,
    pub message: String,
}

impl ItemError {
    pub fn stale(index: usize, message: impl Into<String>) -> Self {
        Self {
            index,
            kind: ItemErrorKind::Stale,
            message: message.into(),
        }
    }

    pub fn assembly(index: usize, message: impl Into<String>) -> Self {
        Self {
            index,
            kind: ItemErrorKind::Assembly,
            message: message.into(),
        }
    }
}

impl fmt::Display for ItemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Humans count items from one.
        write!(f, "item {}: {}", self.index + 1, self.message)
    }
}
