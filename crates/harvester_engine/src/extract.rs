use harvest_logging::harvest_debug;
use harvester_core::{
    compose, ExtractedRecord, FieldKind, FieldRule, FieldValue, ItemError, RecordField, Schema,
};

use crate::source::{ItemHandle, SourceError};

/// Evaluates a [`Schema`] against one item.
///
/// Each rule runs on its own: a rule whose locator misses (or fails for any
/// reason other than the item itself going stale) yields its default and
/// the other rules are unaffected.
#[derive(Debug, Clone, Copy)]
pub struct FieldExtractor<'a> {
    schema: &'a Schema,
}

impl<'a> FieldExtractor<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }

    /// Builds the record for the item at `index`.
    ///
    /// The only failure is a stale item: the record is dropped rather than
    /// filled with defaults for an element that no longer exists.
    pub async fn extract<I>(&self, index: usize, item: &I) -> Result<ExtractedRecord, ItemError>
    where
        I: ItemHandle + ?Sized,
    {
        item.ensure_live()
            .await
            .map_err(|err| item_failure(index, err))?;

        let mut fields = Vec::with_capacity(self.schema.len());
        for spec in self.schema.fields() {
            let value = match &spec.kind {
                FieldKind::Rule(rule) => self.evaluate(index, item, rule).await?,
                FieldKind::Composite { parts, separator } => {
                    let mut values = Vec::with_capacity(parts.len());
                    for part in parts {
                        let value = self.evaluate(index, item, part).await?;
                        values.push(value.joined(separator));
                    }
                    FieldValue::Text(compose(&values, separator))
                }
            };
            fields.push(RecordField {
                name: spec.name.clone(),
                value,
            });
        }

        Ok(ExtractedRecord::new(index, fields))
    }

    async fn evaluate<I>(
        &self,
        index: usize,
        item: &I,
        rule: &FieldRule,
    ) -> Result<FieldValue, ItemError>
    where
        I: ItemHandle + ?Sized,
    {
        match item.query(&rule.locator, &rule.read).await {
            Ok(raw) => Ok(rule.finish(raw)),
            Err(err @ SourceError::Stale(_)) => Err(item_failure(index, err)),
            Err(err) => {
                harvest_debug!(
                    "Item {} field {:?} missed: {}",
                    index + 1,
                    rule.locator.css,
                    err
                );
                Ok(rule.default_value())
            }
        }
    }
}

fn item_failure(index: usize, err: SourceError) -> ItemError {
    match err {
        SourceError::Stale(message) => ItemError::stale(index, message),
        other => ItemError::assembly(index, other.to_string()),
    }
}
