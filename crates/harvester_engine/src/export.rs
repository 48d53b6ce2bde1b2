use std::path::{Path, PathBuf};

use harvest_logging::harvest_info;
use harvester_core::{ExtractedRecord, FieldValue, Schema};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::persist::{AtomicFileWriter, PersistError};
use crate::pipeline::HarvestReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub format: ExportFormat,
    /// Joins list values (tags) into one CSV cell.
    pub list_delimiter: String,
    /// Field delimiter byte between CSV cells.
    pub separator: u8,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: ExportFormat::Csv,
            list_delimiter: ", ".to_string(),
            separator: b',',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub record_count: usize,
    pub output_path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Run details the engine does not track itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportContext {
    pub listing: String,
    pub started_utc: String,
    pub finished_utc: String,
}

pub fn write_records(
    path: &Path,
    schema: &Schema,
    records: &[ExtractedRecord],
    options: &ExportOptions,
) -> Result<ExportSummary, ExportError> {
    let content = match options.format {
        ExportFormat::Csv => render_csv(schema, records, options)?,
        ExportFormat::Json => serde_json::to_vec_pretty(&records_json(records))?,
    };
    let output_path = AtomicFileWriter::new(path.to_path_buf()).write(&content)?;
    harvest_info!("Wrote {} records to {}", records.len(), output_path.display());
    Ok(ExportSummary {
        record_count: records.len(),
        output_path,
    })
}

pub fn write_report(
    path: &Path,
    report: &HarvestReport,
    context: &ReportContext,
) -> Result<PathBuf, ExportError> {
    let content = serde_json::to_string_pretty(&report_json(report, context))?;
    let written = AtomicFileWriter::new(path.to_path_buf()).write(content.as_bytes())?;
    harvest_info!("Wrote harvest report to {}", written.display());
    Ok(written)
}

/// Header row of column titles, then one row per record in schema order.
pub fn render_csv(
    schema: &Schema,
    records: &[ExtractedRecord],
    options: &ExportOptions,
) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(options.separator)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(schema.titles())?;
    for record in records {
        writer.write_record(record.to_row(&options.list_delimiter))?;
    }
    writer
        .into_inner()
        .map_err(|err| ExportError::Csv(csv::Error::from(err.into_error())))
}

pub fn records_json(records: &[ExtractedRecord]) -> Value {
    Value::Array(
        records
            .iter()
            .map(|record| {
                let object: Map<String, Value> = record
                    .fields()
                    .iter()
                    .map(|field| (field.name.clone(), value_json(&field.value)))
                    .collect();
                Value::Object(object)
            })
            .collect(),
    )
}

pub fn report_json(report: &HarvestReport, context: &ReportContext) -> Value {
    let pagination = &report.pagination;
    json!({
        "listing": context.listing,
        "started_utc": context.started_utc,
        "finished_utc": context.finished_utc,
        "items_found": report.items_found,
        "extracted": report.extracted(),
        "failed": report.errors.len(),
        "terminal_reason": report.terminal_reason().map(|reason| reason.as_str()),
        "attempts": pagination.attempts_used(),
        "transient_retries": pagination.transient_retries(),
        "pagination_error": pagination.last_error(),
        "collection_error": report.collection_error,
        "errors": report.errors.iter().map(|err| {
            json!({
                "index": err.index,
                "kind": err.kind,
                "message": err.message,
            })
        }).collect::<Vec<_>>(),
    })
}

fn value_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Text(text) => Value::String(text.clone()),
        FieldValue::List(items) => Value::Array(items.iter().cloned().map(Value::String).collect()),
    }
}
