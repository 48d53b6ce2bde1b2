//! Harvester engine: drives a rendered listing to convergence and turns its
//! items into records.
mod controller;
mod document;
mod export;
mod extract;
mod fetch;
mod locate;
mod persist;
mod pipeline;
mod source;
mod types;

pub use controller::{PaginationController, PaginationSettings};
pub use document::{
    DocumentItem, DocumentSettings, DocumentSource, DocumentTrigger, LoadMode, LoadedPage,
    PageLoader, SnapshotLoader,
};
pub use export::{
    records_json, render_csv, report_json, write_records, write_report, ExportError, ExportFormat,
    ExportOptions, ExportSummary, ReportContext,
};
pub use extract::FieldExtractor;
pub use fetch::{FailureKind, FetchError, FetchSettings, HttpPageLoader};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use pipeline::{harvest, HarvestReport, HarvestSettings};
pub use source::{ItemHandle, RenderedItemSource, SourceError};
pub use types::{HarvestEvent, NullProgressSink, ProgressSink};
