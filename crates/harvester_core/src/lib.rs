//! Harvester core: pure pagination state machine and field-extraction rules.
mod pagination;
mod presets;
mod record;
mod schema;

pub use pagination::{
    update, PageAction, PageEvent, PaginationLimits, PaginationState, TerminalReason,
};
pub use presets::trade_show_schema;
pub use record::{ExtractedRecord, FieldValue, ItemError, ItemErrorKind, RecordField};
pub use schema::{
    compose, FieldKind, FieldRule, FieldSpec, Locator, Read, Schema, SchemaError, TextFilter,
    Transform,
};
