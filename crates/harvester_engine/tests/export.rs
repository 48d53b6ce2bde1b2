use std::fs;

use harvester_core::{
    trade_show_schema, update, ExtractedRecord, FieldValue, ItemError, PageEvent, PaginationLimits,
    PaginationState, RecordField,
};
use harvester_engine::{
    render_csv, write_records, write_report, ExportFormat, ExportOptions, HarvestReport,
    ReportContext,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn record(index: usize, name: &str, description: &str, tags: &[&str]) -> ExtractedRecord {
    let text = |name: &str, value: &str| RecordField {
        name: name.to_string(),
        value: FieldValue::Text(value.to_string()),
    };
    ExtractedRecord::new(
        index,
        vec![
            text("name", name),
            text("date", "12 May 2025"),
            text("description", description),
            text("location", "Pragati Maidan, New Delhi, India"),
            RecordField {
                name: "tags".to_string(),
                value: FieldValue::List(tags.iter().map(|tag| tag.to_string()).collect()),
            },
            text("event_url", "https://www.example.com/tradeshows/x"),
            text("organizer_url", ""),
        ],
    )
}

#[test]
fn csv_has_titled_header_and_quoted_cells() {
    let records = vec![
        record(0, "Dental Expo", "Says \"hello\"", &["Medical", "Dental"]),
        record(1, "Plain", "Nothing special", &[]),
    ];

    let csv = render_csv(&trade_show_schema(), &records, &ExportOptions::default()).unwrap();
    let csv = String::from_utf8(csv).unwrap();

    let expected = "\
Event Name,Date,Description,Location,Tags,Event URL,Organizer Website
Dental Expo,12 May 2025,\"Says \"\"hello\"\"\",\"Pragati Maidan, New Delhi, India\",\"Medical, Dental\",https://www.example.com/tradeshows/x,
Plain,12 May 2025,Nothing special,\"Pragati Maidan, New Delhi, India\",,https://www.example.com/tradeshows/x,
";
    assert_eq!(csv, expected);
}

#[test]
fn csv_separator_is_configurable_and_written_to_disk() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("events.csv");
    let options = ExportOptions {
        separator: b';',
        ..ExportOptions::default()
    };

    let summary = write_records(
        &path,
        &trade_show_schema(),
        &[record(0, "Expo; Day 1", "d", &["Medical", "Dental"])],
        &options,
    )
    .unwrap();

    let written = fs::read_to_string(&summary.output_path).unwrap();
    let mut lines = written.lines();
    assert_eq!(
        lines.next(),
        Some("Event Name;Date;Description;Location;Tags;Event URL;Organizer Website")
    );
    assert_eq!(
        lines.next(),
        Some(concat!(
            "\"Expo; Day 1\";12 May 2025;d;Pragati Maidan, New Delhi, India;",
            "Medical, Dental;https://www.example.com/tradeshows/x;"
        ))
    );
    assert_eq!(lines.next(), None);
}

#[test]
fn json_records_keep_lists_as_arrays() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("events.json");
    let options = ExportOptions {
        format: ExportFormat::Json,
        ..ExportOptions::default()
    };

    let summary = write_records(
        &path,
        &trade_show_schema(),
        &[record(0, "Dental Expo", "d", &["Medical"])],
        &options,
    )
    .unwrap();

    assert_eq!(summary.record_count, 1);
    let value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&summary.output_path).unwrap()).unwrap();
    assert_eq!(value[0]["name"], "Dental Expo");
    assert_eq!(value[0]["tags"], serde_json::json!(["Medical"]));
}

#[test]
fn report_lists_counts_reason_and_errors() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("report.json");
    let (state, _) = PaginationState::start(4, PaginationLimits::default());
    let (state, _) = update(state, PageEvent::TransientFailure);
    let (state, _) = update(state, PageEvent::TriggerMissing);
    let report = HarvestReport {
        records: vec![record(0, "a", "", &[]), record(2, "c", "", &[])],
        errors: vec![ItemError::stale(1, "detached")],
        pagination: state,
        items_found: 3,
        collection_error: None,
    };
    let context = ReportContext {
        listing: "https://www.example.com/events".to_string(),
        started_utc: "2025-05-01T10:00:00Z".to_string(),
        finished_utc: "2025-05-01T10:02:00Z".to_string(),
    };

    write_report(&path, &report, &context).unwrap();

    let value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value["items_found"], 3);
    assert_eq!(value["extracted"], 2);
    assert_eq!(value["failed"], 1);
    assert_eq!(value["terminal_reason"], "no_more_trigger");
    assert_eq!(value["transient_retries"], 1);
    assert_eq!(value["errors"][0]["index"], 1);
    assert_eq!(value["errors"][0]["kind"], "stale");
    assert_eq!(value["started_utc"], "2025-05-01T10:00:00Z");
}
