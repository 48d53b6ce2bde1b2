use std::fs;
use std::time::Duration;

use harvester_core::{trade_show_schema, FieldValue, Locator, TerminalReason};
use harvester_engine::{
    harvest, DocumentSettings, DocumentSource, FieldExtractor, HarvestSettings, ItemHandle,
    LoadMode, NullProgressSink, RenderedItemSource, SnapshotLoader, SourceError,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use url::Url;

const FULL_CARD: &str = r#"
<div class="cardBox">
  <p class="MuiTypography-body1R"><a href="/tradeshows/dental-expo">Dental Expo 2025</a></p>
  <p class="typo-Body5R">Mon, 12 - Wed, 14 May 2025</p>
  <a href="/tradeshows/dental-expo"><span class="typo-Body4R">Annual dental gathering with 300 exhibitors.....more</span></a>
  <a href="/venue/pragati-maidan">Pragati Maidan</a>
  <span class="cityCountry">New Delhi, India</span>
  <a class="btn-tag-item" href="/medical">Medical</a>
  <span class="btn-tag-item"> </span>
  <span class="btn-tag-item">Dental</span>
  <a href="https://dentalexpo.example/"><p>Website</p></a>
</div>
"#;

const BARE_CARD: &str = r#"
<div class="cardBox">
  <p class="MuiTypography-body1R"><a href="/tradeshows/bare-fair">Bare Fair</a></p>
  <span class="cityCountry">, Berlin</span>
</div>
"#;

fn show_more() -> Locator {
    Locator::css("button").with_descendant_text("span", "Show More Results")
}

fn page(cards: &[&str], more: bool) -> String {
    let button = if more {
        r#"<button class="load"><span>Show More Results</span></button>"#
    } else {
        ""
    };
    format!("<html><body><section>{}</section>{button}</body></html>", cards.concat())
}

fn settings(mode: LoadMode) -> DocumentSettings {
    DocumentSettings {
        item: Locator::css("div.cardBox"),
        trigger: show_more(),
        mode,
    }
}

fn numbered_card(n: usize) -> String {
    format!(
        r#"<div class="cardBox"><p class="body1R"><a href="/tradeshows/show-{n}">Show {n}</a></p></div>"#
    )
}

fn numbered_page(range: std::ops::Range<usize>, more: bool) -> String {
    let cards: Vec<String> = range.map(numbered_card).collect();
    let refs: Vec<&str> = cards.iter().map(String::as_str).collect();
    page(&refs, more)
}

#[tokio::test]
async fn trade_show_card_yields_every_field() {
    let loader = SnapshotLoader::new(vec![page(&[FULL_CARD, BARE_CARD], false)])
        .with_base_url(Url::parse("https://www.example.com/events").unwrap());
    let source = DocumentSource::open(loader, settings(LoadMode::Append))
        .await
        .unwrap();
    let schema = trade_show_schema();
    let extractor = FieldExtractor::new(&schema);
    let items = source.current_items().await.unwrap();
    assert_eq!(items.len(), 2);

    let full = extractor.extract(0, &items[0]).await.unwrap();
    assert_eq!(full.text("name"), Some("Dental Expo 2025"));
    assert_eq!(full.text("date"), Some("Mon, 12 - Wed, 14 May 2025"));
    assert_eq!(
        full.text("description"),
        Some("Annual dental gathering with 300 exhibitors")
    );
    assert_eq!(full.text("location"), Some("Pragati Maidan, New Delhi, India"));
    assert_eq!(
        full.get("tags"),
        Some(&FieldValue::List(vec!["Medical".into(), "Dental".into()]))
    );
    assert_eq!(
        full.text("event_url"),
        Some("https://www.example.com/tradeshows/dental-expo")
    );
    assert_eq!(full.text("organizer_url"), Some("https://dentalexpo.example/"));

    let bare = extractor.extract(1, &items[1]).await.unwrap();
    assert_eq!(bare.index, 1);
    assert_eq!(bare.text("name"), Some("Bare Fair"));
    assert_eq!(bare.text("date"), Some(""));
    assert_eq!(bare.text("description"), Some(""));
    assert_eq!(bare.text("location"), Some("Berlin"));
    assert_eq!(bare.get("tags"), Some(&FieldValue::List(Vec::new())));
    assert_eq!(bare.text("organizer_url"), Some(""));
    assert_eq!(bare.fields().len(), 7);
}

#[tokio::test]
async fn replace_mode_makes_old_handles_stale() {
    let loader = SnapshotLoader::new(vec![numbered_page(0..2, true), numbered_page(0..5, false)]);
    let source = DocumentSource::open(loader, settings(LoadMode::Replace))
        .await
        .unwrap();
    let before = source.current_items().await.unwrap();

    let trigger = source
        .find_trigger(Duration::ZERO)
        .await
        .unwrap()
        .expect("trigger rendered");
    source.activate(&trigger).await.unwrap();

    assert_eq!(source.item_count().await.unwrap(), 5);
    assert!(matches!(
        before[0].ensure_live().await,
        Err(SourceError::Stale(_))
    ));
    let err = source.activate(&trigger).await.unwrap_err();
    assert!(matches!(err, SourceError::Stale(_)));
    assert_eq!(source.find_trigger(Duration::ZERO).await.unwrap(), None);
    assert_eq!(source.pages_loaded(), 2);
}

#[tokio::test(start_paused = true)]
async fn append_mode_harvest_collects_every_page() {
    let loader = SnapshotLoader::new(vec![
        numbered_page(0..3, true),
        numbered_page(3..6, true),
        numbered_page(6..8, false),
    ]);
    let source = DocumentSource::open(loader, settings(LoadMode::Append))
        .await
        .unwrap();

    let report = harvest(
        source,
        &trade_show_schema(),
        &HarvestSettings::default(),
        &NullProgressSink,
    )
    .await;

    assert_eq!(report.terminal_reason(), Some(TerminalReason::NoMoreTrigger));
    let names: Vec<String> = report
        .records
        .iter()
        .map(|record| record.text("name").unwrap().to_string())
        .collect();
    let expected: Vec<String> = (0..8).map(|n| format!("Show {n}")).collect();
    assert_eq!(names, expected);
}

#[tokio::test(start_paused = true)]
async fn replace_mode_harvest_keeps_only_final_render() {
    let loader = SnapshotLoader::new(vec![
        numbered_page(0..2, true),
        numbered_page(0..4, true),
        numbered_page(0..6, false),
    ]);
    let source = DocumentSource::open(loader, settings(LoadMode::Replace))
        .await
        .unwrap();

    let report = harvest(
        source,
        &trade_show_schema(),
        &HarvestSettings::default(),
        &NullProgressSink,
    )
    .await;

    assert_eq!(report.extracted(), 6);
    assert!(report.errors.is_empty());
    assert_eq!(report.pagination.attempts_used(), 2);
}

#[tokio::test]
async fn closed_source_refuses_further_use() {
    let loader = SnapshotLoader::new(vec![numbered_page(0..2, false)]);
    let mut source = DocumentSource::open(loader, settings(LoadMode::Append))
        .await
        .unwrap();
    let items = source.current_items().await.unwrap();

    source.close().await.unwrap();

    assert!(matches!(
        source.current_items().await,
        Err(SourceError::Session(_))
    ));
    assert!(matches!(
        items[1].ensure_live().await,
        Err(SourceError::Stale(_))
    ));
}

#[tokio::test]
async fn invalid_item_selector_is_rejected() {
    let loader = SnapshotLoader::new(vec![numbered_page(0..1, false)]);
    let settings = DocumentSettings {
        item: Locator::css("div[["),
        trigger: show_more(),
        mode: LoadMode::Append,
    };

    let err = DocumentSource::open(loader, settings).await.err().unwrap();
    assert!(matches!(err, SourceError::InvalidLocator { .. }));
}

#[test]
fn snapshot_directory_is_replayed_in_name_order() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("02.html"), "second").unwrap();
    fs::write(temp.path().join("01.html"), "first").unwrap();
    fs::write(temp.path().join("notes.txt"), "ignored").unwrap();

    let loader = SnapshotLoader::from_dir(temp.path()).unwrap();
    assert_eq!(loader.len(), 2);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    runtime.block_on(async {
        use harvester_engine::PageLoader;
        assert_eq!(loader.first().await.unwrap().html, "first");
        assert_eq!(loader.next(None).await.unwrap().unwrap().html, "second");
        assert_eq!(loader.next(None).await.unwrap(), None);
    });
}

#[tokio::test(start_paused = true)]
async fn table_row_items_extract_their_cells() {
    use harvester_core::{FieldRule, FieldSpec, Schema};

    let html = r#"<html><body><table>
        <tr class="row"><td class="name">Fair A</td><td class="city">Pune</td></tr>
        <tr class="row"><td class="name">Fair B</td><td class="city">Surat</td></tr>
    </table></body></html>"#;
    let settings = DocumentSettings {
        item: Locator::css("tr.row"),
        trigger: show_more(),
        mode: LoadMode::Append,
    };
    let source = DocumentSource::open(SnapshotLoader::new(vec![html.to_string()]), settings)
        .await
        .unwrap();
    let schema = Schema::new(vec![
        FieldSpec::rule("name", FieldRule::text(Locator::css("td.name"))),
        FieldSpec::rule("city", FieldRule::text(Locator::css("td.city"))),
    ])
    .unwrap();

    let report = harvest(source, &schema, &HarvestSettings::default(), &NullProgressSink).await;

    assert_eq!(report.items_found, 2);
    assert_eq!(report.records[0].text("name"), Some("Fair A"));
    assert_eq!(report.records[1].text("city"), Some("Surat"));
}
