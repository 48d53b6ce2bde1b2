use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use harvest_logging::{harvest_info, harvest_warn};
use harvester_core::{ExtractedRecord, ItemError, Locator, PaginationState, Schema, TerminalReason};

use crate::controller::{PaginationController, PaginationSettings};
use crate::extract::FieldExtractor;
use crate::source::RenderedItemSource;
use crate::types::{HarvestEvent, ProgressSink};

#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub pagination: PaginationSettings,
    /// Overlay to dismiss before paginating, e.g. a cookie banner.
    pub interstitial: Option<Locator>,
    pub interstitial_wait: Duration,
    /// Report extraction progress every this many items.
    pub progress_every: usize,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            pagination: PaginationSettings::default(),
            interstitial: None,
            interstitial_wait: Duration::from_secs(10),
            progress_every: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestReport {
    pub records: Vec<ExtractedRecord>,
    pub errors: Vec<ItemError>,
    pub pagination: PaginationState,
    /// Items present when extraction started.
    pub items_found: usize,
    /// Set when the final item list could not be read at all.
    pub collection_error: Option<String>,
}

impl HarvestReport {
    pub fn terminal_reason(&self) -> Option<TerminalReason> {
        self.pagination.terminal_reason()
    }

    pub fn extracted(&self) -> usize {
        self.records.len()
    }
}

/// Paginates `source` to convergence, extracts one record per item in
/// document order, and closes the source.
///
/// Never fails: pagination problems end up in the terminal reason and item
/// problems in the error log. The source is closed on every path, including
/// when a panic unwinds out of the harvest.
pub async fn harvest<S>(
    mut source: S,
    schema: &Schema,
    settings: &HarvestSettings,
    sink: &dyn ProgressSink,
) -> HarvestReport
where
    S: RenderedItemSource,
{
    let outcome = AssertUnwindSafe(run_harvest(&source, schema, settings, sink))
        .catch_unwind()
        .await;

    if let Err(err) = source.close().await {
        harvest_warn!("Failed to close source: {}", err);
    }

    match outcome {
        Ok(report) => report,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

async fn run_harvest<S>(
    source: &S,
    schema: &Schema,
    settings: &HarvestSettings,
    sink: &dyn ProgressSink,
) -> HarvestReport
where
    S: RenderedItemSource,
{
    if let Some(locator) = &settings.interstitial {
        match source
            .dismiss_interstitial(locator, settings.interstitial_wait)
            .await
        {
            Ok(true) => {
                harvest_info!("Dismissed interstitial {:?}", locator.css);
                sink.emit(HarvestEvent::InterstitialDismissed);
            }
            Ok(false) => harvest_info!("No interstitial found"),
            Err(err) => harvest_warn!("Interstitial dismissal failed: {}", err),
        }
    }

    let controller = PaginationController::new(settings.pagination.clone());
    let pagination = controller.run(source, sink).await;

    let items = match source.current_items().await {
        Ok(items) => items,
        Err(err) => {
            harvest_warn!("Could not read the final item list: {}", err);
            sink.emit(HarvestEvent::Finished {
                extracted: 0,
                failed: 0,
            });
            return HarvestReport {
                records: Vec::new(),
                errors: Vec::new(),
                pagination,
                items_found: 0,
                collection_error: Some(err.to_string()),
            };
        }
    };

    let total = items.len();
    harvest_info!("Extracting data from {} items", total);

    let extractor = FieldExtractor::new(schema);
    let every = settings.progress_every.max(1);
    let mut records = Vec::with_capacity(total);
    let mut errors = Vec::new();

    for (index, item) in items.iter().enumerate() {
        let outcome = AssertUnwindSafe(extractor.extract(index, item))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ItemError::assembly(index, panic_message(&*panic))));

        match outcome {
            Ok(record) => records.push(record),
            Err(err) => {
                harvest_warn!("Skipping {}", err);
                sink.emit(HarvestEvent::ItemFailed(err.clone()));
                errors.push(err);
            }
        }

        let processed = index + 1;
        if processed % every == 0 || processed == total {
            harvest_info!("Processed {}/{} items", processed, total);
            sink.emit(HarvestEvent::ItemsProcessed { processed, total });
        }
    }

    harvest_info!(
        "Extracted {} records from {} items ({} failed)",
        records.len(),
        total,
        errors.len()
    );
    sink.emit(HarvestEvent::Finished {
        extracted: records.len(),
        failed: errors.len(),
    });

    HarvestReport {
        records,
        errors,
        pagination,
        items_found: total,
        collection_error: None,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}
