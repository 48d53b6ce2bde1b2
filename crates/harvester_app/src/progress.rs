use std::sync::atomic::{AtomicU32, Ordering};

use harvester_engine::{HarvestEvent, ProgressSink};

/// Prints run milestones to stdout while the log file gets the detail.
#[derive(Debug, Default)]
pub struct ConsoleProgress {
    last_attempt: AtomicU32,
}

impl ProgressSink for ConsoleProgress {
    fn emit(&self, event: HarvestEvent) {
        match event {
            HarvestEvent::InterstitialDismissed => println!("Accepted consent banner"),
            HarvestEvent::Pagination(state) => {
                let attempts = state.attempts_used();
                if self.last_attempt.swap(attempts, Ordering::Relaxed) != attempts {
                    println!(
                        "Clicked load more ({attempts} times). Items loaded: {}",
                        state.observed_count()
                    );
                }
            }
            HarvestEvent::PaginationFinished {
                reason,
                observed_count,
            } => println!("Pagination finished ({reason}). Total items loaded: {observed_count}"),
            HarvestEvent::ItemsProcessed { processed, total } => {
                println!("Processed {processed}/{total} items")
            }
            HarvestEvent::ItemFailed(err) => println!("Error processing {err}"),
            HarvestEvent::Finished { .. } => {}
        }
    }
}
