use harvester_core::{ItemError, PaginationState, TerminalReason};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestEvent {
    InterstitialDismissed,
    /// Emitted after every pagination step.
    Pagination(PaginationState),
    PaginationFinished {
        reason: TerminalReason,
        observed_count: usize,
    },
    /// Emitted at batch boundaries and after the last item.
    ItemsProcessed { processed: usize, total: usize },
    ItemFailed(ItemError),
    Finished { extracted: usize, failed: usize },
}

/// Observability hook; never influences control flow.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: HarvestEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn emit(&self, _event: HarvestEvent) {}
}
