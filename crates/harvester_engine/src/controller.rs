use std::time::Duration;

use harvest_logging::{harvest_debug, harvest_info, harvest_warn};
use harvester_core::{update, PageAction, PageEvent, PaginationLimits, PaginationState};

use crate::source::{RenderedItemSource, SourceError};
use crate::types::{HarvestEvent, ProgressSink};

#[derive(Debug, Clone)]
pub struct PaginationSettings {
    pub limits: PaginationLimits,
    /// How long to look for a clickable trigger before concluding there is none.
    pub trigger_wait: Duration,
    /// How long to wait for the item count to rise after a trigger.
    pub growth_timeout: Duration,
    pub poll_interval: Duration,
    /// Fixed delay before retrying after a transient failure.
    pub backoff: Duration,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            limits: PaginationLimits::default(),
            trigger_wait: Duration::from_secs(15),
            growth_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_millis(250),
            backoff: Duration::from_secs(2),
        }
    }
}

/// Drives a [`RenderedItemSource`] through load-more steps until the
/// pagination state machine reports a terminal reason.
#[derive(Debug, Clone, Default)]
pub struct PaginationController {
    settings: PaginationSettings,
}

impl PaginationController {
    pub fn new(settings: PaginationSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PaginationSettings {
        &self.settings
    }

    pub async fn run<S>(&self, source: &S, sink: &dyn ProgressSink) -> PaginationState
    where
        S: RenderedItemSource,
    {
        let (mut state, mut action, initial_error) = match source.item_count().await {
            Ok(count) => {
                let (state, action) = PaginationState::start(count, self.settings.limits);
                (state, action, None)
            }
            Err(err) => {
                let (state, action) = PaginationState::start(0, self.settings.limits);
                (state, action, Some(err))
            }
        };
        harvest_info!(
            "Pagination starting with {} items (max {} attempts)",
            state.observed_count(),
            self.settings.limits.max_attempts
        );

        if let Some(err) = initial_error {
            harvest_warn!("Could not count items before paginating: {}", err);
            (state, action) = update(state, PageEvent::SourceFailed(err.to_string()));
        }

        loop {
            let event = match action {
                PageAction::Stop(reason) => {
                    harvest_info!(
                        "Pagination stopped: {} after {} attempts, {} items",
                        reason,
                        state.attempts_used(),
                        state.observed_count()
                    );
                    sink.emit(HarvestEvent::PaginationFinished {
                        reason,
                        observed_count: state.observed_count(),
                    });
                    return state;
                }
                PageAction::RetryAfterBackoff => {
                    harvest_debug!(
                        "Transient trigger failure, retrying in {:?}",
                        self.settings.backoff
                    );
                    tokio::time::sleep(self.settings.backoff).await;
                    self.load_more(source).await
                }
                PageAction::LoadMore => self.load_more(source).await,
            };

            if let PageEvent::Loaded {
                count_before,
                count_after,
            } = &event
            {
                harvest_info!(
                    "Load more #{}: items {} -> {}",
                    state.attempts_used() + 1,
                    count_before,
                    count_after
                );
            }
            (state, action) = update(state, event);
            sink.emit(HarvestEvent::Pagination(state.clone()));
        }
    }

    /// Performs one trigger-and-wait step and reports what happened.
    async fn load_more<S>(&self, source: &S) -> PageEvent
    where
        S: RenderedItemSource,
    {
        let count_before = match source.item_count().await {
            Ok(count) => count,
            Err(err) => return failure_event(err),
        };

        let trigger = match source.find_trigger(self.settings.trigger_wait).await {
            Ok(Some(trigger)) => trigger,
            Ok(None) => return PageEvent::TriggerMissing,
            Err(err) => return failure_event(err),
        };

        if let Err(err) = source.activate(&trigger).await {
            return failure_event(err);
        }

        let grew = source
            .wait_for_count(
                &|count| count > count_before,
                self.settings.growth_timeout,
                self.settings.poll_interval,
            )
            .await;
        if !grew {
            return PageEvent::LoadTimedOut;
        }

        match source.item_count().await {
            Ok(count_after) => PageEvent::Loaded {
                count_before,
                count_after,
            },
            Err(err) => failure_event(err),
        }
    }
}

fn failure_event(err: SourceError) -> PageEvent {
    if err.is_transient() {
        harvest_warn!("Transient source failure: {}", err);
        PageEvent::TransientFailure
    } else {
        harvest_warn!("Source failure during pagination: {}", err);
        PageEvent::SourceFailed(err.to_string())
    }
}
