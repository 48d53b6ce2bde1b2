//! Convergence logic for "load more" pagination.
//!
//! The engine performs the IO (counting items, clicking the trigger, waiting)
//! and reports what happened as a [`PageEvent`]; [`update`] decides what to do
//! next. Every event either terminates the run, consumes an attempt, or
//! consumes a bounded transient retry, so a run always ends.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationLimits {
    /// Successful trigger invocations allowed per run.
    pub max_attempts: u32,
    /// Transient failures tolerated in a row before giving up on the trigger.
    pub max_transient_retries: u32,
}

impl Default for PaginationLimits {
    fn default() -> Self {
        Self {
            max_attempts: 50,
            max_transient_retries: 5,
        }
    }
}

/// Why pagination stopped. None of these abort the harvest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    /// The trigger was absent; the normal end of the list.
    NoMoreTrigger,
    /// Items did not grow within the wait after a trigger.
    LoadTimeout,
    /// Two triggers in a row produced no new items.
    NoGrowth,
    /// The attempt budget ran out.
    AttemptsExhausted,
    /// Transient interaction failures exceeded the retry cap.
    TriggerUnstable,
    /// The source failed in a way retrying cannot fix.
    SourceFailure,
}

impl TerminalReason {
    pub fn as_str(self) -> &'static str {
        match self {
            TerminalReason::NoMoreTrigger => "no_more_trigger",
            TerminalReason::LoadTimeout => "load_timeout",
            TerminalReason::NoGrowth => "no_growth",
            TerminalReason::AttemptsExhausted => "attempts_exhausted",
            TerminalReason::TriggerUnstable => "trigger_unstable",
            TerminalReason::SourceFailure => "source_failure",
        }
    }
}

impl fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one load-more step as observed by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    /// The trigger was not found within the bounded wait.
    TriggerMissing,
    /// The trigger was intercepted or went stale mid-interaction.
    TransientFailure,
    /// The trigger fired but the item count never rose within the wait.
    LoadTimedOut,
    /// The trigger fired and the wait completed.
    Loaded {
        count_before: usize,
        count_after: usize,
    },
    SourceFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageAction {
    LoadMore,
    RetryAfterBackoff,
    Stop(TerminalReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationState {
    limits: PaginationLimits,
    observed_count: usize,
    consecutive_no_growth: bool,
    attempts_used: u32,
    step_retries: u32,
    total_retries: u32,
    terminal_reason: Option<TerminalReason>,
    last_error: Option<String>,
}

impl PaginationState {
    /// Begins a run over a source currently showing `initial_count` items.
    pub fn start(initial_count: usize, limits: PaginationLimits) -> (Self, PageAction) {
        let mut state = Self {
            limits,
            observed_count: initial_count,
            consecutive_no_growth: false,
            attempts_used: 0,
            step_retries: 0,
            total_retries: 0,
            terminal_reason: None,
            last_error: None,
        };
        let action = if limits.max_attempts == 0 {
            state.terminate(TerminalReason::AttemptsExhausted)
        } else {
            PageAction::LoadMore
        };
        (state, action)
    }

    pub fn limits(&self) -> PaginationLimits {
        self.limits
    }

    pub fn observed_count(&self) -> usize {
        self.observed_count
    }

    pub fn consecutive_no_growth(&self) -> bool {
        self.consecutive_no_growth
    }

    pub fn attempts_used(&self) -> u32 {
        self.attempts_used
    }

    /// Transient retries spent over the whole run.
    pub fn transient_retries(&self) -> u32 {
        self.total_retries
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal_reason.is_some()
    }

    pub fn terminal_reason(&self) -> Option<TerminalReason> {
        self.terminal_reason
    }

    /// Message of the source failure that ended the run, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn terminate(&mut self, reason: TerminalReason) -> PageAction {
        self.terminal_reason = Some(reason);
        PageAction::Stop(reason)
    }
}

/// Pure transition: applies an observed event and returns the next action.
///
/// Once terminal, the state is frozen and every further event yields the
/// same `Stop`.
pub fn update(mut state: PaginationState, event: PageEvent) -> (PaginationState, PageAction) {
    if let Some(reason) = state.terminal_reason {
        return (state, PageAction::Stop(reason));
    }

    let action = match event {
        PageEvent::TriggerMissing => state.terminate(TerminalReason::NoMoreTrigger),
        PageEvent::LoadTimedOut => state.terminate(TerminalReason::LoadTimeout),
        PageEvent::SourceFailed(message) => {
            state.last_error = Some(message);
            state.terminate(TerminalReason::SourceFailure)
        }
        PageEvent::TransientFailure => {
            state.step_retries += 1;
            state.total_retries += 1;
            if state.step_retries > state.limits.max_transient_retries {
                state.terminate(TerminalReason::TriggerUnstable)
            } else {
                PageAction::RetryAfterBackoff
            }
        }
        PageEvent::Loaded {
            count_before,
            count_after,
        } => {
            state.step_retries = 0;
            state.attempts_used += 1;
            state.observed_count = state.observed_count.max(count_after);

            let grew = count_after > count_before;
            if !grew && state.consecutive_no_growth {
                state.terminate(TerminalReason::NoGrowth)
            } else {
                state.consecutive_no_growth = !grew;
                if state.attempts_used >= state.limits.max_attempts {
                    state.terminate(TerminalReason::AttemptsExhausted)
                } else {
                    PageAction::LoadMore
                }
            }
        }
    };

    (state, action)
}
