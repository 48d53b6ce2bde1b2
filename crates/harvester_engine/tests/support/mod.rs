#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use harvester_core::{Locator, Read};
use harvester_engine::{HarvestEvent, ItemHandle, ProgressSink, RenderedItemSource, SourceError};

/// An in-memory listing that renders `batches[0]` items up front and one
/// more batch per trigger activation.
pub struct ScriptedSource {
    batches: Vec<usize>,
    endless: Option<usize>,
    stalled: bool,
    flicker: bool,
    stale: HashSet<usize>,
    panicking: HashSet<usize>,
    activate_errors: Mutex<VecDeque<SourceError>>,
    find_errors: Mutex<VecDeque<SourceError>>,
    count_errors: Mutex<VecDeque<SourceError>>,
    items_error: Option<SourceError>,
    has_interstitial: bool,
    state: Mutex<ScriptState>,
    pub closed: Arc<AtomicBool>,
    pub activations: Arc<AtomicUsize>,
}

#[derive(Default)]
struct ScriptState {
    rendered: usize,
    next_batch: usize,
    flash: bool,
    counted: bool,
}

impl ScriptedSource {
    pub fn new(batches: Vec<usize>) -> Self {
        let rendered = batches.first().copied().unwrap_or(0);
        Self {
            batches,
            endless: None,
            stalled: false,
            flicker: false,
            stale: HashSet::new(),
            panicking: HashSet::new(),
            activate_errors: Mutex::new(VecDeque::new()),
            find_errors: Mutex::new(VecDeque::new()),
            count_errors: Mutex::new(VecDeque::new()),
            items_error: None,
            has_interstitial: false,
            state: Mutex::new(ScriptState {
                rendered,
                next_batch: 1,
                flash: false,
                counted: false,
            }),
            closed: Arc::new(AtomicBool::new(false)),
            activations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Once the batches run out, keep offering a trigger that adds `per_click` items.
    pub fn endless(mut self, per_click: usize) -> Self {
        self.endless = Some(per_click);
        self
    }

    /// The trigger is always there but clicking it renders nothing.
    pub fn stalled(mut self) -> Self {
        self.stalled = true;
        self
    }

    /// Each click makes the count rise briefly and then fall back.
    pub fn flickering(mut self) -> Self {
        self.flicker = true;
        self
    }

    pub fn with_stale_items(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.stale.extend(indices);
        self
    }

    pub fn with_panicking_items(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.panicking.extend(indices);
        self
    }

    pub fn with_activate_errors(self, errors: impl IntoIterator<Item = SourceError>) -> Self {
        self.activate_errors.lock().unwrap().extend(errors);
        self
    }

    pub fn with_find_errors(self, errors: impl IntoIterator<Item = SourceError>) -> Self {
        self.find_errors.lock().unwrap().extend(errors);
        self
    }

    /// Errors for `item_count` calls after the initial count.
    pub fn with_count_errors(self, errors: impl IntoIterator<Item = SourceError>) -> Self {
        self.count_errors.lock().unwrap().extend(errors);
        self
    }

    pub fn with_items_error(mut self, error: SourceError) -> Self {
        self.items_error = Some(error);
        self
    }

    pub fn with_interstitial(mut self) -> Self {
        self.has_interstitial = true;
        self
    }

    fn has_more(&self, state: &ScriptState) -> bool {
        state.next_batch < self.batches.len()
            || self.endless.is_some()
            || self.stalled
            || self.flicker
    }
}

pub struct ScriptedItem {
    index: usize,
    stale: bool,
    panics: bool,
}

#[async_trait]
impl ItemHandle for ScriptedItem {
    async fn ensure_live(&self) -> Result<(), SourceError> {
        if self.stale {
            Err(SourceError::Stale(format!("item {} detached", self.index)))
        } else {
            Ok(())
        }
    }

    async fn query(&self, locator: &Locator, _read: &Read) -> Result<Vec<String>, SourceError> {
        if self.panics {
            panic!("item {} exploded", self.index);
        }
        Ok(match locator.css.as_str() {
            "h3" => vec![format!("Event {}", self.index)],
            "a.tag" => vec!["Tech".to_string(), " ".to_string(), "Expo".to_string()],
            "p.broken" => return Err(SourceError::NotFound(locator.css.clone())),
            _ => Vec::new(),
        })
    }
}

#[async_trait]
impl RenderedItemSource for ScriptedSource {
    type Item = ScriptedItem;
    type Trigger = ();

    async fn current_items(&self) -> Result<Vec<ScriptedItem>, SourceError> {
        if let Some(err) = &self.items_error {
            return Err(err.clone());
        }
        let rendered = self.state.lock().unwrap().rendered;
        Ok((0..rendered)
            .map(|index| ScriptedItem {
                index,
                stale: self.stale.contains(&index),
                panics: self.panicking.contains(&index),
            })
            .collect())
    }

    async fn item_count(&self) -> Result<usize, SourceError> {
        let mut state = self.state.lock().unwrap();
        if state.counted {
            if let Some(err) = self.count_errors.lock().unwrap().pop_front() {
                return Err(err);
            }
        }
        state.counted = true;
        if state.flash {
            state.flash = false;
            return Ok(state.rendered + 1);
        }
        Ok(state.rendered)
    }

    async fn find_trigger(&self, _wait: Duration) -> Result<Option<()>, SourceError> {
        if let Some(err) = self.find_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        let state = self.state.lock().unwrap();
        Ok(self.has_more(&state).then_some(()))
    }

    async fn activate(&self, _trigger: &()) -> Result<(), SourceError> {
        if let Some(err) = self.activate_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.activations.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if self.stalled {
            return Ok(());
        }
        if self.flicker {
            state.flash = true;
            return Ok(());
        }
        if let Some(&batch) = self.batches.get(state.next_batch) {
            state.rendered += batch;
            state.next_batch += 1;
        } else if let Some(per_click) = self.endless {
            state.rendered += per_click;
        }
        Ok(())
    }

    async fn dismiss_interstitial(
        &self,
        _locator: &Locator,
        _wait: Duration,
    ) -> Result<bool, SourceError> {
        Ok(self.has_interstitial)
    }

    async fn close(&mut self) -> Result<(), SourceError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<HarvestEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<HarvestEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: HarvestEvent) {
        self.events.lock().unwrap().push(event);
    }
}
