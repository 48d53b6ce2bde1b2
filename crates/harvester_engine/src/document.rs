//! A [`RenderedItemSource`] over rendered HTML documents.
//!
//! Pages come from a [`PageLoader`]: recorded snapshots replayed in order, or
//! server-rendered pages fetched over HTTP by following the trigger's link.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use harvest_logging::{harvest_debug, harvest_info};
use harvester_core::{Locator, Read};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::locate::{self, ItemMarkup};
use crate::source::{ItemHandle, RenderedItemSource, SourceError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedPage {
    pub html: String,
    /// Base for resolving relative links.
    pub url: Option<Url>,
}

#[async_trait]
pub trait PageLoader: Send + Sync {
    async fn first(&self) -> Result<LoadedPage, SourceError>;

    /// Loads what the trigger points at. `Ok(None)` means the trigger led
    /// nowhere and nothing new was rendered.
    async fn next(&self, href: Option<&str>) -> Result<Option<LoadedPage>, SourceError>;
}

/// How a newly loaded page relates to what is already rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// The page holds only the next batch of items.
    #[default]
    Append,
    /// The page is a full re-render holding every item so far; handles to
    /// the previous render go stale.
    Replace,
}

#[derive(Debug, Clone)]
pub struct DocumentSettings {
    pub item: Locator,
    pub trigger: Locator,
    pub mode: LoadMode,
}

#[derive(Debug)]
struct ItemSlot {
    markup: ItemMarkup,
    base: Option<Url>,
    live: AtomicBool,
}

#[derive(Debug, Default)]
struct DocumentState {
    items: Vec<Arc<ItemSlot>>,
    last_page: Option<LoadedPage>,
    generation: u64,
    pages_loaded: usize,
    closed: bool,
}

pub struct DocumentSource<L> {
    loader: L,
    settings: DocumentSettings,
    state: Mutex<DocumentState>,
}

impl<L: PageLoader> DocumentSource<L> {
    /// Loads the first page and indexes its items.
    pub async fn open(loader: L, settings: DocumentSettings) -> Result<Self, SourceError> {
        locate::parse_selector(&settings.item.css)?;
        locate::parse_selector(&settings.trigger.css)?;

        let first = loader.first().await?;
        let source = Self {
            loader,
            settings,
            state: Mutex::new(DocumentState::default()),
        };
        source.ingest(first)?;
        Ok(source)
    }

    pub fn pages_loaded(&self) -> usize {
        self.lock().pages_loaded
    }

    fn lock(&self) -> MutexGuard<'_, DocumentState> {
        // A poisoned lock only means another call panicked mid-update; the
        // item list is still usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ingest(&self, page: LoadedPage) -> Result<(), SourceError> {
        let found = locate::extract_items(&page.html, &self.settings.item)?;
        let mut state = self.lock();

        if self.settings.mode == LoadMode::Replace {
            for slot in state.items.drain(..) {
                slot.live.store(false, Ordering::Release);
            }
        }
        let added = found.len();
        state.items.extend(found.into_iter().map(|markup| {
            Arc::new(ItemSlot {
                markup,
                base: page.url.clone(),
                live: AtomicBool::new(true),
            })
        }));
        state.generation += 1;
        state.pages_loaded += 1;
        state.last_page = Some(page);

        harvest_debug!(
            "Loaded page {} with {} items ({} total)",
            state.pages_loaded,
            added,
            state.items.len()
        );
        Ok(())
    }

    fn ensure_open(state: &DocumentState) -> Result<(), SourceError> {
        if state.closed {
            Err(SourceError::Session("document source is closed".into()))
        } else {
            Ok(())
        }
    }
}

/// Points at the trigger found in a particular render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentTrigger {
    href: Option<String>,
    generation: u64,
}

#[derive(Debug, Clone)]
pub struct DocumentItem {
    slot: Arc<ItemSlot>,
}

#[async_trait]
impl ItemHandle for DocumentItem {
    async fn ensure_live(&self) -> Result<(), SourceError> {
        if self.slot.live.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(SourceError::Stale("item was re-rendered".into()))
        }
    }

    async fn query(&self, locator: &Locator, read: &Read) -> Result<Vec<String>, SourceError> {
        self.ensure_live().await?;
        locate::query_item(&self.slot.markup, locator, read, self.slot.base.as_ref())
    }
}

#[async_trait]
impl<L: PageLoader> RenderedItemSource for DocumentSource<L> {
    type Item = DocumentItem;
    type Trigger = DocumentTrigger;

    async fn current_items(&self) -> Result<Vec<DocumentItem>, SourceError> {
        let state = self.lock();
        Self::ensure_open(&state)?;
        Ok(state
            .items
            .iter()
            .map(|slot| DocumentItem { slot: slot.clone() })
            .collect())
    }

    async fn item_count(&self) -> Result<usize, SourceError> {
        let state = self.lock();
        Self::ensure_open(&state)?;
        Ok(state.items.len())
    }

    // Static documents do not change while we wait, so this never blocks.
    async fn find_trigger(&self, _wait: Duration) -> Result<Option<DocumentTrigger>, SourceError> {
        let state = self.lock();
        Self::ensure_open(&state)?;
        let Some(page) = &state.last_page else {
            return Ok(None);
        };
        let found = locate::find_first(&page.html, &self.settings.trigger, page.url.as_ref())?;
        Ok(found.map(|href| DocumentTrigger {
            href,
            generation: state.generation,
        }))
    }

    async fn activate(&self, trigger: &DocumentTrigger) -> Result<(), SourceError> {
        {
            let state = self.lock();
            Self::ensure_open(&state)?;
            if state.generation != trigger.generation {
                return Err(SourceError::Stale("trigger belongs to an older render".into()));
            }
        }

        match self.loader.next(trigger.href.as_deref()).await? {
            Some(page) => self.ingest(page),
            None => {
                harvest_debug!("Trigger {:?} led nowhere", trigger.href);
                Ok(())
            }
        }
    }

    async fn close(&mut self) -> Result<(), SourceError> {
        let mut state = self.lock();
        for slot in &state.items {
            slot.live.store(false, Ordering::Release);
        }
        state.closed = true;
        harvest_info!("Closed document source after {} pages", state.pages_loaded);
        Ok(())
    }
}

/// Replays recorded renders of a listing in order.
#[derive(Debug)]
pub struct SnapshotLoader {
    pages: Vec<LoadedPage>,
    cursor: AtomicUsize,
}

impl SnapshotLoader {
    pub fn new(pages: Vec<String>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|html| LoadedPage { html, url: None })
                .collect(),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn with_base_url(mut self, url: Url) -> Self {
        for page in &mut self.pages {
            page.url = Some(url.clone());
        }
        self
    }

    /// Reads every `*.html` file in `dir`, ordered by file name.
    pub fn from_dir(dir: &Path) -> Result<Self, SourceError> {
        let read_err = |err: std::io::Error| SourceError::Load(format!("{}: {err}", dir.display()));
        let mut paths: Vec<_> = fs::read_dir(dir)
            .map_err(read_err)?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.is_file())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("html"))
            })
            .collect();
        paths.sort();

        let pages = paths
            .iter()
            .map(|path| {
                fs::read_to_string(path)
                    .map_err(|err| SourceError::Load(format!("{}: {err}", path.display())))
            })
            .collect::<Result<Vec<_>, _>>()?;
        harvest_info!("Found {} snapshots in {}", pages.len(), dir.display());
        Ok(Self::new(pages))
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

#[async_trait]
impl PageLoader for SnapshotLoader {
    async fn first(&self) -> Result<LoadedPage, SourceError> {
        self.cursor.store(1, Ordering::SeqCst);
        self.pages
            .first()
            .cloned()
            .ok_or_else(|| SourceError::Load("no snapshots to replay".into()))
    }

    async fn next(&self, _href: Option<&str>) -> Result<Option<LoadedPage>, SourceError> {
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        Ok(self.pages.get(index).cloned())
    }
}
