//! A [`RenderedItemSource`] backed by a headless Chromium tab.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures_util::StreamExt;
use harvest_logging::{harvest_debug, harvest_info, harvest_warn};
use harvester_core::{Locator, Read};
use harvester_engine::{ItemHandle, RenderedItemSource, SourceError};
use tokio::task::JoinHandle;

const SETTLE_AFTER_SCROLL: Duration = Duration::from_millis(500);
const TRIGGER_POLL: Duration = Duration::from_millis(250);
const CLICKABLE_JS: &str = "function() {
    const style = window.getComputedStyle(this);
    return this.isConnected
        && !this.disabled
        && this.getAttribute('aria-disabled') !== 'true'
        && style.visibility !== 'hidden'
        && style.pointerEvents !== 'none'
        && this.getClientRects().length > 0;
}";

pub struct ChromiumSource {
    browser: Option<Browser>,
    handler: JoinHandle<()>,
    page: Page,
    item: Locator,
    trigger: Locator,
}

impl ChromiumSource {
    pub async fn open(url: &str, item: Locator, trigger: Locator) -> Result<Self, SourceError> {
        let config = BrowserConfig::builder()
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .window_size(1920, 1080)
            .build()
            .map_err(|err| SourceError::Session(format!("failed to build browser config: {err}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| SourceError::Session(format!("failed to launch Chromium: {err}")))?;
        let handler = tokio::spawn(async move {
            while handler.next().await.is_some() {}
        });

        let page = match browser.new_page(url).await {
            Ok(page) => page,
            Err(err) => {
                handler.abort();
                return Err(SourceError::Load(format!("{url}: {err}")));
            }
        };
        if let Err(err) = page.wait_for_navigation().await {
            harvest_warn!("Navigation to {} did not settle: {}", url, err);
        }
        harvest_info!("Opened {} in Chromium", url);

        Ok(Self {
            browser: Some(browser),
            handler,
            page,
            item,
            trigger,
        })
    }

    /// First match that a user could click right now.
    async fn first_clickable(&self, locator: &Locator) -> Result<Option<Element>, SourceError> {
        let candidates = self
            .page
            .find_elements(locator.css.as_str())
            .await
            .or_else(empty_when_missing)?;
        let candidates = filter_by_text(candidates, locator).await?;
        first_accepted(candidates, |element| async move {
            is_clickable(&element)
                .await
                .map(|clickable| clickable.then_some(element))
        })
        .await
    }

    /// Polls for a clickable match until `wait` elapses.
    async fn wait_for_match(
        &self,
        locator: &Locator,
        wait: Duration,
    ) -> Result<Option<Element>, SourceError> {
        poll_until(wait, TRIGGER_POLL, move || self.first_clickable(locator)).await
    }
}

pub struct ChromiumItem {
    element: Element,
}

#[async_trait]
impl ItemHandle for ChromiumItem {
    async fn ensure_live(&self) -> Result<(), SourceError> {
        let connected = self
            .element
            .call_js_fn("function() { return this.isConnected; }", false)
            .await
            .map_err(source_error)?
            .result
            .value
            .and_then(|value| value.as_bool())
            .unwrap_or(false);
        if connected {
            Ok(())
        } else {
            Err(SourceError::Stale("card is no longer attached".into()))
        }
    }

    async fn query(&self, locator: &Locator, read: &Read) -> Result<Vec<String>, SourceError> {
        let candidates = self
            .element
            .find_elements(locator.css.as_str())
            .await
            .or_else(empty_when_missing)?;
        let matches = filter_by_text(candidates, locator).await?;

        let mut values = Vec::with_capacity(matches.len());
        for element in &matches {
            if let Some(value) = read_element(element, read).await? {
                values.push(value);
            }
        }
        Ok(values)
    }
}

#[async_trait]
impl RenderedItemSource for ChromiumSource {
    type Item = ChromiumItem;
    type Trigger = Element;

    async fn current_items(&self) -> Result<Vec<ChromiumItem>, SourceError> {
        let elements = self
            .page
            .find_elements(self.item.css.as_str())
            .await
            .or_else(empty_when_missing)?;
        let elements = filter_by_text(elements, &self.item).await?;
        Ok(elements
            .into_iter()
            .map(|element| ChromiumItem { element })
            .collect())
    }

    async fn find_trigger(&self, wait: Duration) -> Result<Option<Element>, SourceError> {
        self.wait_for_match(&self.trigger, wait).await
    }

    async fn activate(&self, trigger: &Element) -> Result<(), SourceError> {
        trigger.scroll_into_view().await.map_err(source_error)?;
        tokio::time::sleep(SETTLE_AFTER_SCROLL).await;
        trigger.click().await.map_err(source_error)?;
        Ok(())
    }

    async fn dismiss_interstitial(
        &self,
        locator: &Locator,
        wait: Duration,
    ) -> Result<bool, SourceError> {
        let Some(button) = self.wait_for_match(locator, wait).await? else {
            return Ok(false);
        };
        button.click().await.map_err(source_error)?;
        Ok(true)
    }

    async fn close(&mut self) -> Result<(), SourceError> {
        if let Some(mut browser) = self.browser.take() {
            if let Err(err) = browser.close().await {
                harvest_warn!("Chromium did not close cleanly: {}", err);
            }
            let _ = browser.wait().await;
        }
        self.handler.abort();
        harvest_info!("Closed Chromium session");
        Ok(())
    }
}

async fn filter_by_text(
    candidates: Vec<Element>,
    locator: &Locator,
) -> Result<Vec<Element>, SourceError> {
    let Some(filter) = &locator.has_text else {
        return Ok(candidates);
    };

    let mut kept = Vec::new();
    for element in candidates {
        let accepted = match &filter.within {
            Some(within) => {
                let mut any = false;
                let inner = element
                    .find_elements(within.as_str())
                    .await
                    .or_else(empty_when_missing)?;
                for descendant in inner {
                    let text = descendant.inner_text().await.map_err(source_error)?;
                    if filter.matches(text.as_deref().unwrap_or_default()) {
                        any = true;
                        break;
                    }
                }
                any
            }
            None => {
                let text = element.inner_text().await.map_err(source_error)?;
                filter.matches(text.as_deref().unwrap_or_default())
            }
        };
        if accepted {
            kept.push(element);
        }
    }
    Ok(kept)
}

/// The first candidate `accept` hands back, checked in order.
async fn first_accepted<T, F, Fut>(
    candidates: Vec<T>,
    mut accept: F,
) -> Result<Option<T>, SourceError>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<Option<T>, SourceError>>,
{
    for candidate in candidates {
        if let Some(found) = accept(candidate).await? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

/// Runs `search_once` every `poll` until it finds something or `wait` elapses.
/// Transient failures count as nothing found yet.
async fn poll_until<T, F, Fut>(
    wait: Duration,
    poll: Duration,
    mut search_once: F,
) -> Result<Option<T>, SourceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, SourceError>>,
{
    let search = async {
        loop {
            match search_once().await {
                Ok(Some(found)) => return Ok(found),
                Ok(None) => tokio::time::sleep(poll).await,
                Err(err) if err.is_transient() => tokio::time::sleep(poll).await,
                Err(err) => return Err(err),
            }
        }
    };
    match tokio::time::timeout(wait, search).await {
        Ok(found) => found.map(Some),
        Err(_) => Ok(None),
    }
}

/// Rendered with a box and not disabled.
async fn is_clickable(element: &Element) -> Result<bool, SourceError> {
    let returns = element
        .call_js_fn(CLICKABLE_JS, false)
        .await
        .map_err(source_error)?;
    Ok(returns
        .result
        .value
        .and_then(|value| value.as_bool())
        .unwrap_or(false))
}

async fn read_element(element: &Element, read: &Read) -> Result<Option<String>, SourceError> {
    match read {
        Read::Text => element.inner_text().await.map_err(source_error),
        Read::Attribute(name) => element.attribute(name.as_str()).await.map_err(source_error),
        Read::Href => {
            let returns = element
                .call_js_fn("function() { return this.href || null; }", false)
                .await
                .map_err(source_error)?;
            Ok(returns
                .result
                .value
                .and_then(|value| value.as_str().map(str::to_string)))
        }
    }
}

fn empty_when_missing(err: CdpError) -> Result<Vec<Element>, SourceError> {
    match source_error(err) {
        SourceError::NotFound(what) => {
            harvest_debug!("No match: {}", what);
            Ok(Vec::new())
        }
        other => Err(other),
    }
}

/// Sorts CDP failures into the engine's taxonomy by their message.
fn source_error(err: CdpError) -> SourceError {
    let message = err.to_string();
    let lower = message.to_ascii_lowercase();
    if lower.contains("could not find node")
        || lower.contains("does not belong to the document")
        || lower.contains("detached")
        || lower.contains("stale")
    {
        SourceError::Stale(message)
    } else if lower.contains("not clickable")
        || lower.contains("intercept")
        || lower.contains("not visible")
        || lower.contains("no quads")
    {
        SourceError::Intercepted(message)
    } else if matches!(err, CdpError::NotFound) {
        SourceError::NotFound(message)
    } else {
        SourceError::Session(message)
    }
}
