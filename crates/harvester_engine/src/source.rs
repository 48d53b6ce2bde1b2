use std::time::Duration;

use async_trait::async_trait;
use harvester_core::{Locator, Read};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("interaction intercepted: {0}")]
    Intercepted(String),
    #[error("element is stale: {0}")]
    Stale(String),
    #[error("nothing matched {0}")]
    NotFound(String),
    #[error("invalid locator {css:?}: {message}")]
    InvalidLocator { css: String, message: String },
    #[error("page load failed: {0}")]
    Load(String),
    #[error("session failure: {0}")]
    Session(String),
}

impl SourceError {
    /// Intercepted clicks and stale elements usually clear up after the
    /// page settles, so callers retry them after a short backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Intercepted(_) | SourceError::Stale(_))
    }
}

/// One rendered list entry. Valid only while the backing element exists.
#[async_trait]
pub trait ItemHandle: Send + Sync {
    /// Fails with [`SourceError::Stale`] once the element is gone.
    async fn ensure_live(&self) -> Result<(), SourceError>;

    /// Reads `read` from every descendant matching `locator`, in document
    /// order. An empty result means nothing matched.
    async fn query(&self, locator: &Locator, read: &Read) -> Result<Vec<String>, SourceError>;
}

/// A live listing that can render more items on demand.
///
/// The harvest owns the source exclusively for its duration and closes it
/// on every exit path.
#[async_trait]
pub trait RenderedItemSource: Send + Sync {
    type Item: ItemHandle;
    type Trigger: Send + Sync;

    async fn current_items(&self) -> Result<Vec<Self::Item>, SourceError>;

    async fn item_count(&self) -> Result<usize, SourceError> {
        Ok(self.current_items().await?.len())
    }

    /// Looks for a usable "load more" control for up to `wait`.
    /// `Ok(None)` means there is none.
    async fn find_trigger(&self, wait: Duration) -> Result<Option<Self::Trigger>, SourceError>;

    async fn activate(&self, trigger: &Self::Trigger) -> Result<(), SourceError>;

    /// Polls the item count every `poll` until `predicate` holds or
    /// `timeout` elapses. Returns whether the predicate was met.
    async fn wait_for_count(
        &self,
        predicate: &(dyn Fn(usize) -> bool + Send + Sync),
        timeout: Duration,
        poll: Duration,
    ) -> bool {
        let poll = poll.max(Duration::from_millis(1));
        let wait = async {
            loop {
                if let Ok(count) = self.item_count().await {
                    if predicate(count) {
                        return;
                    }
                }
                tokio::time::sleep(poll).await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    /// Best-effort dismissal of a consent banner or similar overlay.
    /// Returns whether something was dismissed.
    async fn dismiss_interstitial(
        &self,
        _locator: &Locator,
        _wait: Duration,
    ) -> Result<bool, SourceError> {
        Ok(false)
    }

    /// Releases the underlying session.
    async fn close(&mut self) -> Result<(), SourceError>;
}
