use crate::event::Event;
use crate::store::EventStore;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// A source of event batches.
/// Implementations fetch the current snapshot of the remote feed; the
/// refresher decides what is new.
#[async_trait]
pub trait EventFeed: Send + Sync + 'static {
    /// Source name (used in log lines).
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<Vec<Event>>;
}

/// One refresh cycle: fetch, then merge into the store.
pub struct Refresher {
    feed: Arc<dyn EventFeed>,
    store: Arc<EventStore>,
}

impl Refresher {
    pub fn new(feed: Arc<dyn EventFeed>, store: Arc<EventStore>) -> Self {
        Self { feed, store }
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    /// Returns the events not seen before, newest first.
    pub async fn refresh(&self) -> Result<Vec<Event>> {
        let fetched = match self.feed.fetch().await {
            Ok(events) => events,
            Err(e) => {
                log::error!("Failed to refresh events from {}: {}", self.feed.name(), e);
                return Err(e);
            }
        };
        log::debug!("Fetched {} events from {}", fetched.len(), self.feed.name());

        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.ingest(fetched))
            .await
            .map_err(|e| std::io::Error::other(format!("ingest task failed: {}", e)))?
    }
}
