use std::sync::Arc;

use tracing::{instrument, warn};

use crate::collaborators::EventProducer;
use crate::config::AnchorConfig;
use crate::request_store::RequestStore;

/// Promotes PENDING requests to READY once enough streams are waiting, and
/// re-surfaces stale READY batches so they get another anchor event. Runs
/// on its own timer, independent of [`crate::coordinator::AnchorCoordinator`].
pub struct ReadinessScheduler {
    request_store: Arc<dyn RequestStore>,
    event_producer: Arc<dyn EventProducer>,
    config: AnchorConfig,
}

impl ReadinessScheduler {
    pub fn new(
        request_store: Arc<dyn RequestStore>,
        event_producer: Arc<dyn EventProducer>,
        config: AnchorConfig,
    ) -> Self {
        ReadinessScheduler {
            request_store,
            event_producer,
            config,
        }
    }

    /// Promotes eligible requests and emits one anchor event per run that
    /// promoted anything. A failure to emit the event is logged and
    /// swallowed — the requests are already READY, and the next scheduler
    /// tick (or the retry window) will pick them up regardless.
    #[instrument(skip(self), fields(cycle_id = %uuid::Uuid::new_v4()))]
    pub async fn emit_anchor_event_if_ready(&self) -> anyhow::Result<usize> {
        let promoted = self
            .request_store
            .find_and_mark_ready(
                self.config.stream_limit(),
                self.config.min_stream_count,
                self.config.ready_retry_interval,
            )
            .await?;

        if promoted.is_empty() {
            return Ok(0);
        }

        let event_id = uuid::Uuid::new_v4();
        if let Err(err) = self.event_producer.emit_anchor_event(event_id).await {
            warn!(error = %err, "failed to emit anchor-ready event, relying on the next scheduler tick");
        }

        Ok(promoted.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RequestStatus;
    use crate::testing::{new_request, FakeEventProducer, InMemoryRequestStore};

    #[tokio::test]
    async fn promotes_pending_requests_and_emits_one_event() {
        let store = Arc::new(InMemoryRequestStore::new());
        store.seed(new_request("c1", "streamA"));
        store.seed(new_request("c2", "streamB"));

        let producer = Arc::new(FakeEventProducer::new());
        let scheduler = ReadinessScheduler::new(
            store.clone(),
            producer.clone(),
            AnchorConfig {
                min_stream_count: 1,
                ..AnchorConfig::default()
            },
        );

        let promoted = scheduler.emit_anchor_event_if_ready().await.unwrap();
        assert_eq!(promoted, 2);
        assert_eq!(producer.events.lock().unwrap().len(), 1);

        for request in store.snapshot() {
            assert_eq!(request.status, RequestStatus::Ready);
        }
    }

    #[tokio::test]
    async fn does_nothing_below_the_minimum_stream_count() {
        let store = Arc::new(InMemoryRequestStore::new());
        store.seed(new_request("c1", "streamA"));

        let producer = Arc::new(FakeEventProducer::new());
        let scheduler = ReadinessScheduler::new(
            store.clone(),
            producer.clone(),
            AnchorConfig {
                min_stream_count: 2,
                ..AnchorConfig::default()
            },
        );

        let promoted = scheduler.emit_anchor_event_if_ready().await.unwrap();
        assert_eq!(promoted, 0);
        assert!(producer.events.lock().unwrap().is_empty());
        assert_eq!(store.get(store.snapshot()[0].id).status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn stale_ready_batch_is_retried_with_a_fresh_event() {
        let store = Arc::new(InMemoryRequestStore::new());
        let retry_interval = chrono::Duration::milliseconds(1000);

        let mut stale = new_request("c1", "streamA");
        stale.status = RequestStatus::Ready;
        stale.updated_at = chrono::Utc::now() - retry_interval - chrono::Duration::seconds(1);
        store.seed(stale.clone());

        let producer = Arc::new(FakeEventProducer::new());
        let scheduler = ReadinessScheduler::new(
            store.clone(),
            producer.clone(),
            AnchorConfig {
                min_stream_count: 1,
                ready_retry_interval: retry_interval,
                ..AnchorConfig::default()
            },
        );

        let promoted = scheduler.emit_anchor_event_if_ready().await.unwrap();
        assert_eq!(promoted, 1);
        assert_eq!(producer.events.lock().unwrap().len(), 1);

        let updated = store.get(stale.id);
        assert_eq!(updated.status, RequestStatus::Ready);
        assert!(updated.updated_at > stale.updated_at);
    }
}
