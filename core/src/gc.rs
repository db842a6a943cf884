use std::sync::Arc;

use chrono::Utc;
use tracing::{instrument, warn};

use crate::collaborators::StreamService;
use crate::config::AnchorConfig;
use crate::model::RequestStatus;
use crate::request_store::RequestStore;

/// Unpins streams for COMPLETED requests once they've sat past the
/// configured expiry window. Unpinning is idempotent on the stream service
/// side, so a request that gets swept more than once (e.g. after a crash
/// mid-cycle) is harmless.
pub struct GarbageCollector {
    request_store: Arc<dyn RequestStore>,
    stream_service: Arc<dyn StreamService>,
    config: AnchorConfig,
}

impl GarbageCollector {
    pub fn new(
        request_store: Arc<dyn RequestStore>,
        stream_service: Arc<dyn StreamService>,
        config: AnchorConfig,
    ) -> Self {
        GarbageCollector {
            request_store,
            stream_service,
            config,
        }
    }

    /// Scans COMPLETED, still-pinned requests and unpins the streams of
    /// those whose `updated_at` is older than `AnchorConfig::expiry_window`.
    /// Returns the number of streams unpinned. A single stream's unpin
    /// failure is logged and does not stop the sweep.
    #[instrument(skip(self), fields(cycle_id = %uuid::Uuid::new_v4()))]
    pub async fn garbage_collect_pinned_streams(&self) -> anyhow::Result<usize> {
        let completed = self
            .request_store
            .find_by_status(RequestStatus::Completed)
            .await?;

        let now = Utc::now();
        let mut unpinned = 0;
        let mut seen = std::collections::HashSet::new();
        let mut newly_unpinned = Vec::new();

        for request in completed {
            if !request.pinned {
                continue;
            }
            if now - request.updated_at < self.config.expiry_window {
                continue;
            }
            if !seen.insert(request.stream_id.clone()) {
                newly_unpinned.push(request.id);
                continue;
            }
            match self.stream_service.unpin_stream(&request.stream_id).await {
                Ok(()) => {
                    unpinned += 1;
                    newly_unpinned.push(request.id);
                }
                Err(err) => warn!(
                    stream_id = %request.stream_id,
                    error = %err,
                    "failed to unpin expired stream, will retry next sweep",
                ),
            }
        }

        if !newly_unpinned.is_empty() {
            self.request_store.mark_unpinned(&newly_unpinned).await?;
        }

        Ok(unpinned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Request;
    use crate::testing::InMemoryRequestStore;
    use crate::testing::InMemoryStreamService;

    fn expired_completed_request(cid: &str, stream_id: &str, age: chrono::Duration) -> Request {
        let mut request = crate::testing::new_request(cid, stream_id);
        request.status = RequestStatus::Completed;
        request.pinned = true;
        request.updated_at = Utc::now() - age;
        request
    }

    #[tokio::test]
    async fn unpins_streams_past_the_expiry_window() {
        let store = Arc::new(InMemoryRequestStore::new());
        store.seed(expired_completed_request("c1", "streamA", chrono::Duration::days(90)));

        let streams = Arc::new(InMemoryStreamService::new());
        let gc = GarbageCollector::new(
            store,
            streams,
            AnchorConfig {
                expiry_window: chrono::Duration::days(60),
                ..AnchorConfig::default()
            },
        );

        let unpinned = gc.garbage_collect_pinned_streams().await.unwrap();
        assert_eq!(unpinned, 1);
    }

    #[tokio::test]
    async fn leaves_fresh_completed_requests_pinned() {
        let store = Arc::new(InMemoryRequestStore::new());
        store.seed(expired_completed_request("c1", "streamA", chrono::Duration::days(1)));

        let streams = Arc::new(InMemoryStreamService::new());
        let gc = GarbageCollector::new(
            store,
            streams,
            AnchorConfig {
                expiry_window: chrono::Duration::days(60),
                ..AnchorConfig::default()
            },
        );

        let unpinned = gc.garbage_collect_pinned_streams().await.unwrap();
        assert_eq!(unpinned, 0);
    }

    #[tokio::test]
    async fn running_gc_twice_does_not_unpin_the_same_stream_again() {
        let store = Arc::new(InMemoryRequestStore::new());
        let request = expired_completed_request("c1", "streamA", chrono::Duration::days(90));
        let request_id = request.id;
        store.seed(request);

        let streams = Arc::new(InMemoryStreamService::new());
        let gc = GarbageCollector::new(
            store.clone(),
            streams,
            AnchorConfig {
                expiry_window: chrono::Duration::days(60),
                ..AnchorConfig::default()
            },
        );

        let first = gc.garbage_collect_pinned_streams().await.unwrap();
        assert_eq!(first, 1);
        assert!(!store.get(request_id).pinned);

        let second = gc.garbage_collect_pinned_streams().await.unwrap();
        assert_eq!(second, 0);
    }
}
