use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::anchor_store::AnchorStore;
use crate::candidate::CandidateSelector;
use crate::collaborators::{BlockchainClient, ContentStore};
use crate::config::AnchorConfig;
use crate::emitter::AnchorEmitter;
use crate::merkle::MerkleBuilder;
use crate::model::{Request, RequestId, RequestStatus, Transaction};
use crate::request_store::{RequestStore, RequestUpdate};
use crate::transaction_store::TransactionStore;

const MESSAGE_MAX_TX_FAILURES: &str = "Exceeded maximum transaction retry attempts.";

/// Runs one full anchoring cycle: selects candidates from READY requests,
/// builds the Merkle tree, sends the root to the chain, and emits anchor
/// commits for whatever the batch covers.
///
/// A request accepted into a batch moves to PROCESSING before the
/// transaction is sent, and out of PROCESSING only once its anchor commit
/// has actually been stored and published — never eagerly. A batch that
/// fails to land on chain leaves every accepted request in PROCESSING,
/// incrementing `tx_failures`; a request that exhausts
/// `AnchorConfig::max_tx_failures` is marked FAILED instead of being
/// retried forever.
pub struct AnchorCoordinator {
    request_store: Arc<dyn RequestStore>,
    anchor_store: Arc<dyn AnchorStore>,
    transaction_store: Arc<dyn TransactionStore>,
    selector: CandidateSelector,
    merkle_builder: MerkleBuilder,
    content_store: Arc<dyn ContentStore>,
    blockchain_client: Arc<dyn BlockchainClient>,
    emitter: AnchorEmitter,
    config: AnchorConfig,
}

impl AnchorCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        request_store: Arc<dyn RequestStore>,
        anchor_store: Arc<dyn AnchorStore>,
        transaction_store: Arc<dyn TransactionStore>,
        stream_service: Arc<dyn crate::collaborators::StreamService>,
        content_store: Arc<dyn ContentStore>,
        blockchain_client: Arc<dyn BlockchainClient>,
        config: AnchorConfig,
    ) -> Self {
        let selector = CandidateSelector::new(request_store.clone(), stream_service);
        let merkle_builder = MerkleBuilder::new(config.merkle_depth_limit);
        let emitter = AnchorEmitter::new(content_store.clone(), config.clone());
        AnchorCoordinator {
            request_store,
            anchor_store,
            transaction_store,
            selector,
            merkle_builder,
            content_store,
            blockchain_client,
            emitter,
            config,
        }
    }

    /// Runs a single cycle. Returns the number of requests that reached
    /// COMPLETED during this call.
    #[instrument(skip(self), fields(cycle_id = %uuid::Uuid::new_v4()))]
    pub async fn anchor_requests(&self) -> anyhow::Result<usize> {
        let ready = self.request_store.find_by_status(RequestStatus::Ready).await?;
        if ready.is_empty() {
            return Ok(0);
        }

        let candidates = self
            .selector
            .select(ready, self.config.effective_anchor_limit())
            .await?;
        if candidates.is_empty() {
            return Ok(0);
        }

        let all_accepted: Vec<RequestId> = candidates
            .iter()
            .flat_map(|c| c.accepted_requests.iter().copied())
            .collect();
        self.request_store
            .update_requests(RequestUpdate::new(RequestStatus::Processing), &all_accepted)
            .await?;

        let tree = self.merkle_builder.build(candidates, self.content_store.as_ref()).await?;
        let Some(root) = tree.root.clone() else {
            return Ok(0);
        };

        let receipt = match self.blockchain_client.send_transaction(&root).await {
            Ok(receipt) => receipt,
            Err(err) => {
                warn!(error = %err, "anchor transaction failed, batch remains in PROCESSING for retry");
                self.record_tx_failure(&all_accepted).await?;
                return Ok(0);
            }
        };

        let transaction = Transaction {
            chain_id: receipt.chain_id,
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
            block_timestamp: receipt.block_timestamp,
        };
        self.transaction_store.create(transaction.clone()).await?;

        let (_proof_cid, emitted) = self.emitter.emit(tree.leaves, &root, &transaction).await?;

        let mut completed_count = 0;
        for leaf in emitted {
            for anchor in leaf.anchors {
                self.anchor_store.create(anchor).await?;
            }
            self.request_store
                .update_requests(RequestUpdate::new(RequestStatus::Completed), &leaf.accepted_requests)
                .await?;
            completed_count += leaf.accepted_requests.len();
        }

        info!(completed = completed_count, "anchor cycle finished");
        Ok(completed_count)
    }

    async fn record_tx_failure(&self, request_ids: &[RequestId]) -> anyhow::Result<()> {
        for id in request_ids {
            let Some(mut request) = self.find(*id).await? else {
                continue;
            };
            request.tx_failures += 1;
            if request.tx_failures >= self.config.max_tx_failures {
                self.request_store
                    .update_requests(
                        RequestUpdate::with_message(RequestStatus::Failed, MESSAGE_MAX_TX_FAILURES),
                        &[*id],
                    )
                    .await?;
            } else {
                self.request_store.create_or_update(request).await?;
            }
        }
        Ok(())
    }

    async fn find(&self, id: RequestId) -> anyhow::Result<Option<Request>> {
        // `RequestStore` is keyed by cid for lookups; the coordinator only
        // ever holds requests it just fetched, so a full status scan is
        // good enough here rather than adding a by-id lookup to the trait.
        let processing = self.request_store.find_by_status(RequestStatus::Processing).await?;
        Ok(processing.into_iter().find(|r| r.id == id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{LogEntryType, Stream};
    use crate::model::StreamId;
    use crate::testing::{
        log_entry, new_request, FakeBlockchainClient, InMemoryContentStore, InMemoryRequestStore,
        InMemoryStreamService,
    };

    fn config() -> AnchorConfig {
        AnchorConfig {
            merkle_depth_limit: 3,
            max_tx_failures: 2,
            ..AnchorConfig::default()
        }
    }

    async fn seeded(
        cid: &str,
        stream_id: &str,
    ) -> (
        Arc<InMemoryRequestStore>,
        Arc<InMemoryStreamService>,
        Request,
    ) {
        let requests = Arc::new(InMemoryRequestStore::new());
        let streams = Arc::new(InMemoryStreamService::new());
        let mut request = new_request(cid, stream_id);
        request.status = RequestStatus::Ready;
        requests.seed(request.clone());
        streams.seed(Stream {
            stream_id: StreamId::new(stream_id),
            log: vec![
                log_entry("genesis", LogEntryType::Genesis),
                log_entry(cid, LogEntryType::Signed),
            ],
        });
        (requests, streams, request)
    }

    #[tokio::test]
    async fn successful_cycle_completes_the_request_and_records_an_anchor() {
        let (requests, streams, request) = seeded("c1", "streamA").await;
        let content_store = Arc::new(InMemoryContentStore::new());
        let anchor_store = Arc::new(crate::testing::InMemoryAnchorStore::new());
        let transaction_store = Arc::new(crate::testing::InMemoryTransactionStore::new());

        let coordinator = AnchorCoordinator::new(
            requests.clone(),
            anchor_store.clone(),
            transaction_store.clone(),
            streams,
            content_store,
            Arc::new(FakeBlockchainClient::succeeding()),
            config(),
        );

        let completed = coordinator.anchor_requests().await.unwrap();
        assert_eq!(completed, 1);

        let updated = requests.get(request.id);
        assert_eq!(updated.status, RequestStatus::Completed);
        assert_eq!(anchor_store.count(), 1);
        assert_eq!(transaction_store.count(), 1);
    }

    #[tokio::test]
    async fn failed_transaction_leaves_request_in_processing_and_counts_the_failure() {
        let (requests, streams, request) = seeded("c1", "streamA").await;
        let content_store = Arc::new(InMemoryContentStore::new());
        let anchor_store = Arc::new(crate::testing::InMemoryAnchorStore::new());
        let transaction_store = Arc::new(crate::testing::InMemoryTransactionStore::new());

        let coordinator = AnchorCoordinator::new(
            requests.clone(),
            anchor_store,
            transaction_store,
            streams,
            content_store,
            Arc::new(FakeBlockchainClient::failing("rpc unreachable")),
            config(),
        );

        let completed = coordinator.anchor_requests().await.unwrap();
        assert_eq!(completed, 0);

        let updated = requests.get(request.id);
        assert_eq!(updated.status, RequestStatus::Processing);
        assert_eq!(updated.tx_failures, 1);
    }

    #[tokio::test]
    async fn exhausting_retries_marks_the_request_failed() {
        let (requests, streams, request) = seeded("c1", "streamA").await;
        let content_store = Arc::new(InMemoryContentStore::new());
        let anchor_store = Arc::new(crate::testing::InMemoryAnchorStore::new());
        let transaction_store = Arc::new(crate::testing::InMemoryTransactionStore::new());

        let coordinator = AnchorCoordinator::new(
            requests.clone(),
            anchor_store,
            transaction_store,
            streams,
            content_store,
            Arc::new(FakeBlockchainClient::failing("rpc unreachable")),
            config(),
        );

        // config().max_tx_failures == 2
        for _ in 0..2 {
            let mut r = requests.get(request.id);
            r.status = RequestStatus::Ready;
            requests.seed(r);
            coordinator.anchor_requests().await.unwrap();
        }

        let updated = requests.get(request.id);
        assert_eq!(updated.status, RequestStatus::Failed);
        assert_eq!(updated.message.as_deref(), Some(MESSAGE_MAX_TX_FAILURES));
    }

    #[tokio::test]
    async fn two_requests_on_same_stream_both_complete_with_their_own_anchor_row() {
        let requests = Arc::new(InMemoryRequestStore::new());
        let streams = Arc::new(InMemoryStreamService::new());

        let mut r0 = new_request("c0", "streamA");
        r0.status = RequestStatus::Ready;
        let mut r1 = new_request("c1", "streamA");
        r1.status = RequestStatus::Ready;
        r1.created_at = r0.created_at + chrono::Duration::seconds(1);
        requests.seed(r0.clone());
        requests.seed(r1.clone());

        streams.seed(Stream {
            stream_id: StreamId::new("streamA"),
            log: vec![
                log_entry("genesis", LogEntryType::Genesis),
                log_entry("c0", LogEntryType::Signed),
                log_entry("c1", LogEntryType::Signed),
            ],
        });

        let content_store = Arc::new(InMemoryContentStore::new());
        let anchor_store = Arc::new(crate::testing::InMemoryAnchorStore::new());
        let transaction_store = Arc::new(crate::testing::InMemoryTransactionStore::new());

        let coordinator = AnchorCoordinator::new(
            requests.clone(),
            anchor_store.clone(),
            transaction_store,
            streams,
            content_store,
            Arc::new(FakeBlockchainClient::succeeding()),
            config(),
        );

        let completed = coordinator.anchor_requests().await.unwrap();
        assert_eq!(completed, 2);
        assert_eq!(requests.get(r0.id).status, RequestStatus::Completed);
        assert_eq!(requests.get(r1.id).status, RequestStatus::Completed);
        assert_eq!(anchor_store.count(), 2);
    }

    #[tokio::test]
    async fn over_limit_batch_anchors_oldest_first_then_the_remainder_next_cycle() {
        let requests = Arc::new(InMemoryRequestStore::new());
        let streams = Arc::new(InMemoryStreamService::new());

        let mut ready = Vec::new();
        for i in 0..8 {
            let cid = format!("c{i}");
            let stream_id = format!("stream{i}");
            let mut request = new_request(&cid, &stream_id);
            request.status = RequestStatus::Ready;
            request.created_at = chrono::Utc::now() - chrono::Duration::seconds(100 - i);
            streams.seed(Stream {
                stream_id: StreamId::new(stream_id),
                log: vec![log_entry("genesis", LogEntryType::Genesis), log_entry(&cid, LogEntryType::Signed)],
            });
            requests.seed(request.clone());
            ready.push(request);
        }

        let content_store = Arc::new(InMemoryContentStore::new());
        let anchor_store = Arc::new(crate::testing::InMemoryAnchorStore::new());
        let transaction_store = Arc::new(crate::testing::InMemoryTransactionStore::new());
        let coordinator = AnchorCoordinator::new(
            requests.clone(),
            anchor_store.clone(),
            transaction_store,
            streams,
            content_store,
            Arc::new(FakeBlockchainClient::succeeding()),
            AnchorConfig {
                merkle_depth_limit: 3,
                anchor_limit: 4,
                ..AnchorConfig::default()
            },
        );

        let first = coordinator.anchor_requests().await.unwrap();
        assert_eq!(first, 4);
        for request in &ready[0..4] {
            assert_eq!(requests.get(request.id).status, RequestStatus::Completed);
        }
        for request in &ready[4..8] {
            assert_eq!(requests.get(request.id).status, RequestStatus::Ready);
        }

        let second = coordinator.anchor_requests().await.unwrap();
        assert_eq!(second, 4);
        for request in &ready {
            assert_eq!(requests.get(request.id).status, RequestStatus::Completed);
        }
        assert_eq!(requests.count_by_status(RequestStatus::Ready).await.unwrap(), 0);
        assert_eq!(anchor_store.count(), 8);
    }
}
