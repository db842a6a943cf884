use std::sync::Arc;

use futures::future::join_all;
use tracing::warn;

use crate::collaborators::{ContentStore, StreamUpdateMessage};
use crate::config::AnchorConfig;
use crate::merkle::MerkleLeaf;
use crate::model::{Anchor, AnchorCommit, Cid, Proof, RequestId, Transaction};

/// Turns a built Merkle tree's leaves into durable anchor commits: one
/// content-addressed [`AnchorCommit`] object per leaf, linked to a shared
/// [`Proof`] object for the cycle's root and chain transaction.
///
/// Each leaf is independent — a failure storing or publishing one leaf's
/// commit does not affect the others; the coordinator leaves the
/// corresponding requests in PROCESSING to retry on the next cycle.
pub struct AnchorEmitter {
    store: Arc<dyn ContentStore>,
    config: AnchorConfig,
}

/// One leaf's emission outcome.
pub struct EmittedLeaf {
    pub accepted_requests: Vec<RequestId>,
    pub anchors: Vec<Anchor>,
}

impl AnchorEmitter {
    pub fn new(store: Arc<dyn ContentStore>, config: AnchorConfig) -> Self {
        AnchorEmitter { store, config }
    }

    /// Stores the shared proof object for the cycle, then emits one anchor
    /// commit per leaf, publishing a tip update for each leaf's stream.
    /// Leaves whose commit fails to store or publish are dropped from the
    /// result; the coordinator is responsible for leaving their requests
    /// in PROCESSING rather than COMPLETED.
    pub async fn emit(
        &self,
        leaves: Vec<MerkleLeaf>,
        root: &Cid,
        transaction: &Transaction,
    ) -> anyhow::Result<(Cid, Vec<EmittedLeaf>)> {
        let proof = Proof {
            root: root.clone(),
            tx_hash: transaction.tx_hash.clone(),
            chain_id: transaction.chain_id.clone(),
            block_number: transaction.block_number,
            block_timestamp: transaction.block_timestamp,
        };
        let proof_cid = self.store.put(&serde_json::to_value(&proof)?).await?;

        // Per-leaf work is independent; ordering of emissions is not
        // observable outside each leaf's own commit log, so they run
        // concurrently rather than one at a time.
        let results = join_all(leaves.into_iter().map(|leaf| {
            let proof_cid = &proof_cid;
            async move { (self.emit_leaf(&leaf, proof_cid).await, leaf) }
        }))
        .await;

        let mut emitted = Vec::with_capacity(results.len());
        for (result, leaf) in results {
            match result {
                Ok(anchors) => emitted.push(EmittedLeaf {
                    accepted_requests: leaf.candidate.accepted_requests,
                    anchors,
                }),
                Err(err) => {
                    warn!(
                        stream_id = %leaf.candidate.stream_id,
                        error = %err,
                        "failed to emit anchor commit for leaf, leaving requests in PROCESSING",
                    );
                }
            }
        }

        Ok((proof_cid, emitted))
    }

    /// Stores and publishes a single anchor-commit object for the leaf, then
    /// mints one [`Anchor`] row per accepted request — every request on the
    /// stream shares the same commit CID (the object is identical: same
    /// `prev`/`proof`/`path`), but each gets its own durable row since
    /// `anchors.request_id` is unique per request, not per leaf.
    async fn emit_leaf(&self, leaf: &MerkleLeaf, proof_cid: &Cid) -> anyhow::Result<Vec<Anchor>> {
        let commit = AnchorCommit {
            prev: leaf.candidate.cid.clone(),
            proof: proof_cid.clone(),
            path: leaf.path.clone(),
        };
        let commit_cid = self.store.put(&serde_json::to_value(&commit)?).await?;

        let message = StreamUpdateMessage::new(&leaf.candidate.stream_id, &commit_cid);
        self.store
            .publish(&self.config.pubsub_topic, &message.to_bytes()?)
            .await?;
        self.store.pin(&leaf.candidate.stream_id).await?;

        if leaf.candidate.accepted_requests.is_empty() {
            anyhow::bail!("candidate has no accepted requests");
        }

        let created_at = chrono::Utc::now();
        Ok(leaf
            .candidate
            .accepted_requests
            .iter()
            .map(|request_id| Anchor {
                request_id: *request_id,
                proof_cid: proof_cid.clone(),
                path: leaf.path.clone(),
                cid: commit_cid.clone(),
                created_at,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Candidate, StreamId};
    use crate::testing::InMemoryContentStore;

    fn leaf(cid: &str, requests: Vec<RequestId>) -> MerkleLeaf {
        MerkleLeaf {
            candidate: Candidate {
                stream_id: StreamId::new(format!("stream-{}", cid)),
                cid: Cid::new(cid),
                accepted_requests: requests,
                rejected_requests: Default::default(),
                earliest_created_at: chrono::Utc::now(),
            },
            path: "0".to_string(),
        }
    }

    fn transaction() -> Transaction {
        Transaction {
            chain_id: "eip155:1".to_string(),
            tx_hash: "0xdeadbeef".to_string(),
            block_number: 42,
            block_timestamp: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn emits_one_anchor_per_leaf_and_shares_the_proof_cid() {
        let store = Arc::new(InMemoryContentStore::new());
        let emitter = AnchorEmitter::new(store.clone(), AnchorConfig::default());
        let leaves = vec![
            leaf("c0", vec![RequestId::new()]),
            leaf("c1", vec![RequestId::new()]),
        ];

        let (proof_cid, emitted) = emitter
            .emit(leaves, &Cid::new("root"), &transaction())
            .await
            .unwrap();

        assert_eq!(emitted.len(), 2);
        for item in &emitted {
            assert_eq!(item.anchors.len(), 1);
            assert_eq!(item.anchors[0].proof_cid, proof_cid);
        }
        assert_eq!(store.pins.lock().unwrap().len(), 2);
        assert_eq!(store.publishes.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn a_failing_leaf_is_dropped_but_others_still_emit() {
        let store = Arc::new(InMemoryContentStore::new());
        let emitter = AnchorEmitter::new(store.clone(), AnchorConfig::default());
        let c0_request = RequestId::new();
        let c1_request = RequestId::new();
        let leaves = vec![leaf("c0", vec![c0_request]), leaf("c1", vec![c1_request])];

        // The anchor commit for leaf `c0` has `"prev":"c0"` in its
        // serialized form; the proof object and `c1`'s commit don't match.
        *store.fail_when_containing.lock().unwrap() = Some("\"c0\"".to_string());

        let (_, emitted) = emitter
            .emit(leaves, &Cid::new("root"), &transaction())
            .await
            .unwrap();

        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].anchors[0].request_id, c1_request);
        assert_eq!(store.pins.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn a_leaf_with_multiple_accepted_requests_mints_one_anchor_row_each() {
        let store = Arc::new(InMemoryContentStore::new());
        let emitter = AnchorEmitter::new(store.clone(), AnchorConfig::default());
        let r0 = RequestId::new();
        let r1 = RequestId::new();
        let leaves = vec![leaf("c0", vec![r0, r1])];

        let (_, emitted) = emitter
            .emit(leaves, &Cid::new("root"), &transaction())
            .await
            .unwrap();

        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].anchors.len(), 2);
        let request_ids: std::collections::BTreeSet<_> =
            emitted[0].anchors.iter().map(|a| a.request_id).collect();
        assert_eq!(request_ids, [r0, r1].into_iter().collect());
        // Every request on the stream shares the identical anchor-commit CID.
        assert_eq!(emitted[0].anchors[0].cid, emitted[0].anchors[1].cid);
        // Only one commit object is stored and published despite two rows.
        assert_eq!(store.pins.lock().unwrap().len(), 1);
        assert_eq!(store.publishes.lock().unwrap().len(), 1);
    }
}
