use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::collaborators::{CommitQuery, StreamService};
use crate::errors::CandidateSelectorError;
use crate::model::{
    Candidate, Cid, Request, RequestId, RequestStatus, StreamId, MESSAGE_ALREADY_ANCHORED,
};
use crate::request_store::{RequestStore, RequestUpdate};

const MESSAGE_NO_READABLE_VERSION: &str = "No readable version found.";

/// Turns a set of READY requests into per-stream [`Candidate`]s.
///
/// Consults the stream service to resolve each stream's authoritative tip,
/// deduplicates by stream (at most one candidate per `streamId`), and
/// persists rejection/pre-anchored-completion updates before returning.
pub struct CandidateSelector {
    request_store: Arc<dyn RequestStore>,
    stream_service: Arc<dyn StreamService>,
}

impl CandidateSelector {
    pub fn new(request_store: Arc<dyn RequestStore>, stream_service: Arc<dyn StreamService>) -> Self {
        CandidateSelector {
            request_store,
            stream_service,
        }
    }

    /// Runs the selection algorithm over `requests` (any order), keeping at
    /// most `limit` candidates (`0` means unlimited). Returns the surviving
    /// candidates ordered by stream-level FIFO.
    pub async fn select(&self, requests: Vec<Request>, limit: usize) -> anyhow::Result<Vec<Candidate>> {
        let mut by_stream: HashMap<StreamId, Vec<Request>> = HashMap::new();
        for request in requests {
            by_stream.entry(request.stream_id.clone()).or_default().push(request);
        }

        let mut candidates = Vec::new();
        let mut to_complete: Vec<RequestId> = Vec::new();
        let mut to_fail: Vec<RequestId> = Vec::new();

        for (stream_id, bucket) in by_stream {
            let mut stream = self.stream_service.load_stream(&stream_id).await?;

            let mut remaining = Vec::new();
            for request in bucket {
                if stream.anchored_past(&request.cid) {
                    to_complete.push(request.id);
                } else {
                    remaining.push(request);
                }
            }

            let missing: Vec<_> = remaining
                .iter()
                .filter(|r| stream.position_of(&r.cid).is_none())
                .map(|r| CommitQuery {
                    stream_id: stream_id.clone(),
                    commit_id: r.cid.clone(),
                })
                .collect();

            if !missing.is_empty() {
                if let Ok(mut discovered) = self.stream_service.multi_query(&missing).await {
                    if let Some(merged) = discovered.remove(&stream_id) {
                        stream = merged;
                    }
                }
            }

            let mut accepted = Vec::new();
            let mut rejected = BTreeSet::new();
            for request in remaining {
                if stream.anchored_past(&request.cid) {
                    to_complete.push(request.id);
                } else if stream.is_ancestor_of_tip(&request.cid) {
                    accepted.push(request);
                } else {
                    rejected.insert(request.id);
                    to_fail.push(request.id);
                }
            }

            if accepted.is_empty() {
                continue;
            }

            let tip_cid = stream
                .tip()
                .map(|entry| entry.cid.clone())
                .ok_or_else(|| CandidateSelectorError::StreamUnreadable(stream_id.clone(), "empty log".to_string()))?;
            let earliest_created_at = accepted
                .iter()
                .map(|r| r.created_at)
                .min()
                .expect("accepted is non-empty");
            let accepted_requests = accepted.iter().map(|r| r.id).collect();

            candidates.push(Candidate {
                stream_id,
                cid: tip_cid,
                accepted_requests,
                rejected_requests: rejected,
                earliest_created_at,
            });
        }

        if !to_complete.is_empty() {
            self.request_store
                .update_requests(
                    RequestUpdate::with_message(RequestStatus::Completed, MESSAGE_ALREADY_ANCHORED),
                    &to_complete,
                )
                .await?;
        }
        if !to_fail.is_empty() {
            self.request_store
                .update_requests(
                    RequestUpdate::with_message(RequestStatus::Failed, MESSAGE_NO_READABLE_VERSION),
                    &to_fail,
                )
                .await?;
        }

        candidates.sort_by(|a, b| {
            a.earliest_created_at
                .cmp(&b.earliest_created_at)
                .then_with(|| a.stream_id.cmp(&b.stream_id))
        });

        if limit > 0 && candidates.len() > limit {
            candidates.truncate(limit);
        }

        Ok(candidates)
    }
}
