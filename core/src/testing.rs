//! In-memory fakes for the collaborator traits, shared by this crate's unit
//! tests. Analogous to the `()`/`CachedStreamLoader` substitutability seams
//! used elsewhere in this codebase for swapping in test doubles at a
//! component boundary.
#![cfg(test)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Duration;

use crate::anchor_store::AnchorStore;
use crate::collaborators::{
    BlockchainClient, CommitQuery, ContentStore, EventProducer, LogEntry, LogEntryType, Stream,
    StreamService, TxReceipt,
};
use crate::model::{Anchor, Cid, Request, RequestId, RequestStatus, StreamId, Transaction};
use crate::request_store::{RequestStore, RequestUpdate};
use crate::transaction_store::TransactionStore;

#[derive(Default)]
pub struct InMemoryRequestStore {
    rows: Mutex<HashMap<RequestId, Request>>,
}

impl InMemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, request: Request) {
        self.rows.lock().unwrap().insert(request.id, request);
    }

    pub fn snapshot(&self) -> Vec<Request> {
        self.rows.lock().unwrap().values().cloned().collect()
    }

    pub fn get(&self, id: RequestId) -> Request {
        self.rows.lock().unwrap().get(&id).unwrap().clone()
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn create_or_update(&self, request: Request) -> anyhow::Result<Request> {
        let mut rows = self.rows.lock().unwrap();
        rows.insert(request.id, request.clone());
        Ok(request)
    }

    async fn find_by_cid(&self, cid: &Cid) -> anyhow::Result<Option<Request>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|r| &r.cid == cid)
            .cloned())
    }

    async fn find_by_status(&self, status: RequestStatus) -> anyhow::Result<Vec<Request>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }

    async fn count_by_status(&self, status: RequestStatus) -> anyhow::Result<usize> {
        Ok(self.find_by_status(status).await?.len())
    }

    async fn find_and_mark_ready(
        &self,
        limit: usize,
        min_stream_count: usize,
        ready_retry_interval: Duration,
    ) -> anyhow::Result<Vec<Request>> {
        let now = chrono::Utc::now();
        let mut rows = self.rows.lock().unwrap();

        let pending_streams: std::collections::HashSet<_> = rows
            .values()
            .filter(|r| r.status == RequestStatus::Pending)
            .map(|r| r.stream_id.clone())
            .collect();

        let mut promoted = Vec::new();

        if pending_streams.len() >= min_stream_count {
            let mut pending: Vec<_> = rows
                .values()
                .filter(|r| r.status == RequestStatus::Pending)
                .cloned()
                .collect();
            pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

            let mut seen_streams = std::collections::HashSet::new();
            for request in pending {
                if limit > 0 && seen_streams.len() >= limit && !seen_streams.contains(&request.stream_id) {
                    continue;
                }
                seen_streams.insert(request.stream_id.clone());
                let row = rows.get_mut(&request.id).unwrap();
                row.status = RequestStatus::Ready;
                row.updated_at = now;
                promoted.push(row.clone());
            }
        }

        for row in rows.values_mut() {
            if row.status == RequestStatus::Ready && now - row.updated_at > ready_retry_interval {
                row.updated_at = now;
                promoted.push(row.clone());
            }
        }

        Ok(promoted)
    }

    async fn update_requests(&self, update: RequestUpdate, ids: &[RequestId]) -> anyhow::Result<()> {
        let mut rows = self.rows.lock().unwrap();
        for id in ids {
            if let Some(row) = rows.get_mut(id) {
                if row.status.is_terminal() {
                    continue;
                }
                row.status = update.status;
                if let Some(message) = &update.message {
                    row.message = Some(message.clone());
                }
                if update.status == RequestStatus::Completed {
                    row.pinned = true;
                }
                row.updated_at = chrono::Utc::now();
            }
        }
        Ok(())
    }

    async fn mark_unpinned(&self, ids: &[RequestId]) -> anyhow::Result<()> {
        let mut rows = self.rows.lock().unwrap();
        for id in ids {
            if let Some(row) = rows.get_mut(id) {
                row.pinned = false;
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryStreamService {
    streams: Mutex<HashMap<StreamId, Stream>>,
}

impl InMemoryStreamService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, stream: Stream) {
        self.streams
            .lock()
            .unwrap()
            .insert(stream.stream_id.clone(), stream);
    }
}

#[async_trait]
impl StreamService for InMemoryStreamService {
    async fn load_stream(&self, stream_id: &StreamId) -> anyhow::Result<Stream> {
        self.streams
            .lock()
            .unwrap()
            .get(stream_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("stream `{}` not found", stream_id))
    }

    async fn load_commit(&self, stream_id: &StreamId, _commit_id: &Cid) -> anyhow::Result<Stream> {
        self.load_stream(stream_id).await
    }

    async fn multi_query(
        &self,
        queries: &[CommitQuery],
    ) -> anyhow::Result<HashMap<StreamId, Stream>> {
        let streams = self.streams.lock().unwrap();
        let mut result = HashMap::new();
        for query in queries {
            if let Some(stream) = streams.get(&query.stream_id) {
                result.insert(query.stream_id.clone(), stream.clone());
            }
        }
        Ok(result)
    }

    async fn unpin_stream(&self, _stream_id: &StreamId) -> anyhow::Result<()> {
        Ok(())
    }
}

pub fn log_entry(cid: &str, ty: LogEntryType) -> LogEntry {
    LogEntry {
        cid: Cid::new(cid),
        r#type: ty,
    }
}

#[derive(Default)]
pub struct InMemoryContentStore {
    objects: Mutex<Vec<serde_json::Value>>,
    counter: AtomicU64,
    /// When set, `put` fails for any object whose serialized form contains
    /// this substring (consumed indefinitely, not one-shot).
    pub fail_when_containing: Mutex<Option<String>>,
    pub publishes: Mutex<Vec<(String, Vec<u8>)>>,
    pub pins: Mutex<Vec<StreamId>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn put(&self, object: &serde_json::Value) -> anyhow::Result<Cid> {
        if let Some(needle) = self.fail_when_containing.lock().unwrap().as_ref() {
            if object.to_string().contains(needle.as_str()) {
                anyhow::bail!("simulated store failure");
            }
        }
        let mut objects = self.objects.lock().unwrap();
        if let Some(existing) = objects.iter().position(|o| o == object) {
            return Ok(Cid::new(format!("fake-{}", existing)));
        }
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        objects.push(object.clone());
        Ok(Cid::new(format!("fake-{}", id)))
    }

    async fn get(&self, cid: &Cid) -> anyhow::Result<serde_json::Value> {
        let idx: usize = cid
            .as_str()
            .strip_prefix("fake-")
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| anyhow::anyhow!("unknown cid {}", cid))?;
        self.objects
            .lock()
            .unwrap()
            .get(idx)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown cid {}", cid))
    }

    async fn pin(&self, stream_id: &StreamId) -> anyhow::Result<()> {
        self.pins.lock().unwrap().push(stream_id.clone());
        Ok(())
    }

    async fn unpin(&self, _stream_id: &StreamId) -> anyhow::Result<()> {
        Ok(())
    }

    async fn publish(&self, topic: &str, message: &[u8]) -> anyhow::Result<()> {
        self.publishes
            .lock()
            .unwrap()
            .push((topic.to_string(), message.to_vec()));
        Ok(())
    }
}

pub struct FakeBlockchainClient {
    pub fail_with: Option<String>,
}

impl FakeBlockchainClient {
    pub fn succeeding() -> Self {
        FakeBlockchainClient { fail_with: None }
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        FakeBlockchainClient {
            fail_with: Some(reason.into()),
        }
    }
}

#[async_trait]
impl BlockchainClient for FakeBlockchainClient {
    async fn send_transaction(&self, _root: &Cid) -> anyhow::Result<TxReceipt> {
        if let Some(reason) = &self.fail_with {
            anyhow::bail!("{}", reason);
        }
        Ok(TxReceipt {
            chain_id: "eip155:1".to_string(),
            tx_hash: "0xdeadbeef".to_string(),
            block_number: 1,
            block_timestamp: chrono::Utc::now(),
        })
    }
}

#[derive(Default)]
pub struct FakeEventProducer {
    pub events: Mutex<Vec<uuid::Uuid>>,
}

impl FakeEventProducer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventProducer for FakeEventProducer {
    async fn emit_anchor_event(&self, event_id: uuid::Uuid) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(event_id);
        Ok(())
    }
}

pub fn new_request(cid: &str, stream_id: &str) -> Request {
    Request::new(Cid::new(cid), StreamId::new(stream_id))
}

#[derive(Default)]
pub struct InMemoryAnchorStore {
    rows: Mutex<Vec<Anchor>>,
}

impl InMemoryAnchorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl AnchorStore for InMemoryAnchorStore {
    async fn create(&self, anchor: Anchor) -> anyhow::Result<()> {
        self.rows.lock().unwrap().push(anchor);
        Ok(())
    }

    async fn find_by_request(&self, request_id: &RequestId) -> anyhow::Result<Option<Anchor>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|a| &a.request_id == request_id)
            .cloned())
    }
}

#[derive(Default)]
pub struct InMemoryTransactionStore {
    rows: Mutex<Vec<Transaction>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn create(&self, transaction: Transaction) -> anyhow::Result<()> {
        self.rows.lock().unwrap().push(transaction);
        Ok(())
    }
}
