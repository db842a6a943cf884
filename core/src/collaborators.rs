//! Trait contracts for the systems this crate is generic over: the
//! blockchain client, the content-addressed store, the stream service, the
//! event producer and its pub/sub channel. Each is an external collaborator
//! per the spec — only its contract lives here; production implementations
//! are wired in by the process that assembles the pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{Cid, StreamId};

/// Receipt returned by a successful on-chain transaction.
#[derive(Debug, Clone)]
pub struct TxReceipt {
    pub chain_id: String,
    pub tx_hash: String,
    pub block_number: u64,
    pub block_timestamp: DateTime<Utc>,
}

/// Sends the Merkle root to the chain. The only method the core calls on
/// it; confirmation depth, retries and gas policy are the implementor's
/// concern.
#[async_trait::async_trait]
pub trait BlockchainClient: Send + Sync {
    async fn send_transaction(&self, root: &Cid) -> anyhow::Result<TxReceipt>;
}

/// Content-addressed store: `put`/`get` plus pin bookkeeping and the pub/sub
/// channel anchor updates travel over. Identical objects MUST yield
/// identical CIDs — that determinism lives entirely on the far side of this
/// trait.
#[async_trait::async_trait]
pub trait ContentStore: Send + Sync {
    /// Stores a self-describing structured record (already serialized to a
    /// JSON value by the caller) and returns its content identifier.
    /// Identical objects MUST yield identical CIDs.
    async fn put(&self, object: &serde_json::Value) -> anyhow::Result<Cid>;
    async fn get(&self, cid: &Cid) -> anyhow::Result<serde_json::Value>;
    async fn pin(&self, stream_id: &StreamId) -> anyhow::Result<()>;
    async fn unpin(&self, stream_id: &StreamId) -> anyhow::Result<()>;
    async fn publish(&self, topic: &str, message: &[u8]) -> anyhow::Result<()>;
}

/// Type tag of one entry in a stream's log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEntryType {
    Genesis,
    Signed,
    Anchor,
}

/// One entry in a stream's ordered commit log.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub cid: Cid,
    pub r#type: LogEntryType,
}

/// A stream as reported by the stream service: an ordered log of commits
/// from genesis to tip. The core only ever needs ancestor/descendant tests
/// on this linear slice — the underlying commit DAG is the stream service's
/// concern, not ours.
#[derive(Debug, Clone)]
pub struct Stream {
    pub stream_id: StreamId,
    pub log: Vec<LogEntry>,
}

impl Stream {
    pub fn tip(&self) -> Option<&LogEntry> {
        self.log.last()
    }

    /// Index of `cid` in the log, if present.
    pub fn position_of(&self, cid: &Cid) -> Option<usize> {
        self.log.iter().position(|entry| &entry.cid == cid)
    }

    /// True if `cid` appears in the log at or before an ANCHOR entry —
    /// i.e. this stream has already been anchored past `cid`.
    pub fn anchored_past(&self, cid: &Cid) -> bool {
        match self.position_of(cid) {
            Some(idx) => self.log[idx..]
                .iter()
                .any(|entry| entry.r#type == LogEntryType::Anchor),
            None => false,
        }
    }

    /// True if `cid` is an ancestor of (or equal to) the stream's current
    /// tip — i.e. it is causally related to what we are about to anchor.
    pub fn is_ancestor_of_tip(&self, cid: &Cid) -> bool {
        self.position_of(cid).is_some()
    }
}

/// One `(streamId, commitId)` pair used to probe for commits not yet
/// reflected in a stream's authoritative log.
#[derive(Debug, Clone)]
pub struct CommitQuery {
    pub stream_id: StreamId,
    pub commit_id: Cid,
}

/// The stream service: resolves streams and individual commits, and allows
/// batched lookups when a request's CID can't be found in a stream's
/// already-loaded log.
#[async_trait::async_trait]
pub trait StreamService: Send + Sync {
    async fn load_stream(&self, stream_id: &StreamId) -> anyhow::Result<Stream>;
    async fn load_commit(&self, stream_id: &StreamId, commit_id: &Cid) -> anyhow::Result<Stream>;
    async fn multi_query(
        &self,
        queries: &[CommitQuery],
    ) -> anyhow::Result<std::collections::HashMap<StreamId, Stream>>;
    async fn unpin_stream(&self, stream_id: &StreamId) -> anyhow::Result<()>;
}

/// Best-effort external event signal. Failures are swallowed by the caller
/// (see `ReadinessScheduler`), never propagated.
#[async_trait::async_trait]
pub trait EventProducer: Send + Sync {
    async fn emit_anchor_event(&self, event_id: uuid::Uuid) -> anyhow::Result<()>;
}

/// Helper for building the pub/sub update message the spec requires:
/// `{typ: UPDATE, stream: streamId, tip: anchorCid}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamUpdateMessage<'a> {
    pub typ: &'static str,
    pub stream: &'a StreamId,
    pub tip: &'a Cid,
}

impl<'a> StreamUpdateMessage<'a> {
    pub fn new(stream: &'a StreamId, tip: &'a Cid) -> Self {
        StreamUpdateMessage {
            typ: "UPDATE",
            stream,
            tip,
        }
    }

    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
