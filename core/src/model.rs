use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque content identifier handle.
///
/// The core never hashes or constructs a CID itself — the content-addressed
/// store is the sole authority on how a CID is derived from bytes. We model
/// it the same way the persistence layer already stores other content
/// identifiers: as a validated string handle rather than a binary multihash
/// the core has no use for.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cid(String);

impl Cid {
    pub fn new(raw: impl Into<String>) -> Self {
        Cid(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0.into_bytes()
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Cid {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Cid(s.to_string()))
    }
}

impl From<String> for Cid {
    fn from(value: String) -> Self {
        Cid(value)
    }
}

impl From<&str> for Cid {
    fn from(value: &str) -> Self {
        Cid(value.to_string())
    }
}

/// Stable identifier for a stream, as reported by the stream service.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamId(String);

impl StreamId {
    pub fn new(raw: impl Into<String>) -> Self {
        StreamId(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for StreamId {
    fn from(value: String) -> Self {
        StreamId(value)
    }
}

impl From<&str> for StreamId {
    fn from(value: &str) -> Self {
        StreamId(value.to_string())
    }
}

/// Opaque identifier for a [`Request`] row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(uuid::Uuid);

impl RequestId {
    pub fn new() -> Self {
        RequestId(uuid::Uuid::new_v4())
    }

    pub fn from_uuid(id: uuid::Uuid) -> Self {
        RequestId(id)
    }

    pub fn as_uuid(&self) -> uuid::Uuid {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a [`Request`]. Terminal states are [`RequestStatus::Completed`]
/// and [`RequestStatus::Failed`] — once reached, the core never transitions a row
/// back out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Ready,
    Processing,
    Completed,
    Failed,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Failed)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Ready => "READY",
            RequestStatus::Processing => "PROCESSING",
            RequestStatus::Completed => "COMPLETED",
            RequestStatus::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

/// Message used once a request is anchored without emitting a fresh anchor
/// commit — the stream's log already carries an ANCHOR entry past this CID.
pub const MESSAGE_ALREADY_ANCHORED: &str = "CID successfully anchored.";

/// A single requester's ask to have `cid` anchored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub cid: Cid,
    pub stream_id: StreamId,
    pub status: RequestStatus,
    pub message: Option<String>,
    pub pinned: bool,
    /// Number of times a batch containing this request failed to land a
    /// blockchain transaction. Bounds how long a request can orbit
    /// PROCESSING before the coordinator gives up on it (see
    /// `AnchorConfig::max_tx_failures`).
    pub tx_failures: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Request {
    pub fn new(cid: Cid, stream_id: StreamId) -> Self {
        let now = Utc::now();
        Request {
            id: RequestId::new(),
            cid,
            stream_id,
            status: RequestStatus::Pending,
            message: None,
            pinned: false,
            tx_failures: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Ephemeral per-cycle record of one stream selected for anchoring.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub stream_id: StreamId,
    /// The commit to anchor — the stream's tip, which may not correspond to
    /// any single request's CID.
    pub cid: Cid,
    pub accepted_requests: Vec<RequestId>,
    pub rejected_requests: BTreeSet<RequestId>,
    /// Earliest `created_at` among `accepted_requests`; determines the
    /// candidate's FIFO position in the batch.
    pub earliest_created_at: DateTime<Utc>,
}

impl Candidate {
    pub fn is_emittable(&self) -> bool {
        !self.accepted_requests.is_empty()
    }
}

/// Durable record of one successfully emitted anchor commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anchor {
    pub request_id: RequestId,
    pub proof_cid: Cid,
    pub path: String,
    pub cid: Cid,
    pub created_at: DateTime<Utc>,
}

/// One successful on-chain transaction, recorded once per anchoring cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub chain_id: String,
    pub tx_hash: String,
    pub block_number: u64,
    pub block_timestamp: DateTime<Utc>,
}

/// Content-addressed, immutable proof of inclusion for a single cycle's
/// Merkle root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proof {
    pub root: Cid,
    pub tx_hash: String,
    pub chain_id: String,
    pub block_number: u64,
    pub block_timestamp: DateTime<Utc>,
}

/// Content-addressed object linking a prior commit to a Merkle inclusion
/// proof and an on-chain transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorCommit {
    pub prev: Cid,
    pub proof: Cid,
    pub path: String,
}
