use crate::model::{Cid, StreamId};

#[derive(Debug)]
pub enum MerkleError {
    BatchTooLarge { candidates: usize, max_leaves: usize },
}

impl std::fmt::Display for MerkleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BatchTooLarge {
                candidates,
                max_leaves,
            } => write!(
                f,
                "batch of {} candidates exceeds the configured depth limit ({} leaves)",
                candidates, max_leaves
            ),
        }
    }
}

impl std::error::Error for MerkleError {}

#[derive(Debug)]
pub enum CandidateSelectorError {
    StreamUnreadable(StreamId, String),
}

impl std::fmt::Display for CandidateSelectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StreamUnreadable(stream_id, reason) => {
                write!(f, "stream `{}` unreadable: {}", stream_id, reason)
            }
        }
    }
}

impl std::error::Error for CandidateSelectorError {}

#[derive(Debug)]
pub enum CoordinatorError {
    TransactionFailed(String),
    MissingProof(Cid),
}

impl std::fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TransactionFailed(reason) => {
                write!(f, "failed to send transaction: {}", reason)
            }
            Self::MissingProof(cid) => write!(f, "missing proof object for root {}", cid),
        }
    }
}

impl std::error::Error for CoordinatorError {}

#[derive(Debug)]
pub enum RequestStoreError {
    DuplicateCid(Cid),
    NotFound(crate::model::RequestId),
}

impl std::fmt::Display for RequestStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateCid(cid) => write!(f, "request with cid `{}` already exists", cid),
            Self::NotFound(id) => write!(f, "request `{}` not found", id),
        }
    }
}

impl std::error::Error for RequestStoreError {}
