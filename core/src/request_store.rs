use crate::model::{Cid, Request, RequestId, RequestStatus};

/// Fields a batch status update may change. `message` is left untouched
/// when `None`.
#[derive(Debug, Clone)]
pub struct RequestUpdate {
    pub status: RequestStatus,
    pub message: Option<String>,
}

impl RequestUpdate {
    pub fn new(status: RequestStatus) -> Self {
        RequestUpdate {
            status,
            message: None,
        }
    }

    pub fn with_message(status: RequestStatus, message: impl Into<String>) -> Self {
        RequestUpdate {
            status,
            message: Some(message.into()),
        }
    }
}

/// Durable table of requests and their state transitions.
///
/// Implementations must make `find_and_mark_ready` and the terminal-state
/// guard in `update_requests` atomic with respect to other callers — see
/// the concurrency notes on each method. The production implementation
/// (`anchor-pgsql-store`) backs both with `SELECT … FOR UPDATE SKIP LOCKED`
/// inside a serializable transaction.
#[async_trait::async_trait]
pub trait RequestStore: Send + Sync {
    /// Upserts by `cid`. Inserting a request whose `cid` already exists
    /// overwrites the mutable fields of the existing row instead of
    /// producing a duplicate.
    async fn create_or_update(&self, request: Request) -> anyhow::Result<Request>;

    async fn find_by_cid(&self, cid: &Cid) -> anyhow::Result<Option<Request>>;

    async fn find_by_status(&self, status: RequestStatus) -> anyhow::Result<Vec<Request>>;

    async fn count_by_status(&self, status: RequestStatus) -> anyhow::Result<usize>;

    /// Atomically promotes PENDING rows to READY and re-surfaces stale READY
    /// rows for retry, returning every row this call changed or renewed.
    ///
    /// Does nothing (and returns an empty vec) if fewer than
    /// `min_stream_count` distinct streams have PENDING rows. `limit == 0`
    /// promotes every eligible stream; otherwise promotes at most `limit`
    /// distinct streams' worth, oldest `created_at` first, `id` as the
    /// tie-break. Any READY row whose `updated_at` is older than
    /// `ready_retry_interval` is included regardless of `limit`, with its
    /// `updated_at` bumped to now.
    async fn find_and_mark_ready(
        &self,
        limit: usize,
        min_stream_count: usize,
        ready_retry_interval: chrono::Duration,
    ) -> anyhow::Result<Vec<Request>>;

    /// Batch status update. A row currently in a terminal state
    /// (COMPLETED/FAILED) is left untouched — this is what gives the
    /// pipeline at-most-once completion semantics under concurrent callers.
    async fn update_requests(
        &self,
        update: RequestUpdate,
        ids: &[RequestId],
    ) -> anyhow::Result<()>;

    /// Clears `pinned` on the given rows, independent of `status`. Used by
    /// `GarbageCollector` once a stream has actually been unpinned; a row
    /// already unpinned is a harmless no-op, which is what keeps repeated GC
    /// sweeps from re-unpinning the same stream.
    async fn mark_unpinned(&self, ids: &[RequestId]) -> anyhow::Result<()>;
}
