use crate::model::{Anchor, RequestId};

/// Durable record of emitted anchors — one row per completed request.
#[async_trait::async_trait]
pub trait AnchorStore: Send + Sync {
    /// `request_id` is unique; the coordinator calls this exactly once per
    /// accepted request, after the anchor commit object has been stored.
    async fn create(&self, anchor: Anchor) -> anyhow::Result<()>;

    async fn find_by_request(&self, request_id: &RequestId) -> anyhow::Result<Option<Anchor>>;
}
