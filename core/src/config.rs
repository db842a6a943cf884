use chrono::Duration;

/// Runtime configuration for the anchoring pipeline.
///
/// Constructed explicitly by the process that wires up the pipeline —
/// loading these values from the environment or a config file is process
/// wiring and stays out of this crate, the same way this codebase's other
/// components read configuration at their own edges rather than through a
/// shared loader.
#[derive(Debug, Clone)]
pub struct AnchorConfig {
    /// Maximum depth `D` of the Merkle tree. Bounds the batch size to `2^D`.
    pub merkle_depth_limit: u32,
    /// Minimum number of distinct PENDING streams required before the
    /// readiness scheduler will promote anything.
    pub min_stream_count: usize,
    /// How long a READY batch may sit unprocessed before the scheduler
    /// re-includes it (bumping `updated_at`) and emits a fresh anchor event.
    pub ready_retry_interval: Duration,
    /// How long a COMPLETED, still-pinned request waits before the garbage
    /// collector unpins its stream.
    pub expiry_window: Duration,
    /// Pub/sub topic the anchor emitter publishes tip updates to.
    pub pubsub_topic: String,
    /// Maximum candidates accepted into a single cycle's batch. `0` means
    /// unlimited (still bounded by `2^merkle_depth_limit`).
    pub anchor_limit: usize,
    /// Number of times a batch containing a request may fail to land a
    /// blockchain transaction before that request is marked FAILED.
    pub max_tx_failures: u32,
}

impl AnchorConfig {
    /// Number of streams that fit in one batch at the configured depth.
    pub fn stream_limit(&self) -> usize {
        1usize
            .checked_shl(self.merkle_depth_limit)
            .unwrap_or(usize::MAX)
    }

    /// The limit actually enforced by the coordinator: the smaller of the
    /// configured `anchor_limit` and what the tree depth can hold.
    pub fn effective_anchor_limit(&self) -> usize {
        let depth_bound = self.stream_limit();
        if self.anchor_limit == 0 {
            depth_bound
        } else {
            self.anchor_limit.min(depth_bound)
        }
    }
}

impl Default for AnchorConfig {
    fn default() -> Self {
        AnchorConfig {
            merkle_depth_limit: 8,
            min_stream_count: 1,
            ready_retry_interval: Duration::minutes(5),
            expiry_window: Duration::days(60),
            pubsub_topic: "anchor-updates".to_string(),
            anchor_limit: 0,
            max_tx_failures: 5,
        }
    }
}
